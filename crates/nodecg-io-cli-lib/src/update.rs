//! Checks whether a newer release of this cli is published.

use crate::registry::{Registry, RegistryError};

/// npm package the cli is released as.
pub const CLI_PACKAGE: &str = "nodecg-io-cli";

/// A published cli release that is newer than the running one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliUpdate {
	pub current: semver::Version,
	pub newest: semver::Version,
}

impl CliUpdate {
	pub fn log_notice(&self) {
		log::info!("There is a nodecg-io-cli update available: {} -> {}", self.current, self.newest);
		log::info!("Run the following command to update nodecg-io-cli: npm i -g {}", CLI_PACKAGE);
	}
}

/// Version of the running cli.
pub fn cli_version() -> Result<semver::Version, semver::Error> {
	semver::Version::parse(env!("CARGO_PKG_VERSION"))
}

/// The newest published release of `package` if it is newer than `current`. Pre-releases are never offered.
pub async fn newer_version(registry: &dyn Registry, package: &str, current: &semver::Version) -> Result<Option<semver::Version>, RegistryError> {
	let newest = registry.list_versions(package).await?
		.into_iter()
		.filter(|v| v.pre.is_empty())
		.max();
	Ok(newest.filter(|v| v > current))
}

/// Looks up the newest cli release. Failing to do so is only logged, the check must never fail a command.
pub async fn check_for_cli_update(registry: &dyn Registry) -> Option<CliUpdate> {
	let current = match cli_version() {
		Ok(v) => v,
		Err(e) => {
			log::warn!("Cannot check for cli updates: {}", e);
			return None;
		}
	};

	match newer_version(registry, CLI_PACKAGE, &current).await {
		Ok(Some(newest)) => Some(CliUpdate { current, newest }),
		Ok(None) => {
			log::debug!("nodecg-io-cli {} is up to date.", current);
			None
		},
		Err(e) => {
			log::warn!("Cannot check for cli updates: {}", e);
			None
		},
	}
}
