//! Turns the choices of the user into the [`Installation`] that the installers work towards.

use crate::installation::{DevelopmentInstallation, Installation, ProductionInstallation};
use crate::registry::Registry;
use crate::versions::{self, CORE_PACKAGE, DASHBOARD_PACKAGE, DASHBOARD_PATH, DEVELOPMENT_VERSION};
use crate::Package;

/// What to install, as given on the command line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallOptions {
	/// `major.minor` of a release or [`DEVELOPMENT_VERSION`]. The newest compatible release when `None`.
	pub version: Option<String>,
	/// Service names without the `nodecg-io-` prefix.
	pub services: Vec<String>,
	pub all_services: bool,
	/// Development installs only.
	pub samples: bool,
	/// Development installs only.
	pub docs: bool,
	/// Overrides [`Config::download_concurrency`](crate::Config::download_concurrency) and the build concurrency.
	pub concurrency: Option<usize>,
}

impl InstallOptions {
	pub fn is_development(&self) -> bool {
		self.version.as_deref() == Some(DEVELOPMENT_VERSION)
	}

	pub fn apply_to(&self, config: &mut crate::Config) {
		if let Some(concurrency) = self.concurrency {
			config.set_download_concurrency(concurrency);
			config.set_build_concurrency(concurrency);
		}
	}
}

/// `major.minor` releases of nodecg-io that this cli can install, oldest first.
pub async fn compatible_versions(registry: &dyn Registry) -> crate::Result<Vec<String>> {
	let all = registry.minor_versions(CORE_PACKAGE).await?;
	let (compatible, incompatible): (Vec<String>, Vec<String>) = all.into_iter().partition(|v| versions::is_supported(v));

	if !incompatible.is_empty() {
		log::warn!(
			"nodecg-io {} can't be installed with this version of the cli. update the cli to install them.",
			incompatible.join(", ")
		);
	}
	Ok(compatible)
}

/// Resolves core, dashboard and the given services to the newest patch of the `major_minor` release.
///
/// # Errors
/// [`Validation`](crate::Error::Validation) when a service isn't part of the release or no patch of the release is published.
/// [`Registry`](crate::Error::Registry) when a package doesn't exist in the registry at all.
pub async fn build_package_list(registry: &dyn Registry, major_minor: &str, services: &[String]) -> crate::Result<Vec<Package>> {
	let available = versions::services_for_version(major_minor)?;
	if let Some(unknown) = services.iter().find(|s| !available.iter().any(|a| a == s)) {
		return Err(crate::Error::Validation(format!("service {} is not available in nodecg-io {}.", unknown, major_minor)));
	}

	let mut wanted = vec![
		(CORE_PACKAGE.to_string(), CORE_PACKAGE.to_string()),
		(DASHBOARD_PACKAGE.to_string(), DASHBOARD_PATH.to_string()),
	];
	wanted.extend(services.iter().map(|s| {
		let name = versions::service_package_name(s);
		(name.clone(), name)
	}));

	let resolved = futures_util::future::try_join_all(wanted.into_iter().map(|(name, path)| async move {
		let version = registry.highest_patch(&name, major_minor).await?
			.ok_or_else(|| crate::Error::Validation(format!("no version of {} is published for nodecg-io {}.", name, major_minor)))?;
		log::debug!("Resolved {} to {}", name, version);
		Ok::<_, crate::Error>(Package::new(name, path, version.to_string()))
	})).await?;

	Ok(resolved)
}

/// Services of a production install that also exist in the `version` release.
/// Development installs always contain every service, they don't have a selection.
pub fn services_from_install(install: Option<&Installation>, version: &str) -> Vec<String> {
	let Some(Installation::Production(install)) = install else {
		return Vec::new();
	};
	let Ok(available) = versions::services_for_version(version) else {
		return Vec::new();
	};

	install.packages.iter()
		.filter_map(|p| versions::service_from_package_name(&p.name))
		.filter(|s| available.iter().any(|a| a == s))
		.map(str::to_string)
		.collect()
}

/// Builds the requested [`Installation`].
///
/// Without an explicit version the newest compatible release is used, without explicit services
/// the services of the current install are kept.
pub async fn plan_installation(registry: &dyn Registry, opts: &InstallOptions, current: Option<&Installation>) -> crate::Result<Installation> {
	if opts.is_development() {
		return Ok(Installation::Development(DevelopmentInstallation {
			commit_hash: None,
			use_samples: opts.samples,
			clone_docs: opts.docs,
		}));
	}

	let version = match &opts.version {
		Some(v) => {
			if !versions::is_supported(v) {
				return Err(crate::Error::Validation(format!(
					"nodecg-io {} is not supported, supported releases are {}.", v, versions::SUPPORTED_RANGE
				)));
			}
			v.clone()
		},
		None => compatible_versions(registry).await?
			.pop()
			.ok_or_else(|| crate::Error::Validation("no compatible nodecg-io release is published.".to_string()))?,
	};

	let services = if opts.all_services {
		versions::services_for_version(&version)?.into_iter().map(str::to_string).collect()
	} else if !opts.services.is_empty() {
		opts.services.clone()
	} else {
		services_from_install(current, &version)
	};

	log::info!("Installing nodecg-io {} with services: {}", version, if services.is_empty() { "none".to_string() } else { services.join(", ") });
	let packages = build_package_list(registry, &version, &services).await?;
	Ok(Installation::Production(ProductionInstallation { version, packages }))
}
