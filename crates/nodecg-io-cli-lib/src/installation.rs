//! The record of what is installed in a nodecg-io directory.
//!
//! Stored as `install.json` inside the nodecg-io directory. It is the only thing used to find out what
//! a previous run has installed, so it is rewritten after every completed step of an install and never
//! describes a state that isn't fully on disk.

use std::path::{Path, PathBuf};

use crate::Package;

pub const INSTALL_FILE_NAME: &str = "install.json";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Installation {
	Production(ProductionInstallation),
	Development(DevelopmentInstallation),
}

/// Released packages fetched from the npm registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProductionInstallation {
	/// `major.minor` of the installed release.
	pub version: String,
	pub packages: Vec<Package>,
}

/// A clone of the nodecg-io repository that is built locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevelopmentInstallation {
	/// Commit the installed build was made from. `None` in a request or before the first build.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub commit_hash: Option<String>,
	#[serde(default)]
	pub use_samples: bool,
	#[serde(default)]
	pub clone_docs: bool,
}

impl Installation {
	pub fn is_development(&self) -> bool {
		matches!(self, Installation::Development(_))
	}

	/// `major.minor` for production installs, `development` otherwise.
	pub fn version(&self) -> &str {
		match self {
			Installation::Production(p) => &p.version,
			Installation::Development(_) => crate::versions::DEVELOPMENT_VERSION,
		}
	}
}

impl From<ProductionInstallation> for Installation {
	fn from(value: ProductionInstallation) -> Self {
		Installation::Production(value)
	}
}

impl From<DevelopmentInstallation> for Installation {
	fn from(value: DevelopmentInstallation) -> Self {
		Installation::Development(value)
	}
}

pub fn install_file_path(nodecg_io_dir: &Path) -> PathBuf {
	nodecg_io_dir.join(INSTALL_FILE_NAME)
}

/// Persistence of the [`Installation`] of a nodecg-io directory.
#[async_trait::async_trait]
pub trait InstallationStore: Send + Sync {
	/// Returns `None` when nothing could be read, a missing or broken file means nothing is installed.
	async fn read(&self, nodecg_io_dir: &Path) -> Option<Installation>;
	async fn write(&self, nodecg_io_dir: &Path, installation: &Installation) -> crate::Result<()>;
}

/// Stores the installation as pretty printed JSON in [`INSTALL_FILE_NAME`].
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonInstallationStore;

#[async_trait::async_trait]
impl InstallationStore for JsonInstallationStore {
	async fn read(&self, nodecg_io_dir: &Path) -> Option<Installation> {
		let path = install_file_path(nodecg_io_dir);
		let content = match tokio::fs::read(&path).await {
			Ok(c) => c,
			Err(e) => {
				log::debug!("No readable install info at {}: {}", path.display(), e);
				return None;
			}
		};

		match serde_json::from_slice(&content) {
			Ok(install) => Some(install),
			Err(e) => {
				log::warn!("Ignoring invalid install info at {}: {}", path.display(), e);
				None
			}
		}
	}

	/// Written to a temporary file first and then renamed over the old file. Readers never see a partial file.
	async fn write(&self, nodecg_io_dir: &Path, installation: &Installation) -> crate::Result<()> {
		use tokio::io::AsyncWriteExt;

		let path = install_file_path(nodecg_io_dir);
		let tmp_path = path.with_extension("json.tmp");
		let content = serde_json::to_vec_pretty(installation)?;

		let mut file = tokio::fs::File::create(&tmp_path).await?;
		file.write_all(&content).await?;
		file.sync_all().await?;
		drop(file);

		tokio::fs::rename(&tmp_path, &path).await?;
		log::trace!("Wrote install info to {}", path.display());
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn production_is_tagged() {
		let install = Installation::Production(ProductionInstallation {
			version: "0.1".to_string(),
			packages: vec![Package::new("nodecg-io-core", "nodecg-io-core", "0.1.0")],
		});
		let json = serde_json::to_value(&install).unwrap();
		assert_eq!(json["mode"], "production");
		assert_eq!(json["version"], "0.1");
		assert_eq!(json["packages"][0]["name"], "nodecg-io-core");
	}

	#[test]
	fn development_uses_camel_case() {
		let install = Installation::Development(DevelopmentInstallation {
			commit_hash: Some("abc".to_string()),
			use_samples: true,
			clone_docs: false,
		});
		let json = serde_json::to_value(&install).unwrap();
		assert_eq!(json["mode"], "development");
		assert_eq!(json["commitHash"], "abc");
		assert_eq!(json["useSamples"], true);
		assert_eq!(json["cloneDocs"], false);
	}

	#[test]
	fn unknown_fields_are_tolerated() {
		let json = r#"{ "mode": "development", "useSamples": true, "somethingNew": 42 }"#;
		let install: Installation = serde_json::from_str(json).unwrap();
		assert_eq!(install, Installation::Development(DevelopmentInstallation {
			commit_hash: None,
			use_samples: true,
			clone_docs: false,
		}));
	}
}
