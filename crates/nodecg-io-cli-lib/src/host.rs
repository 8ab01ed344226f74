//! The nodecg installation nodecg-io is installed into.

use std::path::{Path, PathBuf};

pub mod config;
pub use config::manage_bundle_dir;

/// Directory inside the nodecg installation that holds everything installed by this cli.
pub const NODECG_IO_DIR: &str = "nodecg-io";

/// Looks for a nodecg installation in `start` and all of its parents.
///
/// # Errors
/// [`HostNotFound`](crate::Error::HostNotFound) when neither `start` nor any parent is a nodecg installation.
pub async fn find_nodecg_directory(start: &Path) -> crate::Result<PathBuf> {
	for dir in start.ancestors() {
		if is_nodecg_directory(dir).await {
			log::debug!("Found nodecg installation at {}", dir.display());
			return Ok(dir.to_path_buf());
		}
	}
	Err(crate::Error::HostNotFound(start.to_path_buf()))
}

/// A nodecg installation has a `package.json` named `nodecg`.
async fn is_nodecg_directory(dir: &Path) -> bool {
	match read_package_json(dir).await {
		Ok(package) => package.get("name").and_then(|n| n.as_str()) == Some("nodecg"),
		Err(_) => false,
	}
}

pub async fn nodecg_version(nodecg_dir: &Path) -> crate::Result<semver::Version> {
	let package = read_package_json(nodecg_dir).await?;
	let version = package.get("version")
		.and_then(|v| v.as_str())
		.ok_or_else(|| crate::Error::Parse(format!("package.json in {} has no version.", nodecg_dir.display())))?;
	semver::Version::parse(version).map_err(|e| crate::Error::Parse(format!("invalid nodecg version \"{}\": {}", version, e)))
}

/// Where nodecg-io is installed to. Not checked for existence.
pub fn nodecg_io_directory(nodecg_dir: &Path) -> PathBuf {
	nodecg_dir.join(NODECG_IO_DIR)
}

async fn read_package_json(dir: &Path) -> crate::Result<serde_json::Value> {
	let content = tokio::fs::read(dir.join("package.json")).await?;
	Ok(serde_json::from_slice(&content)?)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn write_package(dir: &Path, name: &str, version: &str) {
		std::fs::create_dir_all(dir).unwrap();
		let content = serde_json::json!({ "name": name, "version": version });
		std::fs::write(dir.join("package.json"), content.to_string()).unwrap();
	}

	#[tokio::test]
	async fn finds_nodecg_in_parent() {
		let tmp = tempfile::tempdir().unwrap();
		let nodecg = tmp.path().join("nodecg");
		write_package(&nodecg, "nodecg", "1.8.1");
		let bundle = nodecg.join("bundles").join("my-bundle");
		write_package(&bundle, "my-bundle", "0.1.0");

		assert_eq!(find_nodecg_directory(&bundle).await.unwrap(), nodecg);
		assert_eq!(find_nodecg_directory(&nodecg).await.unwrap(), nodecg);
		assert_eq!(nodecg_version(&nodecg).await.unwrap(), semver::Version::new(1, 8, 1));
	}

	#[tokio::test]
	async fn missing_nodecg_fails() {
		let tmp = tempfile::tempdir().unwrap();
		write_package(tmp.path(), "something-else", "1.0.0");
		let err = find_nodecg_directory(tmp.path()).await.unwrap_err();
		assert!(matches!(err, crate::Error::HostNotFound(_)));
	}

	#[test]
	fn nodecg_io_lives_inside_nodecg() {
		assert_eq!(nodecg_io_directory(Path::new("/srv/nodecg")), PathBuf::from("/srv/nodecg/nodecg-io"));
	}
}
