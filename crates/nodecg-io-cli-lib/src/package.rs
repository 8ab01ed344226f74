//! Packages fetched by a production install and the diff between two package lists.

use std::path::{Path, PathBuf};

/// A npm package that is installed by a production install.
///
/// Two packages are only equal if every field is equal, a package that differs in any way
/// from the installed one has to be reinstalled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Package {
	pub name: String,
	/// Relative to the nodecg-io directory. Usually the same as `name`.
	pub path: String,
	pub version: String,
	/// Packages that must be linked into the local `node_modules` of this package
	/// because they are loaded by path and can't be resolved from the hoisted `node_modules`.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub symlink: Vec<String>,
}

impl Package {
	pub fn new(name: impl Into<String>, path: impl Into<String>, version: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			path: path.into(),
			version: version.into(),
			symlink: Vec::new(),
		}
	}

	/// Directory the package content is extracted to.
	pub fn install_path(&self, nodecg_io_dir: &Path) -> PathBuf {
		nodecg_io_dir.join(&self.path)
	}

	/// Whether this package lives inside the directory of `parent`, in which case it gets
	/// deleted together with `parent`.
	pub fn is_nested_in(&self, parent: &Package) -> bool {
		self.path != parent.path && Path::new(&self.path).starts_with(&parent.path)
	}
}

impl std::fmt::Display for Package {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}@{}", self.name, self.version)
	}
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PackageDiff {
	pub install: Vec<Package>,
	pub remove: Vec<Package>,
}

impl PackageDiff {
	pub fn is_empty(&self) -> bool {
		self.install.is_empty() && self.remove.is_empty()
	}
}

/// Gets all packages of `packages` that are located inside the directory of `parent`.
pub fn sub_packages<'a>(packages: &'a [Package], parent: &Package) -> Vec<&'a Package> {
	packages.iter().filter(|p| p.is_nested_in(parent)).collect()
}

/// Computes which packages have to be removed and installed to get from `current` to `requested`.
///
/// A package whose version changed shows up in both lists. Requested packages nested in the
/// directory of a removed package are installed again even when they didn't change, removing the
/// parent deletes their files.
pub fn diff_packages(requested: &[Package], current: &[Package]) -> PackageDiff {
	let remove: Vec<Package> = current.iter()
		.filter(|p| !requested.contains(p))
		.cloned()
		.collect();

	let mut install: Vec<Package> = requested.iter()
		.filter(|p| !current.contains(p))
		.cloned()
		.collect();

	for removed in &remove {
		for sub in sub_packages(requested, removed) {
			if !install.contains(sub) {
				install.push(sub.clone());
			}
		}
	}

	PackageDiff { install, remove }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn core(version: &str) -> Package {
		Package::new("nodecg-io-core", "nodecg-io-core", version)
	}

	fn dashboard() -> Package {
		Package::new("nodecg-io-dashboard", "nodecg-io-core/dashboard", "0.1.0")
	}

	fn twitch_chat() -> Package {
		Package::new("nodecg-io-twitch-chat", "nodecg-io-twitch-chat", "0.1.0")
	}

	#[test]
	fn missing_package_is_installed() {
		let diff = diff_packages(&[twitch_chat(), core("0.1.0")], &[twitch_chat()]);
		assert_eq!(diff.remove, vec![]);
		assert_eq!(diff.install, vec![core("0.1.0")]);
	}

	#[test]
	fn unwanted_package_is_removed() {
		let diff = diff_packages(&[twitch_chat()], &[twitch_chat(), core("0.1.0")]);
		assert_eq!(diff.remove, vec![core("0.1.0")]);
		assert_eq!(diff.install, vec![]);
	}

	#[test]
	fn changed_version_is_removed_and_installed() {
		let diff = diff_packages(&[twitch_chat(), core("0.2.0")], &[twitch_chat(), core("0.1.0")]);
		assert_eq!(diff.remove, vec![core("0.1.0")]);
		assert_eq!(diff.install, vec![core("0.2.0")]);
	}

	#[test]
	fn same_packages_produce_empty_diff() {
		let packages = [twitch_chat(), core("0.1.0"), dashboard()];
		assert!(diff_packages(&packages, &packages).is_empty());
	}

	#[test]
	fn core_upgrade_reinstalls_dashboard() {
		let current = [core("0.1.0"), dashboard(), twitch_chat()];
		let requested = [core("0.2.0"), dashboard(), twitch_chat()];
		let diff = diff_packages(&requested, &current);
		assert_eq!(diff.remove, vec![core("0.1.0")]);
		assert_eq!(diff.install, vec![core("0.2.0"), dashboard()]);
	}

	#[test]
	fn symlink_change_counts_as_change() {
		let mut linked = twitch_chat();
		linked.symlink = vec!["tmi.js".to_string()];
		let diff = diff_packages(&[linked.clone()], &[twitch_chat()]);
		assert_eq!(diff.install, vec![linked]);
		assert_eq!(diff.remove, vec![twitch_chat()]);
	}

	#[test]
	fn prefix_of_name_is_not_nesting() {
		let core_like = Package::new("nodecg-io-core-extra", "nodecg-io-core-extra", "0.1.0");
		assert!(!core_like.is_nested_in(&core("0.1.0")));
		assert!(dashboard().is_nested_in(&core("0.1.0")));
		assert!(!core("0.1.0").is_nested_in(&core("0.2.0")));
	}

	#[test]
	fn empty_symlink_list_is_not_serialized() {
		let json = serde_json::to_value(core("0.1.0")).unwrap();
		assert!(json.get("symlink").is_none());
		let parsed: Package = serde_json::from_value(json).unwrap();
		assert_eq!(parsed, core("0.1.0"));
	}
}
