//! User configuration of the cli.
//!
//! Read from `config.json` in the platform config directory, every field is optional in the file.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
	registry_url: String,
	https_only: bool,
	download_concurrency: usize,
	build_concurrency: usize,
	package_manager: String,
	repository_url: String,
	docs_repository_url: String,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			registry_url: "https://registry.npmjs.org".to_string(),
			https_only: true,
			download_concurrency: 4,
			build_concurrency: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
			package_manager: "npm".to_string(),
			repository_url: "https://github.com/codeoverflow-org/nodecg-io.git".to_string(),
			docs_repository_url: "https://github.com/codeoverflow-org/nodecg-io-docs.git".to_string(),
		}
	}
}

impl Config {
	/// Location of the config file, `None` when the platform config directory can't be determined.
	pub fn config_path() -> Option<PathBuf> {
		#[cfg(target_os = "windows")]
		let path = std::env::var("APPDATA").ok().map(PathBuf::from);

		#[cfg(not(target_os = "windows"))]
		let path = if let Ok(e) = std::env::var("XDG_CONFIG_HOME") {
			Some(PathBuf::from(e))
		} else {
			std::env::var("HOME").ok().map(|home| PathBuf::from(home).join(".config"))
		};

		path.map(|p| p.join("nodecg-io-cli").join("config.json"))
	}

	/// Loads the config from [`config_path()`](Config::config_path()).
	///
	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when the file can't be read or the config directory is unknown.
	/// - [`SerdeJSON`](crate::error::Error::SerdeJSON) when the file isn't a valid config.
	pub fn load_from_disk() -> crate::Result<Self> {
		let path = Self::config_path().ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "config directory could not be determined"))?;
		Self::load_from_file(path)
	}

	pub fn load_from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
		let content = std::fs::read_to_string(path)?;
		Ok(serde_json::from_str(&content)?)
	}

	pub fn registry_url(&self) -> &str {
		self.registry_url.trim_end_matches('/')
	}
	pub fn set_registry_url(&mut self, registry_url: String) {
		self.registry_url = registry_url;
	}

	pub fn https_only(&self) -> bool {
		self.https_only
	}
	pub fn set_https_only(&mut self, https_only: bool) {
		self.https_only = https_only;
	}

	/// Maximum number of packages fetched and extracted at the same time. Never less than one.
	pub fn download_concurrency(&self) -> usize {
		self.download_concurrency.max(1)
	}
	pub fn set_download_concurrency(&mut self, download_concurrency: usize) {
		self.download_concurrency = download_concurrency;
	}

	/// Concurrency hint passed to the build of a development install. Never less than one.
	pub fn build_concurrency(&self) -> usize {
		self.build_concurrency.max(1)
	}
	pub fn set_build_concurrency(&mut self, build_concurrency: usize) {
		self.build_concurrency = build_concurrency;
	}

	pub fn package_manager(&self) -> &str {
		&self.package_manager
	}

	pub fn repository_url(&self) -> &str {
		&self.repository_url
	}

	pub fn docs_repository_url(&self) -> &str {
		&self.docs_repository_url
	}
}
