//! Access to the npm registry.
//!
//! Nothing is cached, every call is a request to the registry.

use std::collections::HashMap;

use futures_util::StreamExt;
use thiserror::Error;

/// Lazily downloaded bytes of a package archive (gzipped tar). The download only progresses while the stream is polled.
pub type ArchiveStream = futures_util::stream::BoxStream<'static, std::io::Result<Vec<u8>>>;

/// Requests the abbreviated metadata, falling back to the full document if the registry doesn't support it.
const METADATA_ACCEPT: &str = "application/vnd.npm.install-v1+json; q=1.0, application/json; q=0.8, */*";

#[derive(Debug, Error)]
pub enum RegistryError {
	#[error("package {package} was not found in the registry (HTTP {status}).")]
	PackageNotFound { package: String, status: u16 },
	/// The metadata has no `versions`, e.g. when the package has been fully unpublished.
	#[error("package {0} has no published versions.")]
	NoPublishedVersions(String),
	#[error("metadata of package {0} does not contain a latest dist-tag.")]
	MissingLatestTag(String),
	#[error("archive of {package}@{version} could not be downloaded (HTTP {status}).")]
	ArchiveNotFound { package: String, version: String, status: u16 },
	#[error("package {package} has an invalid version \"{version}\": {source}")]
	InvalidVersion { package: String, version: String, source: semver::Error },
	#[error("metadata of package {package} could not be parsed: {source}")]
	MalformedMetadata { package: String, source: serde_json::Error },
	#[error("registry request failed: {0}")]
	Http(#[from] reqwest::Error),
}

/// Read-only view of a package registry.
#[async_trait::async_trait]
pub trait Registry: Send + Sync {
	/// All published versions of a package, sorted ascending.
	async fn list_versions(&self, package: &str) -> Result<Vec<semver::Version>, RegistryError>;

	/// The version tagged as `latest`, pre-releases and betas aren't tagged like this.
	async fn latest_version(&self, package: &str) -> Result<semver::Version, RegistryError>;

	/// Starts the download of the archive of one exact version.
	async fn archive_stream(&self, package: &str, version: &str) -> Result<ArchiveStream, RegistryError>;

	/// The highest `major.minor.*` version of a package, `None` if no such version is published.
	async fn highest_patch(&self, package: &str, major_minor: &str) -> Result<Option<semver::Version>, RegistryError> {
		let versions = self.list_versions(package).await?;
		Ok(highest_patch_of(&versions, major_minor))
	}

	/// Distinct `major.minor` versions of a package in ascending order.
	async fn minor_versions(&self, package: &str) -> Result<Vec<String>, RegistryError> {
		let versions = self.list_versions(package).await?;
		let mut minors: Vec<String> = Vec::new();
		for v in versions {
			let minor = format!("{}.{}", v.major, v.minor);
			if !minors.contains(&minor) {
				minors.push(minor);
			}
		}
		Ok(minors)
	}
}

/// Picks the greatest version matching `~major_minor`. Pre-releases never match.
pub fn highest_patch_of(versions: &[semver::Version], major_minor: &str) -> Option<semver::Version> {
	let req = semver::VersionReq::parse(&format!("~{}", major_minor)).ok()?;
	versions.iter()
		.filter(|v| req.matches(v))
		.max()
		.cloned()
}

#[derive(Debug, serde::Deserialize)]
pub struct PackageMetadata {
	#[serde(default)]
	versions: Option<serde_json::Map<String, serde_json::Value>>,
	#[serde(rename = "dist-tags", default)]
	dist_tags: HashMap<String, String>,
}

impl PackageMetadata {
	pub fn parse(package: &str, body: &[u8]) -> Result<Self, RegistryError> {
		serde_json::from_slice(body).map_err(|source| RegistryError::MalformedMetadata {
			package: package.to_string(),
			source,
		})
	}

	pub fn versions(&self, package: &str) -> Result<Vec<semver::Version>, RegistryError> {
		let versions = self.versions.as_ref().ok_or_else(|| RegistryError::NoPublishedVersions(package.to_string()))?;
		let mut parsed = Vec::with_capacity(versions.len());
		for v in versions.keys() {
			match semver::Version::parse(v) {
				Ok(v) => parsed.push(v),
				Err(e) => log::warn!("Skipping unparsable version {} of {}: {}", v, package, e),
			}
		}
		parsed.sort();
		Ok(parsed)
	}

	pub fn latest(&self, package: &str) -> Result<semver::Version, RegistryError> {
		let latest = self.dist_tags.get("latest").ok_or_else(|| RegistryError::MissingLatestTag(package.to_string()))?;
		semver::Version::parse(latest).map_err(|source| RegistryError::InvalidVersion {
			package: package.to_string(),
			version: latest.clone(),
			source,
		})
	}
}

/// HTTP client for a npm compatible registry.
#[derive(Debug, Clone)]
pub struct RegistryClient {
	client: reqwest::Client,
	base_url: String,
}

impl RegistryClient {
	pub fn new(config: &crate::Config) -> Result<Self, RegistryError> {
		let client = reqwest::Client::builder()
			.https_only(config.https_only())
			.build()?;

		Ok(Self {
			client,
			base_url: config.registry_url().to_string(),
		})
	}

	pub fn metadata_url(&self, package: &str) -> String {
		/* scoped packages need the slash escaped */
		format!("{}/{}", self.base_url, package.replace('/', "%2F"))
	}

	pub fn archive_url(&self, package: &str, version: &str) -> String {
		let file_name = package.rsplit('/').next().unwrap_or(package);
		format!("{}/{}/-/{}-{}.tgz", self.base_url, package, file_name, version)
	}

	pub async fn fetch_metadata(&self, package: &str) -> Result<PackageMetadata, RegistryError> {
		let url = self.metadata_url(package);
		log::debug!("Fetching metadata of {} from {}", package, url);

		let response = self.client
			.get(&url)
			.header(reqwest::header::ACCEPT, METADATA_ACCEPT)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(RegistryError::PackageNotFound {
				package: package.to_string(),
				status: response.status().as_u16(),
			});
		}

		let body = response.bytes().await?;
		PackageMetadata::parse(package, &body)
	}
}

#[async_trait::async_trait]
impl Registry for RegistryClient {
	async fn list_versions(&self, package: &str) -> Result<Vec<semver::Version>, RegistryError> {
		self.fetch_metadata(package).await?.versions(package)
	}

	async fn latest_version(&self, package: &str) -> Result<semver::Version, RegistryError> {
		self.fetch_metadata(package).await?.latest(package)
	}

	async fn archive_stream(&self, package: &str, version: &str) -> Result<ArchiveStream, RegistryError> {
		let url = self.archive_url(package, version);
		log::info!("Downloading package {}@{} from {}", package, version, url);

		let response = self.client.get(&url).send().await?;
		if !response.status().is_success() {
			return Err(RegistryError::ArchiveNotFound {
				package: package.to_string(),
				version: version.to_string(),
				status: response.status().as_u16(),
			});
		}

		Ok(response
			.bytes_stream()
			.map(|chunk| chunk
				.map(|b| b.to_vec())
				.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)))
			.boxed())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn v(s: &str) -> semver::Version {
		semver::Version::parse(s).unwrap()
	}

	#[test]
	fn highest_patch_matches_major_minor() {
		let versions = [v("0.1.0"), v("0.1.3"), v("0.2.0"), v("0.1.2"), v("1.1.9")];
		assert_eq!(highest_patch_of(&versions, "0.1"), Some(v("0.1.3")));
		assert_eq!(highest_patch_of(&versions, "0.2"), Some(v("0.2.0")));
		assert_eq!(highest_patch_of(&versions, "0.3"), None);
	}

	#[test]
	fn highest_patch_ignores_prereleases() {
		let versions = [v("0.2.0"), v("0.2.1-beta.1")];
		assert_eq!(highest_patch_of(&versions, "0.2"), Some(v("0.2.0")));
	}

	#[test]
	fn metadata_versions_are_sorted() {
		let metadata = PackageMetadata::parse("pkg", br#"{
			"versions": { "0.2.0": {}, "0.1.0": {}, "0.1.1": {} },
			"dist-tags": { "latest": "0.2.0" }
		}"#).unwrap();
		assert_eq!(metadata.versions("pkg").unwrap(), vec![v("0.1.0"), v("0.1.1"), v("0.2.0")]);
		assert_eq!(metadata.latest("pkg").unwrap(), v("0.2.0"));
	}

	#[test]
	fn unpublished_package_has_no_versions() {
		let metadata: PackageMetadata = serde_json::from_str(r#"{ "time": { "unpublished": {} } }"#).unwrap();
		assert!(matches!(metadata.versions("pkg"), Err(RegistryError::NoPublishedVersions(_))));
		assert!(matches!(metadata.latest("pkg"), Err(RegistryError::MissingLatestTag(_))));
	}

	#[test]
	fn malformed_metadata_names_the_package() {
		let result = PackageMetadata::parse("nodecg-io-core", b"<html>502 Bad Gateway</html>");
		match result {
			Err(RegistryError::MalformedMetadata { package, .. }) => assert_eq!(package, "nodecg-io-core"),
			other => panic!("unexpected result {:?}", other),
		}

		/* versions has to be an object */
		let result = PackageMetadata::parse("pkg", br#"{ "versions": ["0.1.0"] }"#);
		assert!(matches!(result, Err(RegistryError::MalformedMetadata { .. })));
	}

	#[test]
	fn urls() {
		let mut config = crate::Config::default();
		config.set_registry_url("https://registry.example/".to_string());
		let client = RegistryClient::new(&config).unwrap();
		assert_eq!(client.metadata_url("nodecg-io-core"), "https://registry.example/nodecg-io-core");
		assert_eq!(client.metadata_url("@types/node"), "https://registry.example/@types%2Fnode");
		assert_eq!(client.archive_url("nodecg-io-core", "0.1.0"), "https://registry.example/nodecg-io-core/-/nodecg-io-core-0.1.0.tgz");
		assert_eq!(client.archive_url("@types/node", "18.0.0"), "https://registry.example/@types/node/-/node-18.0.0.tgz");
	}
}
