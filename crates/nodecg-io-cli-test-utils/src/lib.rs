//! Fixtures and in-memory collaborators for testing the installers.
//!
//! Nothing in here touches the network or runs external programs. Helpers panic on misuse, they are only meant for tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use futures_util::StreamExt;

use nodecg_io_cli::command::{CommandError, CommandRunner};
use nodecg_io_cli::git::GitClient;
use nodecg_io_cli::installation::{DevelopmentInstallation, Installation, InstallationStore, ProductionInstallation};
use nodecg_io_cli::installer::{InstallContext, ProgressObserver};
use nodecg_io_cli::registry::{ArchiveStream, Registry, RegistryError};
use nodecg_io_cli::versions::{CORE_PACKAGE, DASHBOARD_PACKAGE, DASHBOARD_PATH};
use nodecg_io_cli::{Config, Package};

/// Archives are streamed in chunks this big to exercise partial reads.
const ARCHIVE_CHUNK: usize = 512;

pub fn core_pkg(version: &str) -> Package {
	Package::new(CORE_PACKAGE, CORE_PACKAGE, version)
}

pub fn dashboard_pkg(version: &str) -> Package {
	Package::new(DASHBOARD_PACKAGE, DASHBOARD_PATH, version)
}

pub fn service_pkg(service: &str, version: &str) -> Package {
	let name = nodecg_io_cli::versions::service_package_name(service);
	Package::new(name.clone(), name, version)
}

pub fn twitch_chat_pkg(version: &str) -> Package {
	service_pkg("twitch-chat", version)
}

pub fn prod_install(version: &str, packages: Vec<Package>) -> ProductionInstallation {
	ProductionInstallation { version: version.to_string(), packages }
}

/// core, dashboard and twitch-chat of nodecg-io 0.1.
pub fn valid_prod_install() -> ProductionInstallation {
	prod_install("0.1", vec![core_pkg("0.1.0"), dashboard_pkg("0.1.0"), twitch_chat_pkg("0.1.0")])
}

pub fn valid_dev_install() -> DevelopmentInstallation {
	DevelopmentInstallation {
		commit_hash: Some("0000000000000000000000000000000000000001".to_string()),
		use_samples: false,
		clone_docs: false,
	}
}

/// Creates the directories of all packages with a marker file in them, like a previous install would have left them.
pub fn create_package_dirs(nodecg_io_dir: &Path, packages: &[Package]) {
	for package in packages {
		let dir = package.install_path(nodecg_io_dir);
		std::fs::create_dir_all(&dir).expect("failed to create package dir");
		std::fs::write(dir.join("package.json"), format!("{{\"name\":\"{}\",\"version\":\"{}\"}}", package.name, package.version))
			.expect("failed to write package.json");
	}
}

/// Shows library logs of failing tests. Can be called any number of times.
pub fn init_logging() {
	let _ = env_logger::builder()
		.is_test(true)
		.filter_level(log::LevelFilter::Debug)
		.try_init();
}

pub fn tempdir() -> tempfile::TempDir {
	tempfile::tempdir().expect("failed to create temp dir")
}

/// A gzipped tar in the npm layout, every file is placed in the `package/` directory.
pub fn package_archive(files: &[(&str, &str)]) -> Vec<u8> {
	let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default()));
	for (path, content) in files {
		let mut header = tar::Header::new_gnu();
		header.set_size(content.len() as u64);
		header.set_mode(0o644);
		builder.append_data(&mut header, format!("package/{}", path), content.as_bytes()).expect("failed to append archive entry");
	}
	builder.into_inner().and_then(|gz| gz.finish()).expect("failed to finish archive")
}

/// A gzipped tar whose entry names are written as given, including ones `tar` refuses to create like `../x`.
pub fn raw_archive(files: &[(&str, &str)]) -> Vec<u8> {
	let entries: Vec<RawEntry> = files.iter().map(|(path, content)| RawEntry::File(*path, *content)).collect();
	raw_entries_archive(&entries)
}

/// Entry of a [`raw_entries_archive`], names and link targets are written as given.
#[derive(Debug, Clone, Copy)]
pub enum RawEntry<'a> {
	/// Path and content.
	File(&'a str, &'a str),
	/// Path and link target.
	Symlink(&'a str, &'a str),
	/// Path and the archive entry it links to.
	HardLink(&'a str, &'a str),
}

pub fn raw_entries_archive(entries: &[RawEntry]) -> Vec<u8> {
	let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default()));
	for entry in entries {
		let (path, content, link, kind) = match *entry {
			RawEntry::File(path, content) => (path, content, "", tar::EntryType::Regular),
			RawEntry::Symlink(path, target) => (path, "", target, tar::EntryType::Symlink),
			RawEntry::HardLink(path, target) => (path, "", target, tar::EntryType::Link),
		};

		let mut header = tar::Header::new_gnu();
		let gnu = header.as_gnu_mut().expect("gnu header");
		gnu.name[..path.len()].copy_from_slice(path.as_bytes());
		gnu.linkname[..link.len()].copy_from_slice(link.as_bytes());
		header.set_size(content.len() as u64);
		header.set_mode(0o644);
		header.set_entry_type(kind);
		header.set_cksum();
		builder.append(&header, content.as_bytes()).expect("failed to append archive entry");
	}
	builder.into_inner().and_then(|gz| gz.finish()).expect("failed to finish archive")
}

/// Streams `data` in small chunks, optionally ending with an error after the first chunk.
pub fn archive_stream(data: Vec<u8>, fail: bool) -> ArchiveStream {
	let mut chunks: Vec<std::io::Result<Vec<u8>>> = data.chunks(ARCHIVE_CHUNK).map(|c| Ok(c.to_vec())).collect();
	if fail {
		chunks.truncate(1);
		chunks.push(Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset")));
	}
	futures_util::stream::iter(chunks).boxed()
}

/// Registry serving packages from memory.
///
/// Every published version gets an archive with a `package.json` and an `index.js`.
#[derive(Default)]
pub struct MockRegistry {
	versions: HashMap<String, Vec<semver::Version>>,
	failing: HashSet<String>,
	downloads: Mutex<Vec<String>>,
}

impl MockRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_package(mut self, name: &str, versions: &[&str]) -> Self {
		let mut parsed: Vec<semver::Version> = versions.iter().map(|v| semver::Version::parse(v).expect("invalid version")).collect();
		parsed.sort();
		self.versions.insert(name.to_string(), parsed);
		self
	}

	/// Downloads of this package break off after the first chunk.
	pub fn with_failing_download(mut self, name: &str) -> Self {
		self.failing.insert(name.to_string());
		self
	}

	/// The packages the core release 0.1 and 0.2 consist of, with twitch-chat and obs as services.
	pub fn nodecg_io() -> Self {
		Self::new()
			.with_package(CORE_PACKAGE, &["0.1.0", "0.1.1", "0.2.0", "0.3.0"])
			.with_package(DASHBOARD_PACKAGE, &["0.1.0", "0.2.0"])
			.with_package("nodecg-io-twitch-chat", &["0.1.0", "0.2.0"])
			.with_package("nodecg-io-obs", &["0.1.0", "0.1.4", "0.2.1"])
	}

	/// `name@version` of every archive requested so far.
	pub fn downloads(&self) -> Vec<String> {
		self.downloads.lock().unwrap().clone()
	}

	fn published(&self, package: &str) -> Result<&Vec<semver::Version>, RegistryError> {
		self.versions.get(package).ok_or_else(|| RegistryError::PackageNotFound { package: package.to_string(), status: 404 })
	}
}

#[async_trait::async_trait]
impl Registry for MockRegistry {
	async fn list_versions(&self, package: &str) -> Result<Vec<semver::Version>, RegistryError> {
		Ok(self.published(package)?.clone())
	}

	async fn latest_version(&self, package: &str) -> Result<semver::Version, RegistryError> {
		self.published(package)?
			.last()
			.cloned()
			.ok_or_else(|| RegistryError::MissingLatestTag(package.to_string()))
	}

	async fn archive_stream(&self, package: &str, version: &str) -> Result<ArchiveStream, RegistryError> {
		self.downloads.lock().unwrap().push(format!("{}@{}", package, version));

		let published = self.published(package)?;
		if !published.iter().any(|v| v.to_string() == version) {
			return Err(RegistryError::ArchiveNotFound { package: package.to_string(), version: version.to_string(), status: 404 });
		}

		let manifest = format!("{{\"name\":\"{}\",\"version\":\"{}\"}}", package, version);
		let data = package_archive(&[("package.json", manifest.as_str()), ("index.js", "module.exports = {};\n")]);
		Ok(archive_stream(data, self.failing.contains(package)))
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
	pub command: String,
	pub args: Vec<String>,
	pub working_dir: PathBuf,
}

/// Records commands instead of running them.
pub struct MockRunner {
	calls: Mutex<Vec<Call>>,
	/// Commands whose first argument matches fail with exit code 1.
	failing: Mutex<Option<String>>,
	npm_version: Option<String>,
}

impl Default for MockRunner {
	fn default() -> Self {
		Self {
			calls: Mutex::new(Vec::new()),
			failing: Mutex::new(None),
			npm_version: Some("8.19.2".to_string()),
		}
	}
}

impl MockRunner {
	pub fn new() -> Self {
		Self::default()
	}

	/// `None` behaves as if npm is not installed.
	pub fn with_npm_version(mut self, version: Option<&str>) -> Self {
		self.npm_version = version.map(str::to_string);
		self
	}

	pub fn fail_on(&self, first_arg: &str) {
		*self.failing.lock().unwrap() = Some(first_arg.to_string());
	}

	pub fn calls(&self) -> Vec<Call> {
		self.calls.lock().unwrap().clone()
	}

	/// Number of calls whose first argument is `first_arg`, e.g. `install`.
	pub fn count(&self, first_arg: &str) -> usize {
		self.calls.lock().unwrap().iter().filter(|c| c.args.first().map(String::as_str) == Some(first_arg)).count()
	}
}

#[async_trait::async_trait]
impl CommandRunner for MockRunner {
	async fn run(&self, command: &str, args: &[String], working_dir: &Path) -> Result<(), CommandError> {
		self.calls.lock().unwrap().push(Call {
			command: command.to_string(),
			args: args.to_vec(),
			working_dir: working_dir.to_path_buf(),
		});

		let failing = self.failing.lock().unwrap().clone();
		if failing.is_some() && failing.as_deref() == args.first().map(String::as_str) {
			return Err(CommandError::Failed { command: command.to_string(), args: args.to_vec(), code: Some(1) });
		}
		Ok(())
	}

	async fn output(&self, command: &str, args: &[String], _working_dir: &Path) -> Result<String, CommandError> {
		match &self.npm_version {
			Some(v) if args.first().map(String::as_str) == Some("--version") => Ok(format!("{}\n", v)),
			_ => Err(CommandError::Spawn {
				command: command.to_string(),
				source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
			}),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCall {
	Clone(PathBuf),
	Fetch(PathBuf),
	FastForward(PathBuf, String),
	Checkout(PathBuf),
}

/// Git client keeping the commit of each repository in memory.
///
/// Cloning creates the directory with a single file, the remote always points at [`MockGit::set_remote_commit`].
pub struct MockGit {
	remote_commit: Mutex<String>,
	heads: Mutex<HashMap<PathBuf, String>>,
	calls: Mutex<Vec<GitCall>>,
}

impl MockGit {
	pub fn new(remote_commit: &str) -> Self {
		Self {
			remote_commit: Mutex::new(remote_commit.to_string()),
			heads: Mutex::new(HashMap::new()),
			calls: Mutex::new(Vec::new()),
		}
	}

	pub fn set_remote_commit(&self, commit: &str) {
		*self.remote_commit.lock().unwrap() = commit.to_string();
	}

	/// Pretends `dir` is an existing clone at `commit`. The directory is created.
	pub fn with_repository(self, dir: &Path, commit: &str) -> Self {
		std::fs::create_dir_all(dir).expect("failed to create repository dir");
		self.heads.lock().unwrap().insert(dir.to_path_buf(), commit.to_string());
		self
	}

	pub fn calls(&self) -> Vec<GitCall> {
		self.calls.lock().unwrap().clone()
	}
}

#[async_trait::async_trait]
impl GitClient for MockGit {
	async fn clone_repository(&self, _url: &str, dir: &Path) -> nodecg_io_cli::Result<()> {
		self.calls.lock().unwrap().push(GitCall::Clone(dir.to_path_buf()));
		std::fs::create_dir_all(dir)?;
		std::fs::write(dir.join("README.md"), "nodecg-io\n")?;
		let commit = self.remote_commit.lock().unwrap().clone();
		self.heads.lock().unwrap().insert(dir.to_path_buf(), commit);
		Ok(())
	}

	async fn fetch(&self, dir: &Path) -> nodecg_io_cli::Result<String> {
		self.calls.lock().unwrap().push(GitCall::Fetch(dir.to_path_buf()));
		Ok(self.remote_commit.lock().unwrap().clone())
	}

	async fn head_commit(&self, dir: &Path) -> nodecg_io_cli::Result<String> {
		self.heads.lock().unwrap()
			.get(dir)
			.cloned()
			.ok_or_else(|| nodecg_io_cli::Error::Validation(format!("{} is not a repository", dir.display())))
	}

	async fn fast_forward(&self, dir: &Path, commit: &str) -> nodecg_io_cli::Result<()> {
		self.calls.lock().unwrap().push(GitCall::FastForward(dir.to_path_buf(), commit.to_string()));
		self.heads.lock().unwrap().insert(dir.to_path_buf(), commit.to_string());
		Ok(())
	}

	async fn checkout(&self, dir: &Path) -> nodecg_io_cli::Result<()> {
		self.calls.lock().unwrap().push(GitCall::Checkout(dir.to_path_buf()));
		Ok(())
	}
}

/// Keeps the installation in memory and records every write.
#[derive(Default)]
pub struct RecordingStore {
	current: Mutex<Option<Installation>>,
	writes: Mutex<Vec<Installation>>,
}

impl RecordingStore {
	pub fn new(current: Option<Installation>) -> Self {
		Self {
			current: Mutex::new(current),
			writes: Mutex::new(Vec::new()),
		}
	}

	pub fn writes(&self) -> Vec<Installation> {
		self.writes.lock().unwrap().clone()
	}

	pub fn current(&self) -> Option<Installation> {
		self.current.lock().unwrap().clone()
	}
}

#[async_trait::async_trait]
impl InstallationStore for RecordingStore {
	async fn read(&self, _nodecg_io_dir: &Path) -> Option<Installation> {
		self.current()
	}

	async fn write(&self, _nodecg_io_dir: &Path, installation: &Installation) -> nodecg_io_cli::Result<()> {
		self.writes.lock().unwrap().push(installation.clone());
		*self.current.lock().unwrap() = Some(installation.clone());
		Ok(())
	}
}

/// Remembers every progress update.
#[derive(Default)]
pub struct RecordingProgress {
	updates: Mutex<Vec<(usize, usize)>>,
}

impl RecordingProgress {
	pub fn updates(&self) -> Vec<(usize, usize)> {
		self.updates.lock().unwrap().clone()
	}

	pub fn count(&self) -> usize {
		self.updates.lock().unwrap().len()
	}
}

impl ProgressObserver for RecordingProgress {
	fn progress(&self, completed: usize, total: usize) {
		self.updates.lock().unwrap().push((completed, total));
	}
}

/// A temporary nodecg installation with in-memory collaborators.
pub struct TestEnv {
	pub dir: tempfile::TempDir,
	pub config: Config,
	pub registry: MockRegistry,
	pub runner: MockRunner,
	pub git: MockGit,
	pub store: RecordingStore,
	pub progress: RecordingProgress,
}

impl TestEnv {
	pub fn new(registry: MockRegistry, current: Option<Installation>) -> Self {
		init_logging();
		Self {
			dir: tempdir(),
			config: Config::default(),
			registry,
			runner: MockRunner::new(),
			git: MockGit::new("0000000000000000000000000000000000000001"),
			store: RecordingStore::new(current),
			progress: RecordingProgress::default(),
		}
	}

	/// Root of the nodecg installation, has a `package.json` named `nodecg`.
	pub fn nodecg_dir(&self) -> PathBuf {
		let dir = self.dir.path().join("nodecg");
		if !dir.join("package.json").is_file() {
			std::fs::create_dir_all(&dir).expect("failed to create nodecg dir");
			std::fs::write(dir.join("package.json"), "{\"name\":\"nodecg\",\"version\":\"1.8.1\"}").expect("failed to write package.json");
		}
		dir
	}

	pub fn nodecg_io_dir(&self) -> PathBuf {
		nodecg_io_cli::host::nodecg_io_directory(&self.nodecg_dir())
	}

	pub fn ctx(&self) -> InstallContext<'_> {
		InstallContext {
			config: &self.config,
			registry: &self.registry,
			runner: &self.runner,
			git: &self.git,
			store: &self.store,
			progress: &self.progress,
		}
	}
}
