//! Installs nodecg-io into a nodecg-io directory.
//!
//! - [`production`] fetches released packages from the registry and only touches what changed.
//! - [`development`] clones the repository and builds it.
//! - [`request`] turns user choices into the [`Installation`](crate::Installation) the installers work towards.

use std::path::Path;

pub mod archive;
pub mod production;
pub mod development;
pub mod request;

/// Name of the directory npm installs dependencies into.
pub const NODE_MODULES: &str = "node_modules";

/// Everything the installers talk to.
#[derive(Clone, Copy)]
pub struct InstallContext<'a> {
	pub config: &'a crate::Config,
	pub registry: &'a dyn crate::registry::Registry,
	pub runner: &'a dyn crate::command::CommandRunner,
	pub git: &'a dyn crate::git::GitClient,
	pub store: &'a dyn crate::installation::InstallationStore,
	pub progress: &'a dyn ProgressObserver,
}

impl<'a> InstallContext<'a> {
	pub fn npm(&self) -> crate::command::Npm<'a> {
		crate::command::Npm::new(self.runner, self.config.package_manager())
	}
}

/// Receives progress updates of long running batches.
pub trait ProgressObserver: Send + Sync {
	/// Called after each finished item of a batch.
	fn progress(&self, completed: usize, total: usize);
}

/// Ignores all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
	fn progress(&self, _completed: usize, _total: usize) {}
}

/// Recursively deletes a directory. A directory that doesn't exist counts as deleted.
pub async fn remove_dir(dir: &Path) -> std::io::Result<()> {
	match tokio::fs::remove_dir_all(dir).await {
		Ok(()) => Ok(()),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
		Err(e) => Err(e),
	}
}

pub async fn ensure_dir(dir: &Path) -> std::io::Result<()> {
	if !dir.is_dir() {
		log::debug!("Creating directory {}", dir.display());
		tokio::fs::create_dir_all(dir).await?;
	}
	Ok(())
}
