//! Development installs: a clone of the nodecg-io repository, built locally.
//!
//! Every run fetches the latest commit, the expensive npm install and build only run when the
//! checked out commit differs from the one the last build was made from.

use std::path::{Path, PathBuf};

use crate::git::GitClient;
use crate::installation::{DevelopmentInstallation, Installation};
use super::{InstallContext, NODE_MODULES};

/// Directory of the docs repository inside the nodecg-io directory.
pub const DOCS_DIR: &str = "docs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repository {
	/// The nodecg-io repository itself.
	Main,
	/// The documentation, cloned into [`DOCS_DIR`].
	Docs,
}

/// What [`sync_repository`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositorySync {
	Cloned,
	/// Fetched, no new commits.
	UpToDate,
	/// Fetched, fast-forwarded and checked out new commits.
	Updated,
}

impl RepositorySync {
	/// Whether files of the working tree changed.
	pub fn changed_files(&self) -> bool {
		!matches!(self, RepositorySync::UpToDate)
	}
}

/// Clones or updates the repository and builds it if the commit changed.
///
/// The install info is written at the end of every successful run, also when nothing was rebuilt,
/// so changed `use_samples`/`clone_docs` flags are always recorded. A failed build records nothing.
///
/// # Returns
/// The [`DevelopmentInstallation`] that was recorded.
pub async fn create_dev_install(ctx: &InstallContext<'_>, requested: &DevelopmentInstallation, current: Option<&DevelopmentInstallation>, nodecg_io_dir: &Path) -> crate::Result<DevelopmentInstallation> {
	let sync = sync_repository(ctx.git, ctx.config.repository_url(), nodecg_io_dir, Repository::Main).await?;
	manage_docs(ctx, requested.clone_docs, nodecg_io_dir).await?;

	let commit = ctx.git.head_commit(nodecg_io_dir).await?;
	let previous_commit = current.and_then(|c| c.commit_hash.as_deref());

	let mut install = DevelopmentInstallation {
		commit_hash: previous_commit.map(str::to_string),
		use_samples: requested.use_samples,
		clone_docs: requested.clone_docs,
	};

	/* a checkout deletes all node_modules, so it always needs a new npm install */
	if previous_commit == Some(commit.as_str()) && !sync.changed_files() {
		log::info!("nodecg-io is already built at commit {}, skipping npm install and build.", commit);
	} else {
		log::info!("Installing dependencies and building nodecg-io at commit {}...", commit);
		let npm = ctx.npm();
		npm.install(nodecg_io_dir, false).await?;
		npm.build(nodecg_io_dir, ctx.config.build_concurrency()).await?;
		install.commit_hash = Some(commit);
	}

	ctx.store.write(nodecg_io_dir, &Installation::Development(install.clone())).await?;
	Ok(install)
}

async fn manage_docs(ctx: &InstallContext<'_>, clone_docs: bool, nodecg_io_dir: &Path) -> crate::Result<()> {
	let docs_dir = nodecg_io_dir.join(DOCS_DIR);
	if clone_docs {
		sync_repository(ctx.git, ctx.config.docs_repository_url(), &docs_dir, Repository::Docs).await?;
	} else if docs_dir.exists() {
		log::info!("Removing docs at {}, they are no longer wanted.", docs_dir.display());
		super::remove_dir(&docs_dir).await?;
	}
	Ok(())
}

/// Clones the repository into `dir` or, if it already exists, fetches and fast-forwards to the latest commit of its branch.
///
/// Before the main repository is checked out all `node_modules` directories in it are deleted,
/// the following npm install recreates them.
pub async fn sync_repository(git: &dyn GitClient, url: &str, dir: &Path, repository: Repository) -> crate::Result<RepositorySync> {
	if !dir.is_dir() {
		log::info!("Cloning {:?} repository...", repository);
		git.clone_repository(url, dir).await?;
		log::info!("Cloned {:?} repository.", repository);
		return Ok(RepositorySync::Cloned);
	}

	let remote_commit = git.fetch(dir).await?;
	let local_commit = git.head_commit(dir).await?;
	if remote_commit == local_commit {
		log::info!("{:?} repository is up to date.", repository);
		return Ok(RepositorySync::UpToDate);
	}

	log::info!("Updating {:?} repository to {}...", repository, remote_commit);
	git.fast_forward(dir, &remote_commit).await?;

	if repository == Repository::Main {
		remove_node_modules(dir).await?;
	}

	git.checkout(dir).await?;
	Ok(RepositorySync::Updated)
}

/// Deletes every `node_modules` directory below `dir`.
pub async fn remove_node_modules(dir: &Path) -> crate::Result<()> {
	let root = dir.to_path_buf();
	let found = tokio::task::spawn_blocking(move || find_node_modules(&root))
		.await
		.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

	log::debug!("Removing {} node_modules directories in {}", found.len(), dir.display());
	for path in found {
		super::remove_dir(&path).await?;
	}
	Ok(())
}

fn find_node_modules(dir: &Path) -> Vec<PathBuf> {
	let mut found = Vec::new();
	let mut walker = walkdir::WalkDir::new(dir).follow_links(false).into_iter();

	while let Some(entry) = walker.next() {
		let entry = match entry {
			Ok(e) => e,
			Err(e) => {
				log::debug!("Skipping unreadable entry: {}", e);
				continue;
			}
		};

		if !entry.file_type().is_dir() {
			continue;
		}
		if entry.file_name() == NODE_MODULES {
			found.push(entry.into_path());
			walker.skip_current_dir();
		} else if entry.file_name() == ".git" {
			walker.skip_current_dir();
		}
	}

	found
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn finds_nested_node_modules_only_once() {
		let dir = tempfile::tempdir().unwrap();
		let root = dir.path();
		std::fs::create_dir_all(root.join("node_modules/a/node_modules/b")).unwrap();
		std::fs::create_dir_all(root.join("services/nodecg-io-obs/node_modules/obs-websocket-js")).unwrap();
		std::fs::create_dir_all(root.join("services/nodecg-io-obs/extension")).unwrap();
		std::fs::create_dir_all(root.join(".git/node_modules")).unwrap();

		let mut found = find_node_modules(root);
		found.sort();
		assert_eq!(found, vec![
			root.join("node_modules"),
			root.join("services/nodecg-io-obs/node_modules"),
		]);
	}
}
