//! Git operations needed to keep a development install up to date.

use std::path::Path;

#[async_trait::async_trait]
pub trait GitClient: Send + Sync {
	async fn clone_repository(&self, url: &str, dir: &Path) -> crate::Result<()>;

	/// Fetches `origin` and returns the commit the remote counterpart of the current branch points to.
	async fn fetch(&self, dir: &Path) -> crate::Result<String>;

	/// Commit hash of `HEAD`.
	async fn head_commit(&self, dir: &Path) -> crate::Result<String>;

	/// Moves the current branch forward to `commit`. The working tree is left untouched, see [`checkout`](GitClient::checkout).
	async fn fast_forward(&self, dir: &Path, commit: &str) -> crate::Result<()>;

	/// Updates the working tree to match `HEAD`, local changes to tracked files are overwritten.
	async fn checkout(&self, dir: &Path) -> crate::Result<()>;
}

/// [`GitClient`] using libgit2, no git installation is required.
///
/// libgit2 blocks, so every operation runs on the blocking thread pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Client;

async fn blocking<T, F>(f: F) -> crate::Result<T>
where
	T: Send + 'static,
	F: FnOnce() -> crate::Result<T> + Send + 'static,
{
	tokio::task::spawn_blocking(f)
		.await
		.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
}

#[async_trait::async_trait]
impl GitClient for Git2Client {
	async fn clone_repository(&self, url: &str, dir: &Path) -> crate::Result<()> {
		let url = url.to_string();
		let dir = dir.to_path_buf();
		blocking(move || {
			log::info!("Cloning {} into {}", url, dir.display());
			git2::Repository::clone(&url, &dir)?;
			Ok(())
		}).await
	}

	async fn fetch(&self, dir: &Path) -> crate::Result<String> {
		let dir = dir.to_path_buf();
		blocking(move || {
			let repo = git2::Repository::open(&dir)?;
			let branch = current_branch(&repo, &dir)?;

			log::debug!("Fetching origin of {}", dir.display());
			let mut remote = repo.find_remote("origin")?;
			remote.fetch::<&str>(&[], None, None)?;

			let remote_ref = repo.find_reference(&format!("refs/remotes/origin/{}", branch))?;
			let commit = remote_ref.peel_to_commit()?.id().to_string();
			Ok(commit)
		}).await
	}

	async fn head_commit(&self, dir: &Path) -> crate::Result<String> {
		let dir = dir.to_path_buf();
		blocking(move || {
			let repo = git2::Repository::open(&dir)?;
			let commit = repo.head()?.peel_to_commit()?.id().to_string();
			Ok(commit)
		}).await
	}

	async fn fast_forward(&self, dir: &Path, commit: &str) -> crate::Result<()> {
		let dir = dir.to_path_buf();
		let commit = commit.to_string();
		blocking(move || {
			let repo = git2::Repository::open(&dir)?;
			let oid = git2::Oid::from_str(&commit)?;
			let annotated = repo.find_annotated_commit(oid)?;
			let (analysis, _) = repo.merge_analysis(&[&annotated])?;

			if analysis.is_up_to_date() {
				return Ok(());
			}
			if !analysis.is_fast_forward() {
				return Err(crate::Error::Validation(format!(
					"the repository at {} has diverged from origin and can't be fast-forwarded. resolve this manually.",
					dir.display()
				)));
			}

			let mut head = repo.head()?;
			head.set_target(oid, &format!("nodecg-io-cli: fast-forward to {}", commit))?;
			Ok(())
		}).await
	}

	async fn checkout(&self, dir: &Path) -> crate::Result<()> {
		let dir = dir.to_path_buf();
		blocking(move || {
			let repo = git2::Repository::open(&dir)?;
			log::debug!("Checking out HEAD in {}", dir.display());
			repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))?;
			Ok(())
		}).await
	}
}

fn current_branch(repo: &git2::Repository, dir: &Path) -> crate::Result<String> {
	let head = repo.head()?;
	if !head.is_branch() {
		return Err(crate::Error::Validation(format!("HEAD of the repository at {} is not on a branch.", dir.display())));
	}
	head.shorthand()
		.map(str::to_string)
		.ok_or_else(|| crate::Error::Parse("branch name is not valid UTF-8".to_string()))
}
