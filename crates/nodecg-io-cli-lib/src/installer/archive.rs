//! Extracting package archives and linking dependencies that can't be hoisted.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::registry::ArchiveStream;
use crate::Package;
use super::NODE_MODULES;

/// npm archives have all content inside this directory.
const ARCHIVE_WRAPPER_DIR: &str = "package";

/// Chunks buffered between the download and the extraction thread.
const CHUNK_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum ArchiveError {
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("download failed: {0}")]
	Download(std::io::Error),
	#[error("archive entry \"{0}\" would be extracted outside of the package directory.")]
	UnsafePath(PathBuf),
	#[error("archive entry \"{entry}\" links to \"{target}\" which is outside of the package directory.")]
	UnsafeLink { entry: PathBuf, target: PathBuf },
}

/// Decompresses and unpacks a gzipped tar stream into `destination`.
///
/// The leading `package/` directory of every entry is stripped so the content lands directly in `destination`.
/// Returns once the whole stream has been consumed.
pub async fn extract(mut stream: ArchiveStream, destination: &Path) -> Result<(), ArchiveError> {
	let (tx, rx) = mpsc::channel::<std::io::Result<Vec<u8>>>(CHUNK_BUFFER);

	let dest = destination.to_path_buf();
	let extraction = tokio::task::spawn_blocking(move || unpack(ChannelReader::new(rx), &dest));

	let mut download_error = None;
	while let Some(chunk) = stream.next().await {
		let chunk = match chunk {
			Ok(c) => Ok(c),
			Err(e) => {
				let forwarded = std::io::Error::new(e.kind(), e.to_string());
				download_error = Some(e);
				Err(forwarded)
			}
		};

		let failed = chunk.is_err();
		/* the receiver is only gone when the extraction already failed */
		if tx.send(chunk).await.is_err() || failed {
			break;
		}
	}
	drop(tx);

	let result = extraction
		.await
		.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

	match download_error {
		Some(e) => Err(ArchiveError::Download(e)),
		None => result,
	}
}

fn unpack(reader: impl Read, destination: &Path) -> Result<(), ArchiveError> {
	std::fs::create_dir_all(destination)?;
	let root = std::fs::canonicalize(destination)?;

	let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(reader));
	for entry in archive.entries()? {
		let mut entry = entry?;
		let relative = strip_wrapper_dir(&entry.path()?);
		if relative.as_os_str().is_empty() {
			continue;
		}
		if !is_plain_relative(&relative) {
			return Err(ArchiveError::UnsafePath(relative));
		}

		let target = destination.join(&relative);
		if let Some(parent) = target.parent() {
			/* a link extracted earlier may redirect the parent */
			ensure_inside(&root, parent, &relative)?;
			std::fs::create_dir_all(parent)?;
		}

		match entry.header().entry_type() {
			tar::EntryType::Symlink => {
				let link_target = link_name(&entry, &relative)?;
				check_symlink_target(&relative, &link_target)?;
			},
			tar::EntryType::Link => {
				/* hard links name another entry of the archive, tar would resolve them against the working directory */
				let source = strip_wrapper_dir(&link_name(&entry, &relative)?);
				if source.as_os_str().is_empty() || !is_plain_relative(&source) {
					return Err(ArchiveError::UnsafeLink { entry: relative, target: source });
				}
				let source = destination.join(&source);
				ensure_inside(&root, &source, &relative)?;
				log::trace!("Linking {} to {}", target.display(), source.display());
				replace_with_hard_link(&source, &target)?;
				continue;
			},
			_ => {},
		}

		log::trace!("Extracting {}", target.display());
		entry.unpack(&target)?;
	}

	/* tar stops at the end marker, read the rest so the gzip trailer gets verified */
	let mut rest = archive.into_inner();
	std::io::copy(&mut rest, &mut std::io::sink())?;
	Ok(())
}

fn is_plain_relative(path: &Path) -> bool {
	path.components().all(|c| matches!(c, Component::Normal(_)))
}

fn link_name<R: Read>(entry: &tar::Entry<R>, relative: &Path) -> Result<PathBuf, ArchiveError> {
	entry.link_name()?
		.map(|name| name.into_owned())
		.ok_or_else(|| ArchiveError::UnsafeLink { entry: relative.to_path_buf(), target: PathBuf::new() })
}

/// Symlink targets are relative to the directory of the link and must not leave the package.
fn check_symlink_target(relative: &Path, link_target: &Path) -> Result<(), ArchiveError> {
	let unsafe_link = || ArchiveError::UnsafeLink { entry: relative.to_path_buf(), target: link_target.to_path_buf() };

	let mut depth = relative.components().count().saturating_sub(1);
	for component in link_target.components() {
		match component {
			Component::Normal(_) => depth += 1,
			Component::CurDir => {},
			Component::ParentDir => depth = depth.checked_sub(1).ok_or_else(unsafe_link)?,
			Component::RootDir | Component::Prefix(_) => return Err(unsafe_link()),
		}
	}
	Ok(())
}

/// Resolves the deepest existing ancestor of `path`, following links, and fails when it isn't below `root`.
fn ensure_inside(root: &Path, path: &Path, relative: &Path) -> Result<(), ArchiveError> {
	let Some(existing) = path.ancestors().find(|p| p.exists()) else {
		return Err(ArchiveError::UnsafePath(relative.to_path_buf()));
	};
	if std::fs::canonicalize(existing)?.starts_with(root) {
		Ok(())
	} else {
		Err(ArchiveError::UnsafePath(relative.to_path_buf()))
	}
}

fn replace_with_hard_link(source: &Path, target: &Path) -> std::io::Result<()> {
	match std::fs::remove_file(target) {
		Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
		_ => {},
	}
	std::fs::hard_link(source, target)
}

fn strip_wrapper_dir(path: &Path) -> PathBuf {
	let mut components = path.components()
		.filter(|c| !matches!(c, Component::CurDir))
		.peekable();
	if let Some(Component::Normal(first)) = components.peek() {
		if first.to_str() == Some(ARCHIVE_WRAPPER_DIR) {
			components.next();
		}
	}
	components.collect()
}

/// Blocking [`Read`] over chunks sent from the async side. Must only be used outside of the async runtime.
struct ChannelReader {
	rx: mpsc::Receiver<std::io::Result<Vec<u8>>>,
	chunk: Vec<u8>,
	pos: usize,
}

impl ChannelReader {
	fn new(rx: mpsc::Receiver<std::io::Result<Vec<u8>>>) -> Self {
		Self { rx, chunk: Vec::new(), pos: 0 }
	}
}

impl Read for ChannelReader {
	fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
		while self.pos >= self.chunk.len() {
			match self.rx.blocking_recv() {
				Some(Ok(chunk)) => {
					self.chunk = chunk;
					self.pos = 0;
				},
				Some(Err(e)) => return Err(e),
				None => return Ok(0),
			}
		}

		let n = buf.len().min(self.chunk.len() - self.pos);
		buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
		self.pos += n;
		Ok(n)
	}
}

/// Links every entry of [`Package::symlink`] from the local `node_modules` of the package to the hoisted
/// `node_modules` in `nodecg_io_dir`.
///
/// Existing links are replaced. A real directory in place of a link is left alone, npm already installed the dependency locally.
pub async fn create_symlinks(packages: &[Package], nodecg_io_dir: &Path) -> Result<(), ArchiveError> {
	for package in packages {
		for dependency in &package.symlink {
			let link = package.install_path(nodecg_io_dir).join(NODE_MODULES).join(dependency);
			let hoisted = nodecg_io_dir.join(NODE_MODULES).join(dependency);

			if let Some(parent) = link.parent() {
				tokio::fs::create_dir_all(parent).await?;
			}

			if let Ok(meta) = tokio::fs::symlink_metadata(&link).await {
				if meta.file_type().is_symlink() {
					remove_link(&link).await?;
				} else {
					log::debug!("{} already exists in {}, not linking it", dependency, package.name);
					continue;
				}
			}

			log::debug!("Linking {} to {}", link.display(), hoisted.display());
			symlink_dir(&hoisted, &link).await?;
		}
	}
	Ok(())
}

#[cfg(unix)]
async fn symlink_dir(original: &Path, link: &Path) -> std::io::Result<()> {
	tokio::fs::symlink(original, link).await
}

#[cfg(windows)]
async fn symlink_dir(original: &Path, link: &Path) -> std::io::Result<()> {
	tokio::fs::symlink_dir(original, link).await
}

#[cfg(unix)]
async fn remove_link(link: &Path) -> std::io::Result<()> {
	tokio::fs::remove_file(link).await
}

#[cfg(windows)]
async fn remove_link(link: &Path) -> std::io::Result<()> {
	tokio::fs::remove_dir(link).await
}

/// Deletes the directory of a package. Not being installed isn't an error.
pub async fn remove_package(package: &Package, nodecg_io_dir: &Path) -> std::io::Result<()> {
	let path = package.install_path(nodecg_io_dir);
	log::debug!("Removing package {} at {}", package, path.display());
	super::remove_dir(&path).await
}
