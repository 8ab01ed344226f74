//! Production installs: released packages from the registry, installed as one npm workspace.
//!
//! Only the difference between the installed and the requested packages is touched. The install info is
//! written after every removed package and after the whole batch of new packages, so an interrupted run
//! always leaves an install info that matches the disk and the next run continues from there.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;

use crate::Package;
use crate::installation::{Installation, ProductionInstallation};
use crate::package::diff_packages;
use super::{archive, InstallContext};

/// Name of the generated workspace `package.json`.
const WORKSPACE_NAME: &str = "nodecg-io-install";

/// Brings the nodecg-io directory from `current` to `requested`.
///
/// # Parameters
/// - `requested` - The wanted state.
/// - `current` - What the install info says is installed, `None` for a fresh install.
/// - `nodecg_io_dir` - The directory all packages are installed into.
///
/// # Errors
/// Registry, archive and npm errors abort the run. Already removed packages stay recorded as removed,
/// packages of a failed install batch are deleted again and never recorded.
pub async fn create_production_install(ctx: &InstallContext<'_>, requested: &ProductionInstallation, current: Option<ProductionInstallation>, nodecg_io_dir: &Path) -> crate::Result<()> {
	super::ensure_dir(nodecg_io_dir).await?;

	let current = match current {
		Some(mut current) => {
			if validate_install(&mut current, nodecg_io_dir).await {
				ctx.store.write(nodecg_io_dir, &Installation::Production(current.clone())).await?;
			}
			current
		},
		None => ProductionInstallation::default(),
	};

	let diff = diff_packages(&requested.packages, &current.packages);
	if diff.is_empty() {
		log::info!("All requested packages are already installed.");
		return Ok(());
	}

	/* the install info describes the requested release from now on, the package list shows how far we got */
	let mut install = ProductionInstallation {
		version: requested.version.clone(),
		packages: current.packages,
	};

	if !diff.remove.is_empty() {
		remove_packages(ctx, &diff.remove, &mut install, nodecg_io_dir).await?;
	}

	if !diff.install.is_empty() {
		install_packages(ctx, &diff.install, &mut install, nodecg_io_dir).await?;
	}

	Ok(())
}

/// Drops every package from the install info whose directory is gone, e.g. because it was deleted by hand.
///
/// Anything occupying the install path keeps the package, a stray file there must be removed like the directory
/// it replaced and can't be extracted over.
///
/// Returns whether any package was dropped.
pub async fn validate_install(install: &mut ProductionInstallation, nodecg_io_dir: &Path) -> bool {
	let claimed = install.packages.len();
	let mut valid = Vec::with_capacity(claimed);
	for package in install.packages.drain(..) {
		let path = package.install_path(nodecg_io_dir);
		let exists = tokio::fs::symlink_metadata(&path).await.is_ok();
		if exists {
			valid.push(package);
		} else {
			log::warn!("Package {} is missing at {}, it will be installed again if needed.", package, path.display());
		}
	}

	install.packages = valid;
	install.packages.len() != claimed
}

/// Removes packages one at a time, recording each removal in the install info right away.
///
/// Packages nested in a removed package are deleted with it and are dropped from the install info as well.
///
/// # Errors
/// The first failing removal aborts, removals before it stay recorded.
pub async fn remove_packages(ctx: &InstallContext<'_>, packages: &[Package], install: &mut ProductionInstallation, nodecg_io_dir: &Path) -> crate::Result<()> {
	log::info!("Removing {} packages...", packages.len());

	for package in packages {
		archive::remove_package(package, nodecg_io_dir).await?;
		install.packages.retain(|p| p != package && !p.is_nested_in(package));
		ctx.store.write(nodecg_io_dir, &Installation::Production(install.clone())).await?;
		log::debug!("Removed package {}", package);
	}

	log::info!("Removed {} packages.", packages.len());
	Ok(())
}

/// Downloads all packages, installs their dependencies as one npm workspace and records them in the install info.
///
/// # Errors
/// When a download or the dependency install fails every package of this batch is deleted again
/// and nothing is recorded.
pub async fn install_packages(ctx: &InstallContext<'_>, packages: &[Package], install: &mut ProductionInstallation, nodecg_io_dir: &Path) -> crate::Result<()> {
	log::info!("Installing {} packages...", packages.len());

	let result = fetch_and_setup(ctx, packages, install, nodecg_io_dir).await;
	if let Err(e) = result {
		log::error!("Installing packages failed, reverting: {}", e);
		revert_install(packages, nodecg_io_dir).await;
		return Err(e);
	}

	for package in packages {
		if !install.packages.contains(package) {
			install.packages.push(package.clone());
		}
	}
	ctx.store.write(nodecg_io_dir, &Installation::Production(install.clone())).await?;

	log::info!("Installed {} packages.", packages.len());
	Ok(())
}

async fn fetch_and_setup(ctx: &InstallContext<'_>, packages: &[Package], install: &ProductionInstallation, nodecg_io_dir: &Path) -> crate::Result<()> {
	download_packages(ctx, packages, nodecg_io_dir).await?;

	let mut workspace_packages = install.packages.clone();
	workspace_packages.extend(packages.iter().filter(|p| !install.packages.contains(p)).cloned());
	write_workspace_manifest(&workspace_packages, nodecg_io_dir).await?;

	log::info!("Installing dependencies...");
	ctx.npm().install(nodecg_io_dir, true).await?;

	archive::create_symlinks(packages, nodecg_io_dir).await?;
	Ok(())
}

/// Fetches and extracts all packages, at most [`download_concurrency`](crate::Config::download_concurrency) at once.
///
/// After the first failure no further downloads are started, the ones already running are finished
/// before the error is returned.
pub async fn download_packages(ctx: &InstallContext<'_>, packages: &[Package], nodecg_io_dir: &Path) -> crate::Result<()> {
	let total = packages.len();
	let failed = AtomicBool::new(false);

	let mut downloads = futures_util::stream::iter(packages)
		.take_while(|_| futures_util::future::ready(!failed.load(Ordering::Relaxed)))
		.map(|package| async move {
			(package, download_package(ctx, package, nodecg_io_dir).await)
		})
		.buffer_unordered(ctx.config.download_concurrency());

	let mut completed = 0;
	let mut error = None;
	while let Some((package, result)) = downloads.next().await {
		match result {
			Ok(()) => {
				completed += 1;
				ctx.progress.progress(completed, total);
			},
			Err(e) => {
				log::error!("Failed to download package {}: {}", package, e);
				failed.store(true, Ordering::Relaxed);
				error.get_or_insert(e);
			},
		}
	}

	match error {
		Some(e) => Err(e),
		None => Ok(()),
	}
}

async fn download_package(ctx: &InstallContext<'_>, package: &Package, nodecg_io_dir: &Path) -> crate::Result<()> {
	let stream = ctx.registry.archive_stream(&package.name, &package.version).await?;
	archive::extract(stream, &package.install_path(nodecg_io_dir)).await?;
	log::debug!("Extracted package {}", package);
	Ok(())
}

async fn revert_install(packages: &[Package], nodecg_io_dir: &Path) {
	for package in packages {
		if let Err(e) = archive::remove_package(package, nodecg_io_dir).await {
			log::warn!("Failed to remove package {} while reverting: {}", package, e);
		}
	}
}

/// The root `package.json` that makes every installed package a member of one npm workspace,
/// so one `npm install` sets up all of them and shares common dependencies.
pub fn workspace_manifest(packages: &[Package]) -> serde_json::Value {
	serde_json::json!({
		"name": WORKSPACE_NAME,
		"private": true,
		"workspaces": packages.iter().map(|p| p.path.as_str()).collect::<Vec<_>>(),
	})
}

pub async fn write_workspace_manifest(packages: &[Package], nodecg_io_dir: &Path) -> crate::Result<()> {
	let content = serde_json::to_vec_pretty(&workspace_manifest(packages))?;
	tokio::fs::write(nodecg_io_dir.join("package.json"), content).await?;
	Ok(())
}
