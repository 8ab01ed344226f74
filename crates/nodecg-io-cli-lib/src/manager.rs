//! The `install` and `uninstall` commands.

use std::path::Path;

use crate::host;
use crate::installation::Installation;
use crate::installer::{self, development, production, InstallContext};

/// Directory of the services in a development install.
pub const SERVICES_DIR: &str = "services";
/// Directory of the samples in a development install.
pub const SAMPLES_DIR: &str = "samples";

/// Installs or updates nodecg-io in the nodecg installation at `nodecg_dir` and registers its bundle directories with nodecg.
///
/// Switching between a production and a development install removes the old install completely first.
pub async fn install(ctx: &InstallContext<'_>, nodecg_dir: &Path, requested: &Installation) -> crate::Result<()> {
	let nodecg_io_dir = host::nodecg_io_directory(nodecg_dir);

	ctx.npm().require_v7().await?;

	let mut current = ctx.store.read(&nodecg_io_dir).await;
	if let Some(install) = &current {
		if install.is_development() != requested.is_development() {
			log::info!(
				"Switching from nodecg-io {} to {}, removing the current install...",
				install.version(), requested.version()
			);
			installer::remove_dir(&nodecg_io_dir).await?;
			current = None;
		}
	}

	match requested {
		Installation::Production(requested) => {
			let current = match current {
				Some(Installation::Production(c)) => Some(c),
				_ => None,
			};
			production::create_production_install(ctx, requested, current, &nodecg_io_dir).await?;
		},
		Installation::Development(requested) => {
			let current = match current {
				Some(Installation::Development(c)) => Some(c),
				_ => None,
			};
			development::create_dev_install(ctx, requested, current.as_ref(), &nodecg_io_dir).await?;
		},
	}

	register_bundle_dirs(nodecg_dir, &nodecg_io_dir, requested).await?;
	log::info!("Successfully installed nodecg-io {}.", requested.version());
	Ok(())
}

/// Packages of a production install are bundles right inside the nodecg-io directory, a development install
/// additionally has its services and samples in subdirectories.
async fn register_bundle_dirs(nodecg_dir: &Path, nodecg_io_dir: &Path, install: &Installation) -> crate::Result<()> {
	let (services, samples) = match install {
		Installation::Production(_) => (false, false),
		Installation::Development(dev) => (true, dev.use_samples),
	};

	host::manage_bundle_dir(nodecg_dir, nodecg_io_dir, true).await?;
	host::manage_bundle_dir(nodecg_dir, &nodecg_io_dir.join(SERVICES_DIR), services).await?;
	host::manage_bundle_dir(nodecg_dir, &nodecg_io_dir.join(SAMPLES_DIR), samples).await?;
	Ok(())
}

/// Removes nodecg-io from the nodecg config and deletes it.
pub async fn uninstall(nodecg_dir: &Path) -> crate::Result<()> {
	let nodecg_io_dir = host::nodecg_io_directory(nodecg_dir);
	if !nodecg_io_dir.is_dir() {
		log::info!("nodecg-io is not installed, nothing to uninstall.");
		return Ok(());
	}

	host::manage_bundle_dir(nodecg_dir, &nodecg_io_dir, false).await?;
	host::manage_bundle_dir(nodecg_dir, &nodecg_io_dir.join(SERVICES_DIR), false).await?;
	host::manage_bundle_dir(nodecg_dir, &nodecg_io_dir.join(SAMPLES_DIR), false).await?;

	log::debug!("Deleting {}", nodecg_io_dir.display());
	installer::remove_dir(&nodecg_io_dir).await?;

	log::info!("Successfully uninstalled nodecg-io.");
	Ok(())
}
