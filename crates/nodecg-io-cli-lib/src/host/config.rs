//! The `bundles.paths` setting of the nodecg configuration at `cfg/nodecg.json`.
//!
//! nodecg loads bundles from every directory listed there. Only that list is touched,
//! all other settings are written back as they were read.

use std::path::{Path, PathBuf};

use serde::Serialize;

const CONFIG_DIR: &str = "cfg";
const CONFIG_NAME: &str = "nodecg.json";

pub fn config_path(nodecg_dir: &Path) -> PathBuf {
	nodecg_dir.join(CONFIG_DIR).join(CONFIG_NAME)
}

/// Adds `bundle_dir` to or removes it from the bundle paths of the nodecg config.
///
/// The file is only written if the list has to change. A missing config file is treated as an empty config.
///
/// # Returns
/// Whether the config file was written.
///
/// # Errors
/// [`Parse`](crate::Error::Parse) when the existing config doesn't have the structure nodecg expects.
pub async fn manage_bundle_dir(nodecg_dir: &Path, bundle_dir: &Path, include: bool) -> crate::Result<bool> {
	let bundle_dir = bundle_dir.to_str()
		.ok_or_else(|| crate::Error::Parse(format!("bundle directory {} is not valid UTF-8.", bundle_dir.display())))?;

	let mut config = read_config(nodecg_dir).await?;
	if !update_bundle_paths(&mut config, bundle_dir, include)? {
		return Ok(false);
	}

	write_config(nodecg_dir, &config).await?;
	if include {
		log::debug!("Added bundle dir \"{}\" to your nodecg config.", bundle_dir);
	} else {
		log::debug!("Removed bundle dir \"{}\" from your nodecg config.", bundle_dir);
	}
	Ok(true)
}

/// Returns whether `config` was changed.
fn update_bundle_paths(config: &mut serde_json::Value, bundle_dir: &str, include: bool) -> crate::Result<bool> {
	let root = config.as_object_mut()
		.ok_or_else(|| crate::Error::Parse("nodecg config is not a JSON object.".to_string()))?;
	let bundles = root.entry("bundles")
		.or_insert_with(|| serde_json::json!({}))
		.as_object_mut()
		.ok_or_else(|| crate::Error::Parse("\"bundles\" in the nodecg config is not an object.".to_string()))?;
	let paths = bundles.entry("paths")
		.or_insert_with(|| serde_json::json!([]))
		.as_array_mut()
		.ok_or_else(|| crate::Error::Parse("\"bundles.paths\" in the nodecg config is not an array.".to_string()))?;

	let included = paths.iter().any(|p| p.as_str() == Some(bundle_dir));
	if included == include {
		return Ok(false);
	}

	if include {
		paths.push(serde_json::Value::String(bundle_dir.to_string()));
	} else {
		paths.retain(|p| p.as_str() != Some(bundle_dir));
	}
	Ok(true)
}

async fn read_config(nodecg_dir: &Path) -> crate::Result<serde_json::Value> {
	let path = config_path(nodecg_dir);
	match tokio::fs::read(&path).await {
		Ok(content) => Ok(serde_json::from_slice(&content)?),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
			log::debug!("No nodecg config at {}, starting with an empty one", path.display());
			Ok(serde_json::json!({}))
		},
		Err(e) => Err(e.into()),
	}
}

async fn write_config(nodecg_dir: &Path, config: &serde_json::Value) -> crate::Result<()> {
	crate::installer::ensure_dir(&nodecg_dir.join(CONFIG_DIR)).await?;

	tokio::fs::write(config_path(nodecg_dir), pretty_json(config)?).await?;
	Ok(())
}

/// Pretty prints with 4 spaces like nodecg and npm do.
pub(crate) fn pretty_json(value: &impl Serialize) -> crate::Result<Vec<u8>> {
	let mut content = Vec::new();
	let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
	let mut serializer = serde_json::Serializer::with_formatter(&mut content, formatter);
	value.serialize(&mut serializer)?;
	Ok(content)
}
