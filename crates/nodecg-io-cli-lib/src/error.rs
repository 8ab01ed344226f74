//! Library error type.

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("git error: {0}")]
	Git(#[from] git2::Error),
	#[error("registry error: {0}")]
	Registry(#[from] crate::registry::RegistryError),
	#[error("archive error: {0}")]
	Archive(#[from] crate::installer::archive::ArchiveError),
	#[error("{0}")]
	Command(#[from] crate::command::CommandError),
	#[error("parsing error: {0}")]
	Parse(String),
	#[error("validation error: {0}")]
	Validation(String),
	#[error("couldn't find a nodecg installation in {0} or any of its parent directories. make sure you are inside your nodecg installation.")]
	HostNotFound(std::path::PathBuf),
}
