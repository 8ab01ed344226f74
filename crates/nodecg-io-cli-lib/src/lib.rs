pub mod error;
pub use error::Result;
pub use error::Error;

pub mod config;
pub use config::Config;

pub mod package;
pub use package::Package;

pub mod installation;
pub use installation::Installation;

pub mod versions;
pub mod registry;
pub mod command;
pub mod git;
pub mod installer;
pub mod host;
pub mod manager;
pub mod generate;
pub mod update;
