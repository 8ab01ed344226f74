//! Running external programs like npm.

use std::path::Path;
use std::process::Stdio;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
	#[error("command \"{}\" returned {}.", command_line(.command, .args), exit_code(.code))]
	Failed { command: String, args: Vec<String>, code: Option<i32> },
	#[error("command \"{}\" has been interrupted.", command_line(.command, .args))]
	Interrupted { command: String, args: Vec<String> },
	#[error("failed to run \"{command}\": {source}")]
	Spawn { command: String, source: std::io::Error },
}

pub fn command_line(command: &str, args: &[String]) -> String {
	std::iter::once(command)
		.chain(args.iter().map(String::as_str))
		.collect::<Vec<_>>()
		.join(" ")
}

fn exit_code(code: &Option<i32>) -> String {
	match code {
		Some(c) => format!("error code {}", c),
		None => "no exit code, it was terminated by a signal".to_string(),
	}
}

/// Starts external programs and waits for them to exit.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
	/// Runs the command with inherited stdio, `Ok` only for exit code zero.
	async fn run(&self, command: &str, args: &[String], working_dir: &Path) -> Result<(), CommandError>;

	/// Runs the command and captures its stdout.
	async fn output(&self, command: &str, args: &[String], working_dir: &Path) -> Result<String, CommandError>;
}

/// Runs commands as child processes of the cli.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
	fn command(command: &str, args: &[String], working_dir: &Path) -> tokio::process::Command {
		/* npm and friends are batch files on windows and need a shell */
		#[cfg(target_os = "windows")]
		let mut cmd = {
			let mut cmd = tokio::process::Command::new("cmd");
			cmd.arg("/C").arg(command);
			cmd
		};

		#[cfg(not(target_os = "windows"))]
		let mut cmd = tokio::process::Command::new(command);

		cmd.args(args)
			.current_dir(working_dir)
			.kill_on_drop(true);
		cmd
	}
}

#[async_trait::async_trait]
impl CommandRunner for SystemRunner {
	async fn run(&self, command: &str, args: &[String], working_dir: &Path) -> Result<(), CommandError> {
		log::info!(">>> {}", command_line(command, args));

		let mut child = Self::command(command, args, working_dir)
			.stdin(Stdio::inherit())
			.stdout(Stdio::inherit())
			.stderr(Stdio::inherit())
			.spawn()
			.map_err(|source| CommandError::Spawn { command: command.to_string(), source })?;

		/* The interrupt listener only lives as long as the child. Windows doesn't pass ctrl-c on to children by itself. */
		let status = tokio::select! {
			status = child.wait() => status.map_err(|source| CommandError::Spawn { command: command.to_string(), source })?,
			_ = tokio::signal::ctrl_c() => {
				log::warn!("Interrupted, stopping {}", command);
				if let Err(e) = child.kill().await {
					log::warn!("Failed to stop {}: {}", command, e);
				}
				return Err(CommandError::Interrupted { command: command.to_string(), args: args.to_vec() });
			}
		};

		if status.success() {
			Ok(())
		} else {
			Err(CommandError::Failed {
				command: command.to_string(),
				args: args.to_vec(),
				code: status.code(),
			})
		}
	}

	async fn output(&self, command: &str, args: &[String], working_dir: &Path) -> Result<String, CommandError> {
		log::debug!(">>> {}", command_line(command, args));

		let output = Self::command(command, args, working_dir)
			.stdin(Stdio::null())
			.stderr(Stdio::null())
			.output()
			.await
			.map_err(|source| CommandError::Spawn { command: command.to_string(), source })?;

		if output.status.success() {
			Ok(String::from_utf8_lossy(&output.stdout).into_owned())
		} else {
			Err(CommandError::Failed {
				command: command.to_string(),
				args: args.to_vec(),
				code: output.status.code(),
			})
		}
	}
}

/// The npm commands used by the installers.
#[derive(Clone, Copy)]
pub struct Npm<'a> {
	runner: &'a dyn CommandRunner,
	program: &'a str,
}

impl<'a> Npm<'a> {
	pub fn new(runner: &'a dyn CommandRunner, program: &'a str) -> Self {
		Self { runner, program }
	}

	/// Installs the dependencies of the package or workspace in `dir`.
	/// With `only_prod` dev dependencies are skipped.
	pub async fn install(&self, dir: &Path, only_prod: bool) -> Result<(), CommandError> {
		let mut args = vec!["install".to_string()];
		if only_prod {
			args.push("--omit=dev".to_string());
		}
		self.runner.run(self.program, &args, dir).await
	}

	/// Runs the `build` script of the package in `dir`.
	pub async fn build(&self, dir: &Path, concurrency: usize) -> Result<(), CommandError> {
		let args = ["run", "build", "--", "--concurrency"].iter()
			.map(|s| s.to_string())
			.chain(std::iter::once(concurrency.to_string()))
			.collect::<Vec<_>>();
		self.runner.run(self.program, &args, dir).await
	}

	/// Runs a script from the `package.json` in `dir`.
	pub async fn run_script(&self, dir: &Path, script: &str) -> Result<(), CommandError> {
		let args = vec!["run".to_string(), script.to_string()];
		self.runner.run(self.program, &args, dir).await
	}

	/// `None` when npm can't be run, e.g. because it isn't in `$PATH`.
	pub async fn version(&self) -> Option<semver::Version> {
		let cwd = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
		let out = match self.runner.output(self.program, &["--version".to_string()], &cwd).await {
			Ok(o) => o,
			Err(e) => {
				log::debug!("Could not get npm version: {}", e);
				return None;
			}
		};
		semver::Version::parse(out.trim()).ok()
	}

	/// Production installs need npm workspaces and development installs lockfile v2, both came with npm 7.
	///
	/// # Errors
	/// [`Validation`](crate::error::Error::Validation) when npm is missing or too old.
	pub async fn require_v7(&self) -> crate::Result<()> {
		let version = self.version().await.ok_or_else(|| crate::Error::Validation(
			"could not find npm. make sure npm is installed and in your $PATH.".to_string()
		))?;

		if version.major < 7 {
			return Err(crate::Error::Validation(format!(
				"the nodecg-io cli requires npm 7.0.0 or higher, you have {}. update npm by running \"npm install -g npm\".",
				version
			)));
		}
		Ok(())
	}
}
