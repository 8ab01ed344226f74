use std::path::Path;

use nodecg_io_cli::command::SystemRunner;
use nodecg_io_cli::generate::{self, GenerationOptions};
use nodecg_io_cli::git::Git2Client;
use nodecg_io_cli::host;
use nodecg_io_cli::installation::JsonInstallationStore;
use nodecg_io_cli::installer::request::{self, InstallOptions};
use nodecg_io_cli::installer::{InstallContext, ProgressObserver};
use nodecg_io_cli::manager;
use nodecg_io_cli::registry::RegistryClient;
use nodecg_io_cli::update::{self, CliUpdate};

const USAGE: &str = "Usage: nodecg-io <install|uninstall|generate> [options]

Commands:
    install      installs or updates nodecg-io in the nodecg installation of the current directory
    uninstall    removes nodecg-io from the nodecg installation
    generate     generates a new bundle that uses the installed services (needs --name)";

#[tokio::main]
async fn main() {
	let mut opts;

	/* Parse console input */
	let parsed_options = {
		let args: Vec<String> = std::env::args().collect();

		opts = getopts::Options::new();
		opts.optflag("h", "help", "Show help");
		opts.optflag("v", "verbose", "Increased verbosity");
		opts.optopt("", "nodecg-io-version", "Release to install, \"development\" for a development install", "VERSION");
		opts.optmulti("s", "service", "Service to install or use in a generated bundle, may be repeated", "SERVICE");
		opts.optflag("", "all-services", "Install every service of the release");
		opts.optflag("", "samples", "Load the samples of a development install");
		opts.optflag("", "docs", "Clone the docs into a development install");
		opts.optopt("j", "concurrency", "Number of parallel downloads and build jobs", "N");
		opts.optopt("n", "name", "Name of the bundle to generate", "NAME");
		opts.parsing_style(getopts::ParsingStyle::FloatingFrees);

		let parsed_options = match opts.parse(&args[1..]) {
			Ok(m) => m,
			Err(e) => {
				eprintln!("Unable to parse options: {}", e);
				std::process::exit(1);
			}
		};

		if parsed_options.opt_present("h") {
			eprintln!("{}", opts.usage(USAGE));
			return;
		}

		parsed_options
	};

	let default_filter = if parsed_options.opt_present("v") { "debug" } else { "info" };
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

	let config = match nodecg_io_cli::Config::load_from_disk() {
		Ok(c) => c,
		Err(nodecg_io_cli::Error::IO(e)) if e.kind() == std::io::ErrorKind::NotFound => nodecg_io_cli::Config::default(),
		Err(e) => {
			log::warn!("Failed to read config file: {}", e);
			log::warn!("Using default config.");
			nodecg_io_cli::Config::default()
		}
	};

	let update_check = spawn_update_check(&config);

	/* dropping the running command also kills any child process it started */
	let result = tokio::select! {
		result = run(config, &parsed_options) => result,
		_ = tokio::signal::ctrl_c() => Err(Error::Interrupted),
	};

	if matches!(result, Err(Error::Interrupted)) {
		update_check.abort();
	} else if let Ok(Some(update)) = update_check.await {
		update.log_notice();
	}

	if let Err(e) = result {
		log::error!("{}", e);
		std::process::exit(1);
	}
}

/// Runs next to the command, its outcome is only reported once the command is done.
fn spawn_update_check(config: &nodecg_io_cli::Config) -> tokio::task::JoinHandle<Option<CliUpdate>> {
	let registry = RegistryClient::new(config);
	tokio::spawn(async move {
		match registry {
			Ok(registry) => update::check_for_cli_update(&registry).await,
			Err(e) => {
				log::warn!("Cannot check for cli updates: {}", e);
				None
			},
		}
	})
}

async fn run(config: nodecg_io_cli::Config, options: &getopts::Matches) -> Result<(), Error> {
	let command = options.free.first().ok_or(Error::MissingCommand)?;

	let cwd = std::env::current_dir()?;
	let nodecg_dir = host::find_nodecg_directory(&cwd).await?;
	log::debug!("Detected nodecg installation at {}.", nodecg_dir.display());

	match command.as_str() {
		"install" => install(config, &nodecg_dir, options).await,
		"uninstall" => Ok(manager::uninstall(&nodecg_dir).await?),
		"generate" => generate(config, &nodecg_dir, options).await,
		other => Err(Error::UnknownCommand(other.to_string())),
	}
}

async fn install(mut config: nodecg_io_cli::Config, nodecg_dir: &Path, options: &getopts::Matches) -> Result<(), Error> {
	let concurrency = match options.opt_str("concurrency") {
		Some(n) => Some(n.parse::<usize>().map_err(|_| Error::InvalidArgument("--concurrency", n))?),
		None => None,
	};

	let install_options = InstallOptions {
		version: options.opt_str("nodecg-io-version"),
		services: options.opt_strs("service"),
		all_services: options.opt_present("all-services"),
		samples: options.opt_present("samples"),
		docs: options.opt_present("docs"),
		concurrency,
	};
	install_options.apply_to(&mut config);

	let collaborators = Collaborators::new(&config)?;
	let ctx = collaborators.context(&config);

	let current = ctx.store.read(&host::nodecg_io_directory(nodecg_dir)).await;
	let requested = request::plan_installation(ctx.registry, &install_options, current.as_ref()).await?;

	manager::install(&ctx, nodecg_dir, &requested).await?;
	Ok(())
}

async fn generate(config: nodecg_io_cli::Config, nodecg_dir: &Path, options: &getopts::Matches) -> Result<(), Error> {
	let name = options.opt_str("name").ok_or(Error::MissingArgument("--name"))?;
	let mut generation_options = GenerationOptions::new(name);
	generation_options.services = options.opt_strs("service");

	let collaborators = Collaborators::new(&config)?;
	let ctx = collaborators.context(&config);

	let current = ctx.store.read(&host::nodecg_io_directory(nodecg_dir)).await;
	let install = generate::ensure_valid_installation(current.as_ref())?;

	generate::generate_bundle(&ctx, nodecg_dir, &generation_options, install).await?;
	log::info!("Successfully generated bundle {}.", generation_options.bundle_name);
	Ok(())
}

/// The real implementations of everything the installers talk to.
struct Collaborators {
	registry: RegistryClient,
	runner: SystemRunner,
	git: Git2Client,
	store: JsonInstallationStore,
	progress: LogProgress,
}

impl Collaborators {
	fn new(config: &nodecg_io_cli::Config) -> Result<Self, Error> {
		Ok(Self {
			registry: RegistryClient::new(config).map_err(nodecg_io_cli::Error::from)?,
			runner: SystemRunner,
			git: Git2Client,
			store: JsonInstallationStore,
			progress: LogProgress,
		})
	}

	fn context<'a>(&'a self, config: &'a nodecg_io_cli::Config) -> InstallContext<'a> {
		InstallContext {
			config,
			registry: &self.registry,
			runner: &self.runner,
			git: &self.git,
			store: &self.store,
			progress: &self.progress,
		}
	}
}

struct LogProgress;

impl ProgressObserver for LogProgress {
	fn progress(&self, completed: usize, total: usize) {
		log::info!("Downloaded {}/{} packages", completed, total);
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	Cli(#[from] nodecg_io_cli::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("no command given, use install, uninstall or generate. see --help.")]
	MissingCommand,
	#[error("unknown command \"{0}\". see --help.")]
	UnknownCommand(String),
	#[error("missing argument {0}")]
	MissingArgument(&'static str),
	#[error("invalid value for {0}: \"{1}\"")]
	InvalidArgument(&'static str, String),
	#[error("interrupted")]
	Interrupted,
}
