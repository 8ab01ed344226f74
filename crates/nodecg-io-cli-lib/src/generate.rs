//! Generates new TypeScript nodecg bundles that use the installed nodecg-io services.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::host::config::pretty_json;
use crate::installation::{Installation, ProductionInstallation};
use crate::installer::InstallContext;
use crate::versions::{self, CORE_PACKAGE, CORE_PACKAGES};
use crate::Package;

/// Directory of the nodecg installation that holds the bundles.
pub const BUNDLES_DIR: &str = "bundles";

const NODECG_COMPATIBLE_RANGE: &str = "^1.4.0";

/// Needed to compile a TypeScript bundle, always added in their latest version.
const TYPESCRIPT_PACKAGES: [&str; 3] = ["@types/node", "nodecg-types", "typescript"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOptions {
	pub bundle_name: String,
	pub version: semver::Version,
	/// Services to use in the bundle. All installed services when empty.
	pub services: Vec<String>,
}

impl GenerationOptions {
	pub fn new(bundle_name: impl Into<String>) -> Self {
		Self {
			bundle_name: bundle_name.into(),
			version: semver::Version::new(0, 1, 0),
			services: Vec::new(),
		}
	}
}

/// Bundles can only be generated for production installs that have at least one service.
///
/// # Errors
/// [`Validation`](crate::Error::Validation) with an explanation otherwise.
pub fn ensure_valid_installation(install: Option<&Installation>) -> crate::Result<&ProductionInstallation> {
	match install {
		None => Err(crate::Error::Validation(
			"nodecg-io is not installed to your local nodecg install. install it first using \"nodecg-io install\".".to_string()
		)),
		Some(Installation::Development(_)) => Err(crate::Error::Validation(
			"bundles can't be generated for a development install of nodecg-io.".to_string()
		)),
		Some(Installation::Production(p)) if p.packages.iter().all(|p| CORE_PACKAGES.iter().any(|c| *c == p.name)) => Err(crate::Error::Validation(
			"you first need to have at least one service installed to generate a bundle. install one using \"nodecg-io install --service <name>\".".to_string()
		)),
		Some(Installation::Production(p)) => Ok(p),
	}
}

/// Bundle names become npm package names and directory names.
pub fn validate_bundle_name(name: &str) -> crate::Result<()> {
	let pattern = regex::Regex::new(r"^[a-z0-9][a-z0-9._-]*$").map_err(|e| crate::Error::Parse(e.to_string()))?;
	if name.len() > 214 || !pattern.is_match(name) {
		return Err(crate::Error::Validation(format!(
			"\"{}\" is not a valid bundle name. use lowercase letters, digits, \"-\", \".\" and \"_\" only.", name
		)));
	}
	Ok(())
}

pub fn bundle_path(nodecg_dir: &Path, bundle_name: &str) -> PathBuf {
	nodecg_dir.join(BUNDLES_DIR).join(bundle_name)
}

/// Writes a new bundle to `<nodecg_dir>/bundles/<name>`, installs its dependencies and compiles it.
///
/// # Errors
/// [`Validation`](crate::Error::Validation) when the bundle directory already contains files,
/// existing bundles are never overwritten.
pub async fn generate_bundle(ctx: &InstallContext<'_>, nodecg_dir: &Path, opts: &GenerationOptions, install: &ProductionInstallation) -> crate::Result<PathBuf> {
	validate_bundle_name(&opts.bundle_name)?;
	let core = find_package(install, CORE_PACKAGE)?;
	let services = selected_services(opts, install)?;

	let bundle_dir = bundle_path(nodecg_dir, &opts.bundle_name);
	ensure_empty_dir(&bundle_dir).await?;

	log::debug!("Fetching latest versions of {}...", TYPESCRIPT_PACKAGES.join(", "));
	let typescript = futures_util::future::try_join_all(TYPESCRIPT_PACKAGES.iter().map(|name| async move {
		let version = ctx.registry.latest_version(name).await?;
		Ok::<_, crate::Error>((name.to_string(), version))
	})).await?;

	let manifest = package_manifest(opts, core, &services, &typescript);
	write_file(&bundle_dir.join("package.json"), &pretty_json(&manifest)?).await?;
	write_file(&bundle_dir.join("tsconfig.json"), &pretty_json(&tsconfig())?).await?;
	write_file(&bundle_dir.join(".gitignore"), GITIGNORE.as_bytes()).await?;

	let names = services.iter()
		.map(|(service, _)| ServiceNames::new(service, &install.version))
		.collect::<crate::Result<Vec<_>>>()?;
	write_file(&bundle_dir.join("extension").join("index.ts"), extension_source(&opts.bundle_name, &names).as_bytes()).await?;
	log::info!("Generated bundle {} at {}.", opts.bundle_name, bundle_dir.display());

	log::info!("Installing dependencies...");
	let npm = ctx.npm();
	npm.install(&bundle_dir, false).await?;
	log::info!("Compiling bundle...");
	npm.run_script(&bundle_dir, "build").await?;

	Ok(bundle_dir)
}

fn find_package<'a>(install: &'a ProductionInstallation, name: &str) -> crate::Result<&'a Package> {
	install.packages.iter()
		.find(|p| p.name == name)
		.ok_or_else(|| crate::Error::Validation(format!("{} is not installed.", name)))
}

/// Pairs of service name and installed package.
fn selected_services<'a>(opts: &GenerationOptions, install: &'a ProductionInstallation) -> crate::Result<Vec<(String, &'a Package)>> {
	if opts.services.is_empty() {
		return Ok(install.packages.iter()
			.filter_map(|p| versions::service_from_package_name(&p.name).map(|s| (s.to_string(), p)))
			.collect());
	}

	opts.services.iter()
		.map(|s| {
			let package = find_package(install, &versions::service_package_name(s))?;
			Ok((s.clone(), package))
		})
		.collect()
}

async fn ensure_empty_dir(dir: &Path) -> crate::Result<()> {
	crate::installer::ensure_dir(dir).await?;
	let mut entries = tokio::fs::read_dir(dir).await?;
	if entries.next_entry().await?.is_some() {
		return Err(crate::Error::Validation(format!(
			"the directory for the bundle at {} already contains files. this only generates new bundles, pick a different name.",
			dir.display()
		)));
	}
	Ok(())
}

async fn write_file(path: &Path, content: &[u8]) -> crate::Result<()> {
	if let Some(parent) = path.parent() {
		crate::installer::ensure_dir(parent).await?;
	}
	log::debug!("Writing {}", path.display());
	tokio::fs::write(path, content).await?;
	Ok(())
}

fn caret(version: impl std::fmt::Display) -> String {
	format!("^{}", version)
}

/// The `package.json` of the bundle. Services are both bundle dependencies for nodecg and npm dependencies for their typings.
pub fn package_manifest(opts: &GenerationOptions, core: &Package, services: &[(String, &Package)], typescript: &[(String, semver::Version)]) -> serde_json::Value {
	let bundle_dependencies: BTreeMap<&str, String> = services.iter()
		.map(|(_, p)| (p.name.as_str(), caret(&p.version)))
		.collect();

	let mut dependencies = bundle_dependencies.clone();
	dependencies.insert(core.name.as_str(), caret(&core.version));
	for (name, version) in typescript {
		dependencies.insert(name.as_str(), caret(version));
	}

	serde_json::json!({
		"name": opts.bundle_name,
		"version": opts.version.to_string(),
		"private": true,
		"nodecg": {
			"compatibleRange": NODECG_COMPATIBLE_RANGE,
			"bundleDependencies": bundle_dependencies,
		},
		"scripts": {
			"build": "tsc -b",
			"watch": "tsc -b -w",
			"clean": "tsc -b --clean",
		},
		"dependencies": dependencies,
	})
}

fn tsconfig() -> serde_json::Value {
	serde_json::json!({
		"compilerOptions": {
			"target": "es2019",
			"sourceMap": true,
			"lib": ["es2019"],
			"alwaysStrict": true,
			"forceConsistentCasingInFileNames": true,
			"noFallthroughCasesInSwitch": true,
			"noImplicitAny": true,
			"noImplicitReturns": true,
			"noImplicitThis": true,
			"strictNullChecks": true,
			"skipLibCheck": true,
			"module": "CommonJS",
			"types": ["node"],
		}
	})
}

const GITIGNORE: &str = "/node_modules/\n/.vscode/\n/.idea/\n/extension/*.js\n/extension/*.js.map\n";

/// Identifiers derived from a service name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceNames {
	pub name: String,
	pub camel_case: String,
	pub client_name: &'static str,
	pub package_name: String,
}

impl ServiceNames {
	pub fn new(service: &str, version: &str) -> crate::Result<Self> {
		Ok(Self {
			name: service.to_string(),
			camel_case: kebab_to_camel_case(service),
			client_name: versions::service_client_name(service, version)?,
			package_name: versions::service_package_name(service),
		})
	}
}

fn kebab_to_camel_case(s: &str) -> String {
	let mut out = String::with_capacity(s.len());
	for (i, part) in s.split('-').enumerate() {
		let mut chars = part.chars();
		match chars.next() {
			Some(first) if i > 0 => {
				out.extend(first.to_uppercase());
				out.push_str(chars.as_str());
			},
			Some(_) => out.push_str(part),
			None => {},
		}
	}
	out
}

/// The extension entry point, requiring every service and hooking up its availability callbacks.
pub fn extension_source(bundle_name: &str, services: &[ServiceNames]) -> String {
	let mut src = String::new();
	src.push_str(&format!("import {{ requireService }} from \"{}\";\n", CORE_PACKAGE));
	src.push_str("import { NodeCG } from \"nodecg-types/types/server\";\n");
	for svc in services {
		src.push_str(&format!("import {{ {} }} from \"{}\";\n", svc.client_name, svc.package_name));
	}

	src.push_str("\nmodule.exports = function (nodecg: NodeCG) {\n");
	src.push_str(&format!("    nodecg.log.info(\"{} bundle started.\");\n", bundle_name));

	if !services.is_empty() {
		src.push('\n');
	}
	for svc in services {
		src.push_str(&format!(
			"    const {} = requireService<{}>(nodecg, \"{}\");\n",
			svc.camel_case, svc.client_name, svc.name
		));
	}

	for svc in services {
		src.push_str(&format!(
			"\n    {0}?.onAvailable(async ({0}Client) => {{\n        nodecg.log.info(\"{1} service has been updated.\");\n        // You can now use the {1} client here.\n    }});\n",
			svc.camel_case, svc.name
		));
		src.push_str(&format!(
			"\n    {0}?.onUnavailable(() => {{\n        nodecg.log.info(\"{1} has been unset.\");\n    }});\n",
			svc.camel_case, svc.name
		));
	}

	src.push_str("};\n");
	src
}
