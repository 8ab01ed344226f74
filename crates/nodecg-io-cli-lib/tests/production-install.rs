use nodecg_io_cli::installation::{Installation, InstallationStore, JsonInstallationStore, ProductionInstallation};
use nodecg_io_cli::installer::production::create_production_install;
use nodecg_io_cli_test_utils::*;

fn written_packages(install: &Installation) -> &ProductionInstallation {
	match install {
		Installation::Production(p) => p,
		Installation::Development(_) => panic!("expected a production install to be written"),
	}
}

#[tokio::test]
async fn fresh_install() {
	let env = TestEnv::new(MockRegistry::nodecg_io(), None);
	let dir = env.nodecg_io_dir();
	let requested = valid_prod_install();

	create_production_install(&env.ctx(), &requested, None, &dir).await.expect("install failed");

	assert!(dir.join("nodecg-io-core/package.json").is_file());
	assert!(dir.join("nodecg-io-core/dashboard/index.js").is_file());
	assert!(dir.join("nodecg-io-twitch-chat/index.js").is_file());
	assert!(!dir.join("nodecg-io-core/package").exists(), "archive wrapper dir must be stripped");

	let manifest: serde_json::Value = serde_json::from_slice(&std::fs::read(dir.join("package.json")).unwrap()).unwrap();
	assert_eq!(manifest["private"], true);
	assert_eq!(manifest["workspaces"], serde_json::json!(["nodecg-io-core", "nodecg-io-core/dashboard", "nodecg-io-twitch-chat"]));

	let calls = env.runner.calls();
	assert_eq!(calls.len(), 1);
	assert_eq!(calls[0].args, vec!["install", "--omit=dev"]);
	assert_eq!(calls[0].working_dir, dir);

	assert_eq!(env.store.writes(), vec![Installation::Production(requested)]);

	let updates = env.progress.updates();
	assert_eq!(updates.len(), 3);
	assert_eq!(updates.last(), Some(&(3, 3)));
}

#[tokio::test]
async fn nested_package_is_reinstalled_with_its_parent() {
	let current = valid_prod_install();
	let env = TestEnv::new(MockRegistry::nodecg_io(), None);
	let dir = env.nodecg_io_dir();
	create_package_dirs(&dir, &current.packages);

	let requested = prod_install("0.2", vec![core_pkg("0.2.0"), dashboard_pkg("0.1.0"), twitch_chat_pkg("0.1.0")]);
	create_production_install(&env.ctx(), &requested, Some(current), &dir).await.expect("install failed");

	let mut downloads = env.registry.downloads();
	downloads.sort();
	assert_eq!(downloads, vec!["nodecg-io-core@0.2.0", "nodecg-io-dashboard@0.1.0"]);

	let writes = env.store.writes();
	assert_eq!(writes.len(), 2);

	/* removing core also removed the dashboard inside of it */
	assert_eq!(written_packages(&writes[0]).packages, vec![twitch_chat_pkg("0.1.0")]);

	let last = written_packages(&writes[1]);
	assert_eq!(last.version, "0.2");
	assert_eq!(last.packages.len(), 3);
	for package in &requested.packages {
		assert!(last.packages.contains(package), "{} missing in install info", package);
	}
	assert!(dir.join("nodecg-io-core/dashboard/index.js").is_file());
}

#[tokio::test]
async fn install_info_is_written_after_each_removal() {
	let current = prod_install("0.1", vec![core_pkg("0.1.0"), dashboard_pkg("0.1.0"), twitch_chat_pkg("0.1.0"), service_pkg("obs", "0.1.0")]);
	let env = TestEnv::new(MockRegistry::nodecg_io(), None);
	let dir = env.nodecg_io_dir();
	create_package_dirs(&dir, &current.packages);

	let requested = prod_install("0.1", vec![core_pkg("0.1.0"), dashboard_pkg("0.1.0")]);
	create_production_install(&env.ctx(), &requested, Some(current), &dir).await.expect("install failed");

	let writes = env.store.writes();
	assert_eq!(writes.len(), 2);
	assert_eq!(written_packages(&writes[0]).packages, vec![core_pkg("0.1.0"), dashboard_pkg("0.1.0"), service_pkg("obs", "0.1.0")]);
	assert_eq!(written_packages(&writes[1]).packages, requested.packages);

	assert!(!dir.join("nodecg-io-twitch-chat").exists());
	assert!(!dir.join("nodecg-io-obs").exists());
	assert!(dir.join("nodecg-io-core").is_dir());
	assert!(env.runner.calls().is_empty());
	assert!(env.registry.downloads().is_empty());
}

#[tokio::test]
async fn failed_removal_stops_the_run() {
	let current = prod_install("0.1", vec![core_pkg("0.1.0"), twitch_chat_pkg("0.1.0"), service_pkg("obs", "0.1.0")]);
	let env = TestEnv::new(MockRegistry::nodecg_io(), None);
	let dir = env.nodecg_io_dir();
	create_package_dirs(&dir, &current.packages[..2]);
	/* a file can't be removed like a package directory */
	std::fs::write(dir.join("nodecg-io-obs"), "not a directory").unwrap();

	let requested = prod_install("0.1", vec![core_pkg("0.1.0")]);
	let result = create_production_install(&env.ctx(), &requested, Some(current), &dir).await;

	assert!(matches!(result, Err(nodecg_io_cli::Error::IO(_))), "unexpected result {:?}", result);

	let writes = env.store.writes();
	assert_eq!(writes.len(), 1);
	assert_eq!(written_packages(&writes[0]).packages, vec![core_pkg("0.1.0"), service_pkg("obs", "0.1.0")]);

	assert!(!dir.join("nodecg-io-twitch-chat").exists());
	assert!(dir.join("nodecg-io-obs").is_file());
	assert!(env.registry.downloads().is_empty());
	assert!(env.runner.calls().is_empty());
}

#[tokio::test]
async fn failed_dependency_install_is_rolled_back() {
	let env = TestEnv::new(MockRegistry::nodecg_io(), None);
	let dir = env.nodecg_io_dir();
	env.runner.fail_on("install");

	let requested = valid_prod_install();
	let result = create_production_install(&env.ctx(), &requested, None, &dir).await;

	assert!(matches!(result, Err(nodecg_io_cli::Error::Command(_))));
	for package in &requested.packages {
		assert!(!package.install_path(&dir).exists(), "{} was not rolled back", package);
	}
	assert!(env.store.writes().is_empty());
}

#[tokio::test]
async fn failed_download_is_rolled_back() {
	let registry = MockRegistry::nodecg_io().with_failing_download("nodecg-io-twitch-chat");
	let env = TestEnv::new(registry, None);
	let dir = env.nodecg_io_dir();

	let requested = valid_prod_install();
	let result = create_production_install(&env.ctx(), &requested, None, &dir).await;

	assert!(matches!(result, Err(nodecg_io_cli::Error::Archive(_))));
	for package in &requested.packages {
		assert!(!package.install_path(&dir).exists(), "{} was not rolled back", package);
	}
	assert_eq!(env.runner.count("install"), 0);
	assert!(env.store.writes().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn unhoisted_dependencies_are_linked() {
	let env = TestEnv::new(MockRegistry::nodecg_io(), None);
	let dir = env.nodecg_io_dir();

	let mut twitch_chat = twitch_chat_pkg("0.1.0");
	twitch_chat.symlink = vec!["nodecg-io-core".to_string()];
	let requested = prod_install("0.1", vec![core_pkg("0.1.0"), dashboard_pkg("0.1.0"), twitch_chat]);

	create_production_install(&env.ctx(), &requested, None, &dir).await.expect("install failed");

	let link = dir.join("nodecg-io-twitch-chat/node_modules/nodecg-io-core");
	assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
	assert_eq!(std::fs::read_link(&link).unwrap(), dir.join("node_modules/nodecg-io-core"));
	assert!(!dir.join("nodecg-io-core/node_modules").exists(), "core has nothing to link");

	assert_eq!(env.store.writes(), vec![Installation::Production(requested)]);
}

#[tokio::test]
async fn missing_package_dirs_are_installed_again() {
	let current = valid_prod_install();
	let env = TestEnv::new(MockRegistry::nodecg_io(), None);
	let dir = env.nodecg_io_dir();
	/* twitch-chat was deleted by hand */
	create_package_dirs(&dir, &current.packages[..2]);

	create_production_install(&env.ctx(), &current.clone(), Some(current.clone()), &dir).await.expect("install failed");

	assert_eq!(env.registry.downloads(), vec!["nodecg-io-twitch-chat@0.1.0"]);

	let writes = env.store.writes();
	assert_eq!(writes.len(), 2);
	assert_eq!(written_packages(&writes[0]).packages, vec![core_pkg("0.1.0"), dashboard_pkg("0.1.0")]);
	assert_eq!(written_packages(&writes[1]).packages, current.packages);
}

#[tokio::test]
async fn unchanged_install_does_nothing() {
	let current = valid_prod_install();
	let env = TestEnv::new(MockRegistry::nodecg_io(), None);
	let dir = env.nodecg_io_dir();
	create_package_dirs(&dir, &current.packages);

	create_production_install(&env.ctx(), &current.clone(), Some(current), &dir).await.expect("install failed");

	assert!(env.registry.downloads().is_empty());
	assert!(env.runner.calls().is_empty());
	assert!(env.store.writes().is_empty());
}

#[tokio::test]
async fn install_info_file() {
	let dir = tempdir();
	let store = JsonInstallationStore;

	assert_eq!(store.read(dir.path()).await, None);

	let install = Installation::Production(valid_prod_install());
	store.write(dir.path(), &install).await.expect("write failed");
	assert_eq!(store.read(dir.path()).await, Some(install));

	let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap()
		.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
		.collect();
	assert_eq!(leftovers, vec!["install.json"]);

	std::fs::write(dir.path().join("install.json"), "{ \"mode\": \"production\", ").unwrap();
	assert_eq!(store.read(dir.path()).await, None, "a broken file counts as nothing installed");
}
