use nodecg_io_cli::generate::{self, GenerationOptions};
use nodecg_io_cli_test_utils::*;

fn registry() -> MockRegistry {
	MockRegistry::nodecg_io()
		.with_package("@types/node", &["18.11.9", "18.15.0"])
		.with_package("nodecg-types", &["1.9.0"])
		.with_package("typescript", &["4.8.4", "4.9.5"])
}

#[tokio::test]
async fn bundle_is_generated_and_built() {
	let env = TestEnv::new(registry(), None);
	let nodecg_dir = env.nodecg_dir();

	let dir = generate::generate_bundle(&env.ctx(), &nodecg_dir, &GenerationOptions::new("my-bundle"), &valid_prod_install())
		.await
		.expect("generation failed");

	assert_eq!(dir, nodecg_dir.join("bundles/my-bundle"));
	assert!(dir.join("tsconfig.json").is_file());
	assert!(dir.join(".gitignore").is_file());

	let manifest: serde_json::Value = serde_json::from_slice(&std::fs::read(dir.join("package.json")).unwrap()).unwrap();
	assert_eq!(manifest["nodecg"]["bundleDependencies"], serde_json::json!({ "nodecg-io-twitch-chat": "^0.1.0" }));
	assert_eq!(manifest["dependencies"]["typescript"], "^4.9.5");
	assert_eq!(manifest["dependencies"]["@types/node"], "^18.15.0");
	assert_eq!(manifest["dependencies"]["nodecg-io-core"], "^0.1.0");

	let extension = std::fs::read_to_string(dir.join("extension/index.ts")).unwrap();
	assert!(extension.contains("requireService<TwitchChatServiceClient>(nodecg, \"twitch-chat\")"));

	let calls = env.runner.calls();
	assert_eq!(calls.len(), 2);
	assert_eq!(calls[0].args, vec!["install"]);
	assert_eq!(calls[1].args, vec!["run", "build"]);
	assert!(calls.iter().all(|c| c.working_dir == dir));
}

#[tokio::test]
async fn existing_bundles_are_not_overwritten() {
	let env = TestEnv::new(registry(), None);
	let nodecg_dir = env.nodecg_dir();
	let existing = generate::bundle_path(&nodecg_dir, "my-bundle");
	std::fs::create_dir_all(&existing).unwrap();
	std::fs::write(existing.join("package.json"), "{}").unwrap();

	let result = generate::generate_bundle(&env.ctx(), &nodecg_dir, &GenerationOptions::new("my-bundle"), &valid_prod_install()).await;

	assert!(matches!(result, Err(nodecg_io_cli::Error::Validation(_))));
	assert_eq!(std::fs::read_to_string(existing.join("package.json")).unwrap(), "{}");
	assert!(env.runner.calls().is_empty());
}

#[tokio::test]
async fn services_must_be_installed() {
	let env = TestEnv::new(registry(), None);
	let nodecg_dir = env.nodecg_dir();
	let mut opts = GenerationOptions::new("my-bundle");
	opts.services = vec!["obs".to_string()];

	let result = generate::generate_bundle(&env.ctx(), &nodecg_dir, &opts, &valid_prod_install()).await;

	assert!(matches!(result, Err(nodecg_io_cli::Error::Validation(_))));
	assert!(!generate::bundle_path(&nodecg_dir, "my-bundle").exists());
}
