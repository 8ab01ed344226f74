use nodecg_io_cli::installation::{DevelopmentInstallation, Installation};
use nodecg_io_cli::installer::development::{create_dev_install, DOCS_DIR};
use nodecg_io_cli_test_utils::*;

const FIRST_COMMIT: &str = "0000000000000000000000000000000000000001";
const SECOND_COMMIT: &str = "0000000000000000000000000000000000000002";

fn request(use_samples: bool, clone_docs: bool) -> DevelopmentInstallation {
	DevelopmentInstallation { commit_hash: None, use_samples, clone_docs }
}

#[tokio::test]
async fn fresh_install_clones_and_builds() {
	let env = TestEnv::new(MockRegistry::new(), None);
	let dir = env.nodecg_io_dir();

	let install = create_dev_install(&env.ctx(), &request(true, false), None, &dir).await.expect("install failed");

	assert_eq!(env.git.calls(), vec![GitCall::Clone(dir.clone())]);

	let calls = env.runner.calls();
	assert_eq!(calls.len(), 2);
	assert_eq!(calls[0].args, vec!["install"]);
	assert_eq!(calls[1].args[..4], ["run", "build", "--", "--concurrency"]);
	assert_eq!(calls[1].args[4], env.config.build_concurrency().to_string());

	let expected = DevelopmentInstallation {
		commit_hash: Some(FIRST_COMMIT.to_string()),
		use_samples: true,
		clone_docs: false,
	};
	assert_eq!(install, expected);
	assert_eq!(env.store.writes(), vec![Installation::Development(expected)]);
}

#[tokio::test]
async fn unchanged_commit_skips_build_but_records_flags() {
	let mut env = TestEnv::new(MockRegistry::new(), None);
	let dir = env.nodecg_io_dir();
	env.git = MockGit::new(FIRST_COMMIT).with_repository(&dir, FIRST_COMMIT);

	let current = valid_dev_install();
	create_dev_install(&env.ctx(), &request(true, false), Some(&current), &dir).await.expect("install failed");

	assert_eq!(env.git.calls(), vec![GitCall::Fetch(dir.clone())]);
	assert!(env.runner.calls().is_empty());
	assert_eq!(env.store.writes(), vec![Installation::Development(DevelopmentInstallation {
		commit_hash: Some(FIRST_COMMIT.to_string()),
		use_samples: true,
		clone_docs: false,
	})]);
}

#[tokio::test]
async fn new_commit_is_checked_out_and_built() {
	let mut env = TestEnv::new(MockRegistry::new(), None);
	let dir = env.nodecg_io_dir();
	env.git = MockGit::new(SECOND_COMMIT).with_repository(&dir, FIRST_COMMIT);

	std::fs::create_dir_all(dir.join("node_modules/typescript")).unwrap();
	std::fs::create_dir_all(dir.join("services/nodecg-io-obs/node_modules/obs-websocket-js")).unwrap();
	std::fs::write(dir.join("services/nodecg-io-obs/index.ts"), "export {};\n").unwrap();

	let current = valid_dev_install();
	create_dev_install(&env.ctx(), &request(false, false), Some(&current), &dir).await.expect("install failed");

	assert_eq!(env.git.calls(), vec![
		GitCall::Fetch(dir.clone()),
		GitCall::FastForward(dir.clone(), SECOND_COMMIT.to_string()),
		GitCall::Checkout(dir.clone()),
	]);

	assert!(!dir.join("node_modules").exists());
	assert!(!dir.join("services/nodecg-io-obs/node_modules").exists());
	assert!(dir.join("services/nodecg-io-obs/index.ts").is_file());

	assert_eq!(env.runner.count("install"), 1);
	assert_eq!(env.runner.count("run"), 1);

	let writes = env.store.writes();
	assert_eq!(writes.len(), 1);
	assert!(matches!(&writes[0], Installation::Development(d) if d.commit_hash.as_deref() == Some(SECOND_COMMIT)));
}

#[tokio::test]
async fn docs_follow_the_request() {
	let mut env = TestEnv::new(MockRegistry::new(), None);
	let dir = env.nodecg_io_dir();
	env.git = MockGit::new(FIRST_COMMIT).with_repository(&dir, FIRST_COMMIT);
	let docs = dir.join(DOCS_DIR);

	let current = valid_dev_install();
	let with_docs = create_dev_install(&env.ctx(), &request(false, true), Some(&current), &dir).await.expect("install failed");
	assert!(env.git.calls().contains(&GitCall::Clone(docs.clone())));
	assert!(docs.is_dir());
	assert!(with_docs.clone_docs);
	assert!(env.runner.calls().is_empty(), "docs alone don't need a build");

	let without_docs = create_dev_install(&env.ctx(), &request(false, false), Some(&with_docs), &dir).await.expect("install failed");
	assert!(!docs.exists());
	assert!(!without_docs.clone_docs);
	assert_eq!(env.store.writes().len(), 2);
}

#[tokio::test]
async fn failed_build_records_nothing() {
	let mut env = TestEnv::new(MockRegistry::new(), None);
	let dir = env.nodecg_io_dir();
	env.git = MockGit::new(SECOND_COMMIT).with_repository(&dir, FIRST_COMMIT);
	env.runner.fail_on("run");

	let current = valid_dev_install();
	let result = create_dev_install(&env.ctx(), &request(false, false), Some(&current), &dir).await;

	assert!(matches!(result, Err(nodecg_io_cli::Error::Command(_))));
	assert!(env.store.writes().is_empty());
}

#[tokio::test]
async fn failed_build_is_retried_on_next_run() {
	let mut env = TestEnv::new(MockRegistry::new(), None);
	let dir = env.nodecg_io_dir();
	env.git = MockGit::new(SECOND_COMMIT).with_repository(&dir, FIRST_COMMIT);
	env.runner.fail_on("run");

	let current = valid_dev_install();
	assert!(create_dev_install(&env.ctx(), &request(false, false), Some(&current), &dir).await.is_err());

	/* the checkout already happened, only the build is missing */
	env.runner = MockRunner::new();
	create_dev_install(&env.ctx(), &request(false, false), Some(&current), &dir).await.expect("install failed");

	assert_eq!(env.runner.count("run"), 1);
	assert_eq!(env.store.writes().len(), 1);
}
