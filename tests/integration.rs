use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn reposync_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("reposync");
    path
}

fn setup_test_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    // A small checkout
    let checkout = root.join("checkout");
    fs::create_dir_all(checkout.join("src")).unwrap();
    fs::create_dir_all(checkout.join("node_modules/dep")).unwrap();
    fs::write(
        checkout.join("src/lib.rs"),
        "use std::fmt;\n\npub fn greet() -> String {\n    \"hi\".to_string()\n}\n",
    )
    .unwrap();
    fs::write(
        checkout.join("src/util.py"),
        "import os\n\ndef cwd():\n    return os.getcwd()\n",
    )
    .unwrap();
    fs::write(checkout.join("README.md"), "# Demo\n").unwrap();
    fs::write(checkout.join("node_modules/dep/index.js"), "module.exports = 1;\n").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/reposync.sqlite"

[github]
token_env = "REPOSYNC_TEST_TOKEN_THAT_IS_NEVER_SET"

[summarizer]
provider = "disabled"

[sync]
concurrency = 2
retry_delay_ms = 10
"#,
        root.display()
    );

    let config_path = config_dir.join("reposync.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path, checkout)
}

fn run_reposync(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = reposync_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run reposync binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn sync_local(config_path: &Path, checkout: &Path) -> (String, String, bool) {
    run_reposync(
        config_path,
        &[
            "sync",
            "acme/demo",
            "--local",
            checkout.to_str().unwrap(),
            "--progress",
            "off",
        ],
    )
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path, _) = setup_test_env();

    let (stdout, stderr, success) = run_reposync(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, again) = run_reposync(&config_path, &["init"]);
    assert!(again, "second init failed (not idempotent)");
}

#[test]
fn test_sync_local_checkout() {
    let (_tmp, config_path, checkout) = setup_test_env();
    run_reposync(&config_path, &["init"]);

    let (stdout, stderr, success) = sync_local(&config_path, &checkout);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(
        stdout.contains("completed acme/demo: 3 new, 0 modified, 0 unchanged"),
        "unexpected output: {}",
        stdout
    );
    assert!(stdout.contains("ok"));
}

#[test]
fn test_resync_is_unchanged_and_detects_deletions() {
    let (_tmp, config_path, checkout) = setup_test_env();
    run_reposync(&config_path, &["init"]);
    sync_local(&config_path, &checkout);

    let (stdout, _, success) = sync_local(&config_path, &checkout);
    assert!(success);
    assert!(
        stdout.contains("0 new, 0 modified, 3 unchanged"),
        "unexpected output: {}",
        stdout
    );

    fs::remove_file(checkout.join("src/util.py")).unwrap();
    fs::write(checkout.join("README.md"), "# Demo\n\nMore words.\n").unwrap();

    let (stdout, _, success) = sync_local(&config_path, &checkout);
    assert!(success);
    assert!(
        stdout.contains("0 new, 1 modified, 1 unchanged, 0 unknown, 0 restored, 1 deleted"),
        "unexpected output: {}",
        stdout
    );

    let (stdout, _, success) =
        run_reposync(&config_path, &["files", "acme/demo", "--status", "deleted"]);
    assert!(success);
    assert!(stdout.contains("src/util.py"));
    assert!(!stdout.contains("src/lib.rs"));

    // Bring it back: restored, not new
    fs::write(
        checkout.join("src/util.py"),
        "import os\n\ndef cwd():\n    return os.getcwd()\n",
    )
    .unwrap();
    let (stdout, _, success) = sync_local(&config_path, &checkout);
    assert!(success);
    assert!(
        stdout.contains("0 new, 0 modified, 2 unchanged, 0 unknown, 1 restored, 0 deleted"),
        "unexpected output: {}",
        stdout
    );
}

#[test]
fn test_status_reports_completed_run() {
    let (_tmp, config_path, checkout) = setup_test_env();
    run_reposync(&config_path, &["init"]);
    sync_local(&config_path, &checkout);

    let (stdout, stderr, success) = run_reposync(&config_path, &["status", "acme/demo"]);
    assert!(success, "status failed: {}", stderr);
    assert!(stdout.contains("acme/demo"));
    assert!(stdout.contains("completed"));
    assert!(stdout.contains("3 active, 0 deleted, 3 total"));
    assert!(stdout.contains("Recent runs"));
}

#[test]
fn test_status_unknown_repository_fails() {
    let (_tmp, config_path, _) = setup_test_env();
    run_reposync(&config_path, &["init"]);

    let (_, stderr, success) = run_reposync(&config_path, &["status", "acme/nothing"]);
    assert!(!success);
    assert!(stderr.contains("not synced"));
}

#[test]
fn test_get_prints_record_json() {
    let (_tmp, config_path, checkout) = setup_test_env();
    run_reposync(&config_path, &["init"]);
    sync_local(&config_path, &checkout);

    let (stdout, stderr, success) =
        run_reposync(&config_path, &["get", "acme/demo", "src/util.py"]);
    assert!(success, "get failed: {}", stderr);
    let record: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(record["path"], "src/util.py");
    assert_eq!(record["key"], "src%2Futil.py");
    assert_eq!(record["status"], "new");
    assert_eq!(record["language"], "py");
    assert_eq!(record["structure"]["imports"][0], "os");
    assert_eq!(record["structure"]["functions"][0], "cwd");

    let (_, _, success) = run_reposync(&config_path, &["get", "acme/demo", "src/missing.rs"]);
    assert!(!success);
}

#[test]
fn test_skipped_dirs_are_not_listed() {
    let (_tmp, config_path, checkout) = setup_test_env();
    run_reposync(&config_path, &["init"]);
    sync_local(&config_path, &checkout);

    let (stdout, _, success) = run_reposync(&config_path, &["files", "acme/demo"]);
    assert!(success);
    assert!(!stdout.contains("node_modules"));
    assert!(stdout.contains("3 file(s)"));
}

#[test]
fn test_dry_run_writes_nothing() {
    let (_tmp, config_path, checkout) = setup_test_env();
    run_reposync(&config_path, &["init"]);

    let (stdout, _, success) = run_reposync(
        &config_path,
        &[
            "sync",
            "acme/demo",
            "--local",
            checkout.to_str().unwrap(),
            "--dry-run",
            "--progress",
            "off",
        ],
    );
    assert!(success);
    assert!(stdout.contains("dry-run acme/demo: 3 new"));

    let (_, _, success) = run_reposync(&config_path, &["status", "acme/demo"]);
    assert!(!success, "dry run must not create the repository record");
}

#[test]
fn test_missing_token_fails() {
    let (_tmp, config_path, _) = setup_test_env();
    run_reposync(&config_path, &["init"]);

    let (_, stderr, success) =
        run_reposync(&config_path, &["sync", "acme/demo", "--progress", "off"]);
    assert!(!success);
    assert!(stderr.contains("REPOSYNC_TEST_TOKEN_THAT_IS_NEVER_SET"));
}

#[test]
fn test_purge_requires_confirmation() {
    let (_tmp, config_path, checkout) = setup_test_env();
    run_reposync(&config_path, &["init"]);
    sync_local(&config_path, &checkout);

    let (_, _, success) = run_reposync(&config_path, &["purge", "acme/demo"]);
    assert!(!success);

    let (stdout, _, success) = run_reposync(&config_path, &["purge", "acme/demo", "--yes"]);
    assert!(success);
    assert!(stdout.contains("Purged 3"));

    let (stdout, _, _) = run_reposync(&config_path, &["files", "acme/demo"]);
    assert!(stdout.contains("No files stored"));
}
