#![allow(deprecated)] // cargo_bin! macro doesn't exist yet in assert_cmd 2.1

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::file_serial;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TEST_PASSWORD: &str = "test-password-123";

/// Isolated config directory, mount root and store file.
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config_dir = dir.path().join("config");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.toml"),
            format!(
                "[paths]\nmount_root = \"{}\"\nkey_dir = \"{}\"\n\n[probe]\nattempts = 1\nattempt_timeout = \"100ms\"\nbudget = \"200ms\"\n",
                dir.path().join("mnt").display(),
                dir.path().join("keys").display(),
            ),
        )
        .unwrap();
        Self { dir }
    }

    fn store(&self) -> PathBuf {
        self.dir.path().join("mounts.secure")
    }

    fn mount_point(&self, name: &str) -> PathBuf {
        self.dir.path().join("mnt").join(name)
    }

    /// `netmount` with the sandbox environment but no password.
    fn bare(&self) -> Command {
        let mut cmd = Command::cargo_bin("netmount").unwrap();
        cmd.env("NETMOUNT_CONFIG_DIR", self.dir.path().join("config"))
            .env("NETMOUNT_STORE", self.store())
            .env_remove("NETMOUNT_ADMIN_PASSWORD")
            .env_remove("RUST_LOG");
        cmd
    }

    fn netmount(&self) -> Command {
        let mut cmd = self.bare();
        cmd.arg("--password").arg(TEST_PASSWORD);
        cmd
    }

    fn add(&self, url: &str, name: &str) {
        self.netmount()
            .args(["add", url, name, "--user", "alice", "--password-entry", "s3cret"])
            .assert()
            .success();
    }

    fn list_json(&self) -> Vec<serde_json::Value> {
        let output = self
            .netmount()
            .args(["list", "--json"])
            .output()
            .expect("Failed to run list");
        assert!(output.status.success(), "list failed: {output:?}");
        serde_json::from_slice(&output.stdout).expect("list --json is not JSON")
    }
}

fn paths(entries: &[serde_json::Value]) -> Vec<String> {
    entries
        .iter()
        .map(|e| e["path"].as_str().unwrap().to_string())
        .collect()
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn test_help() {
    Command::cargo_bin("netmount")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("encrypted store"))
        .stdout(predicate::str::contains("daemon"));
}

#[test]
fn test_version() {
    Command::cargo_bin("netmount")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unknown_flag_is_usage_error() {
    Command::cargo_bin("netmount")
        .unwrap()
        .args(["list", "--bogus"])
        .assert()
        .code(2);
}

#[test]
fn test_list_bootstraps_empty_store() {
    let sandbox = Sandbox::new();

    sandbox
        .netmount()
        .arg("list")
        .assert()
        .success()
        .stderr(predicate::str::contains("No mounts declared"));

    assert!(sandbox.store().exists());
    assert!(sandbox.list_json().is_empty());
}

#[test]
fn test_add_then_list() {
    let sandbox = Sandbox::new();
    sandbox.add("smb://nas/media", "media");

    let entries = sandbox.list_json();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["url"], "smb://nas/media");
    assert_eq!(entries[0]["path"], display(&sandbox.mount_point("media")));
    assert_eq!(entries[0]["user"], "alice");
    assert_eq!(entries[0]["protocol"], "smb");
    assert_eq!(entries[0]["automount"], false);

    sandbox
        .netmount()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("smb://nas/media"));
}

#[test]
fn test_list_json_omits_passwords() {
    let sandbox = Sandbox::new();
    sandbox.add("sftp://box:2222/home/alice", "box");

    sandbox
        .netmount()
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("s3cret").not());
}

#[test]
fn test_store_file_is_not_plaintext() {
    let sandbox = Sandbox::new();
    sandbox.add("ftp://files.example.org/pub", "pub");

    let bytes = std::fs::read(sandbox.store()).unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(!text.contains("files.example.org"));
    assert!(!text.contains("s3cret"));
}

#[test]
fn test_add_duplicate_path_fails() {
    let sandbox = Sandbox::new();
    sandbox.add("smb://nas/media", "media");

    sandbox
        .netmount()
        .args(["add", "smb://nas/other", "media"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));

    assert_eq!(sandbox.list_json().len(), 1);
}

#[test]
fn test_add_rejects_bad_name_and_url() {
    let sandbox = Sandbox::new();

    sandbox
        .netmount()
        .args(["add", "smb://nas/media", "../escape"])
        .assert()
        .code(2);

    sandbox
        .netmount()
        .args(["add", "http://nas/media", "media"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid URL"));

    assert!(sandbox.list_json().is_empty());
}

#[test]
fn test_wrong_password_fails() {
    let sandbox = Sandbox::new();
    sandbox.add("smb://nas/media", "media");

    sandbox
        .bare()
        .args(["--password", "wrong-password", "list"])
        .assert()
        .code(3);
}

#[test]
fn test_password_from_stdin() {
    let sandbox = Sandbox::new();
    sandbox.add("smb://nas/media", "media");

    sandbox
        .bare()
        .args(["--password-stdin", "list", "--json"])
        .write_stdin(format!("{TEST_PASSWORD}\n"))
        .assert()
        .success()
        .stdout(predicate::str::contains("smb://nas/media"));
}

#[test]
fn test_missing_password_without_terminal() {
    let sandbox = Sandbox::new();

    sandbox
        .bare()
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No admin password"));
}

#[test]
fn test_edit_changes_user() {
    let sandbox = Sandbox::new();
    sandbox.add("smb://nas/media", "media");
    let path = sandbox.mount_point("media");

    sandbox
        .netmount()
        .arg("edit")
        .arg(&path)
        .args(["--user", "bob", "--smb-version", "3.0"])
        .assert()
        .success();

    let entries = sandbox.list_json();
    assert_eq!(entries[0]["user"], "bob");
    assert_eq!(entries[0]["smb_version"], "3.0");
    assert_eq!(entries[0]["url"], "smb://nas/media");
}

#[test]
fn test_edit_without_changes_fails() {
    let sandbox = Sandbox::new();
    sandbox.add("smb://nas/media", "media");

    sandbox
        .netmount()
        .arg("edit")
        .arg(sandbox.mount_point("media"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to change"));
}

#[test]
fn test_edit_unknown_entry_is_not_found() {
    let sandbox = Sandbox::new();

    sandbox
        .netmount()
        .arg("edit")
        .arg(sandbox.mount_point("ghost"))
        .args(["--user", "bob"])
        .assert()
        .code(7);
}

#[test]
fn test_move_reorders() {
    let sandbox = Sandbox::new();
    sandbox.add("smb://nas/a", "a");
    sandbox.add("smb://nas/b", "b");
    sandbox.add("smb://nas/c", "c");

    sandbox
        .netmount()
        .arg("move")
        .arg(sandbox.mount_point("c"))
        .arg("1")
        .assert()
        .success();

    let entries = sandbox.list_json();
    assert_eq!(
        paths(&entries),
        vec![
            display(&sandbox.mount_point("c")),
            display(&sandbox.mount_point("a")),
            display(&sandbox.mount_point("b")),
        ]
    );
    let orders: Vec<u64> = entries
        .iter()
        .map(|e| e["order"].as_u64().unwrap())
        .collect();
    assert_eq!(orders, vec![0, 1, 2]);
}

#[test]
fn test_move_rejects_position_zero() {
    let sandbox = Sandbox::new();
    sandbox.add("smb://nas/a", "a");

    sandbox
        .netmount()
        .arg("move")
        .arg(sandbox.mount_point("a"))
        .arg("0")
        .assert()
        .code(2);
}

#[test]
fn test_automount_toggle() {
    let sandbox = Sandbox::new();
    sandbox.add("smb://nas/media", "media");
    let path = sandbox.mount_point("media");

    sandbox
        .netmount()
        .arg("automount")
        .arg(&path)
        .arg("on")
        .assert()
        .success();
    assert_eq!(sandbox.list_json()[0]["automount"], true);

    sandbox
        .netmount()
        .arg("automount")
        .arg(&path)
        .arg("off")
        .assert()
        .success();
    assert_eq!(sandbox.list_json()[0]["automount"], false);
}

#[test]
fn test_remove_unmounted_entry() {
    let sandbox = Sandbox::new();
    sandbox.add("smb://nas/a", "a");
    sandbox.add("smb://nas/b", "b");
    let path = sandbox.mount_point("a");
    std::fs::create_dir_all(&path).unwrap();

    sandbox
        .netmount()
        .arg("remove")
        .arg(&path)
        .assert()
        .success();

    assert_eq!(
        paths(&sandbox.list_json()),
        vec![display(&sandbox.mount_point("b"))]
    );
    assert!(!path.exists(), "empty mount point should be removed");
}

#[test]
fn test_mount_unknown_entry_is_not_found() {
    let sandbox = Sandbox::new();

    sandbox
        .netmount()
        .arg("mount")
        .arg(sandbox.mount_point("ghost"))
        .assert()
        .code(7)
        .stderr(predicate::str::contains("No entry"));
}

#[test]
fn test_export_and_import() {
    let source = Sandbox::new();
    source.add("smb://nas/a", "a");
    source.add("sftp://box/home/alice", "b");
    let backup = source.dir.path().join("backup.secure");

    source
        .netmount()
        .arg("export")
        .arg(&backup)
        .args(["--file-password", "transfer-pw"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Exported 2"));

    let target = Sandbox::new();
    target
        .netmount()
        .arg("import")
        .arg(&backup)
        .args(["--file-password", "transfer-pw"])
        .assert()
        .success()
        .stderr(predicate::str::contains("2 added"));

    let entries = target.list_json();
    assert_eq!(entries.len(), 2);
    assert!(
        entries
            .iter()
            .all(|e| e["last_known_status"] == "unknown")
    );

    // Same file again: everything collides.
    target
        .netmount()
        .arg("import")
        .arg(&backup)
        .args(["--file-password", "transfer-pw"])
        .assert()
        .success()
        .stderr(predicate::str::contains("2 skipped"));
    assert_eq!(target.list_json().len(), 2);
}

#[test]
fn test_import_with_wrong_file_password() {
    let source = Sandbox::new();
    source.add("smb://nas/a", "a");
    let backup = source.dir.path().join("backup.secure");
    source.netmount().arg("export").arg(&backup).assert().success();

    let target = Sandbox::new();
    target
        .netmount()
        .arg("import")
        .arg(&backup)
        .args(["--file-password", "not-it"])
        .assert()
        .code(3);
}

#[test]
fn test_status_json_shape() {
    let sandbox = Sandbox::new();
    sandbox.add("smb://127.0.0.1/share", "local");

    let output = sandbox
        .netmount()
        .args(["status", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "status failed: {output:?}");

    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(status["network_up"].is_boolean());
    let entries = status["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["mounted"], false);
    assert!(entries[0]["actionable"].is_boolean());
}

#[test]
fn test_keys_path_for_sftp_entry() {
    let sandbox = Sandbox::new();
    sandbox.add("sftp://box:2222/home/alice", "box");

    sandbox
        .netmount()
        .args(["keys", "path"])
        .arg(sandbox.mount_point("box"))
        .assert()
        .success()
        .stdout(predicate::str::ends_with("id_rsa_box_2222\n"));
}

#[test]
fn test_keys_setup_rejects_smb_entry() {
    let sandbox = Sandbox::new();
    sandbox.add("smb://nas/media", "media");

    sandbox
        .netmount()
        .args(["keys", "setup"])
        .arg(sandbox.mount_point("media"))
        .assert()
        .code(6)
        .stderr(predicate::str::contains("not an SFTP entry"));

    assert_eq!(sandbox.list_json()[0]["sshkeyvalid"], false);
}

#[test]
fn test_completions() {
    Command::cargo_bin("netmount")
        .unwrap()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("netmount"));
}

#[test]
#[file_serial]
fn test_daemon_status_when_not_running() {
    let sandbox = Sandbox::new();

    sandbox
        .bare()
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not running"));
}

#[test]
#[file_serial]
fn test_daemon_stop_without_daemon() {
    let sandbox = Sandbox::new();

    sandbox
        .bare()
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No daemon running"));
}

#[test]
fn test_quiet_suppresses_notes() {
    let sandbox = Sandbox::new();

    sandbox
        .netmount()
        .args(["--quiet", "add", "smb://nas/media", "media"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty());
}
