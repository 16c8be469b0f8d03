use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const TEST_PASSWORD: &str = "test-password-123";

fn encfs_rs() -> Command {
    let mut cmd = Command::cargo_bin("encfs-rs").unwrap();
    cmd.env("ENCFS_PASSWORD", TEST_PASSWORD);
    cmd
}

fn create_temp_volume() -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let volume_path = temp_dir.path().join("vault");

    encfs_rs()
        .arg("create")
        .arg(&volume_path)
        .assert()
        .success();

    (temp_dir, volume_path)
}

#[test]
fn create_then_info_reports_config() {
    let (_temp, volume_path) = create_temp_volume();

    encfs_rs()
        .arg("info")
        .arg(&volume_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Content algorithm"));
}

#[test]
fn create_cp_in_then_cat_round_trips() {
    let (temp, volume_path) = create_temp_volume();

    let local_file = temp.path().join("source.txt");
    std::fs::write(&local_file, b"hello from the outside\n").unwrap();

    encfs_rs()
        .arg("cp-in")
        .arg(&volume_path)
        .arg(&local_file)
        .arg("/greeting.txt")
        .assert()
        .success();

    encfs_rs()
        .arg("cat")
        .arg(&volume_path)
        .arg("/greeting.txt")
        .assert()
        .success()
        .stdout(predicate::eq(b"hello from the outside\n".as_slice()));
}

#[test]
fn ls_lists_copied_in_file() {
    let (temp, volume_path) = create_temp_volume();
    let local_file = temp.path().join("note.txt");
    std::fs::write(&local_file, b"note").unwrap();

    encfs_rs()
        .arg("cp-in")
        .arg(&volume_path)
        .arg(&local_file)
        .arg("/note.txt")
        .assert()
        .success();

    encfs_rs()
        .arg("ls")
        .arg(&volume_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("note.txt"));
}

#[test]
fn wrong_password_fails_to_open() {
    let (_temp, volume_path) = create_temp_volume();

    Command::cargo_bin("encfs-rs")
        .unwrap()
        .env("ENCFS_PASSWORD", "definitely not it")
        .arg("ls")
        .arg(&volume_path)
        .assert()
        .failure();
}
