mod common;

use assert_cmd::prelude::*;
use common::{file_url, Fixture};
use predicates::prelude::*;
use std::process::Command;

fn freeroot() -> Command {
    let mut command = Command::new(env!("CARGO"));
    command
        .arg("run")
        .arg("--quiet")
        .arg("-p")
        .arg("freeroot-cli")
        .arg("--");
    command
}

/// The CLI pointed at a fixture's local sources
fn freeroot_at(fixture: &Fixture) -> Command {
    let mut command = freeroot();
    command
        .arg("-l")
        .arg("error")
        .arg("-0")
        .arg("--root")
        .arg(fixture.root())
        .arg("--arch")
        .arg("x86_64")
        .arg("--rootfs-url")
        .arg(file_url(&fixture.archive).as_str())
        .arg("--engine-url")
        .arg(file_url(&fixture.engine).as_str())
        .arg("--shell")
        .arg("sh");
    command
}

#[test]
fn cli_no_args() {
    freeroot()
        .assert()
        .failure()
        .stderr(predicate::str::contains("USAGE:"))
        .stdout(predicate::str::is_empty());
}

#[test]
fn cli_help() {
    freeroot()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("SUBCOMMANDS:"))
        .stdout(predicate::str::contains("--offline"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn cli_ephemeral_offline() {
    let fixture = Fixture::new();
    freeroot()
        .arg("-0")
        .arg("--offline")
        .arg("--arch")
        .arg("aarch64")
        .arg("--root")
        .arg(fixture.root())
        .arg("install")
        .assert()
        .failure()
        .code(0xFF)
        .stderr(predicate::str::contains("offline mode"))
        .stderr(predicate::str::contains("ubuntu-base-20.04.4-base-arm64.tar.gz"))
        .stdout(predicate::str::is_empty());
    assert!(!fixture.root().exists());
}

#[test]
fn cli_install_then_cleanup() {
    let fixture = Fixture::new();
    freeroot_at(&fixture)
        .arg("install")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    assert!(fixture.root().join(".installed").is_file());
    assert!(fixture.root().join("usr/local/bin/proot").is_file());

    freeroot_at(&fixture).arg("cleanup").assert().success();
    assert!(!fixture.root().exists());
}

#[test]
fn cli_run_argv() {
    let fixture = Fixture::new();
    freeroot_at(&fixture)
        .arg("run")
        .arg("--")
        .arg("echo")
        .arg("hello")
        .arg("world!")
        .assert()
        .success()
        .stdout(predicate::eq("hello world!\n"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn cli_run_shell_line() {
    let fixture = Fixture::new();
    freeroot_at(&fixture)
        .arg("run")
        .arg("for i in apple banana; do echo $i extreme; done")
        .assert()
        .success()
        .stdout(predicate::eq("apple extreme\nbanana extreme\n"));
}

#[test]
fn cli_run_env() {
    let fixture = Fixture::new();
    freeroot_at(&fixture)
        .arg("run")
        .arg("-e")
        .arg("FOO")
        .arg("-e")
        .arg("blah=ok")
        .arg("-e")
        .arg("blah=whynot")
        .arg("--")
        .arg("sh")
        .arg("-c")
        .arg("echo \"[$FOO] $blah\"")
        .assert()
        .success()
        .stdout(predicate::eq("[] whynot\n"));
}

#[test]
fn cli_exit_status_mirrors_command() {
    let fixture = Fixture::new();
    freeroot_at(&fixture)
        .arg("run")
        .arg("echo nope >&2; exit 7")
        .assert()
        .code(7)
        .stderr(predicate::eq("nope\n"));
}
