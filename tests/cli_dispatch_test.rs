// tests/cli_dispatch_test.rs

use assert_cmd::Command;
use predicates::prelude::*;

fn cmd_with_isolated_home() -> (Command, tempfile::TempDir) {
    let home = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("book-dl").unwrap();
    // 配置与会话文件写入隔离的 HOME，避免污染真实环境
    cmd.env("HOME", home.path());
    (cmd, home)
}

#[test]
fn test_help_lists_option_groups() {
    let (mut cmd, _home) = cmd_with_isolated_home();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Range"))
        .stdout(predicate::str::contains("Options"))
        .stdout(predicate::str::contains("--driver"));
}

#[test]
fn test_version_flag() {
    let (mut cmd, _home) = cmd_with_isolated_home();
    cmd.arg("-V")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

/// 无效格式是启动期致命错误，在任何网络请求发生前报出。
#[test]
fn test_invalid_format_fails_fast() {
    let (mut cmd, _home) = cmd_with_isolated_home();
    cmd.args(["--formats", "epub,doc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("无效的格式"));
}

#[test]
fn test_zero_start_index_fails_fast() {
    let (mut cmd, _home) = cmd_with_isolated_home();
    cmd.args(["--start", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("起始序号"));
}

#[test]
fn test_unknown_driver_fails_fast() {
    let (mut cmd, _home) = cmd_with_isolated_home();
    cmd.args(["--driver", "baidu"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("无效的网盘驱动"));
}
