use assert_cmd::Command;

fn kong() -> Command {
    let mut cmd = Command::cargo_bin("kong").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn retry_delay_in_seconds() {
    kong()
        .args(&["retry-delay", "--retry-after", "120"])
        .assert()
        .success()
        .stdout("120\n");
}

#[test]
fn retry_delay_from_http_date() {
    kong()
        .args(&[
            "retry-delay",
            "--retry-after",
            "Mon, 4 Apr 2016 21:58:26 GMT",
            "--date",
            "Mon, 4 Apr 2016 21:56:23 GMT",
        ])
        .assert()
        .success()
        .stdout("123\n");
}

#[test]
fn retry_delay_is_at_least_one_second() {
    kong()
        .args(&["retry-delay", "--retry-after", "-5"])
        .assert()
        .success()
        .stdout("1\n");
}

#[test]
fn retry_delay_date_needs_server_date() {
    kong()
        .args(&["retry-delay", "--retry-after", "Mon, 4 Apr 2016 21:58:26 GMT"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn settings_come_from_the_environment() {
    let output = kong()
        .env("KONG_BUILD_TIMEOUT", "42")
        .env("KONG_SSH_USER", "cirros")
        .arg("settings")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("\"build_timeout\": 42"));
    assert!(stdout.contains("\"ssh_user\": \"cirros\""));
}

#[test]
fn bad_settings_fail() {
    kong()
        .env("KONG_BUILD_TIMEOUT", "soon")
        .arg("settings")
        .assert()
        .failure();
}
