use std::process::Command;

fn run(fixture: &str, envs: &[(&str, &str)]) -> (String, String, bool) {
    let path = format!("tests/fixtures/{fixture}");
    let output = Command::new(env!("CARGO_BIN_EXE_remit-ledger"))
        .arg(&path)
        .env("RUST_LOG", "warn")
        // nothing listens here, so rates come from the built-in table
        .env("REMIT_RATES_URL", "http://127.0.0.1:9")
        .env("REMIT_RATES_TIMEOUT_MS", "200")
        .env("REMIT_LATENCY_MS", "0")
        .env_remove("REMIT_STATE_FILE")
        .envs(envs.iter().copied())
        .output()
        .expect("failed to run binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn valid_operations() {
    let (stdout, stderr, success) = run("valid.csv", &[]);

    assert!(success);
    assert!(stderr.is_empty(), "unexpected stderr: {stderr}");

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], "currency,balance");
    // 50 + 60 - (20 + 2.99) - 10 + 25
    assert_eq!(lines[1], "USD,102.0100");
}

#[test]
fn errors_warn_but_do_not_block() {
    let (stdout, stderr, success) = run("with_errors.csv", &[]);

    assert!(success);
    assert!(stderr.contains("unrecognized operation"));
    assert!(stderr.contains("missing amount"));
    assert!(stderr.contains("recipient 99 not found"));

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], "currency,balance");
    assert_eq!(lines[1], "USD,87.0100");
}

#[test]
fn large_send_is_confirmed_with_exposed_code() {
    let (stdout, _, success) = run("large_send.csv", &[]);

    assert!(success);
    // 1050 - (600 + 6)
    assert!(stdout.contains("USD,444.0000"));
}

#[test]
fn large_send_stays_parked_without_code() {
    let (stdout, stderr, success) = run("large_send.csv", &[("REMIT_EXPOSE_OTP", "false")]);

    assert!(success);
    assert!(stderr.contains("one-time password"));
    assert!(stdout.contains("USD,1050.0000"));
}

#[test]
fn missing_script_fails() {
    let (stdout, stderr, success) = run("does_not_exist.csv", &[]);

    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("cannot open"));
}
