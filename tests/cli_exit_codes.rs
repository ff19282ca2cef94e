// Exit codes of the built binary. Every case here fails before any broker
// connection would be attempted, so no RabbitMQ server is needed.

use std::process::{Command, Output};

fn run_binary(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_transacted-dual-send"))
        .args(args)
        .env_remove("TXN_CONFIG")
        .env_remove("TXN_OPERATION_TIMEOUT_MS")
        .env_remove("TXN_STEP_DELAY_MS")
        .env_remove("TXN_INSPECT_QUEUE_DEPTH")
        .output()
        .expect("failed to launch the binary")
}

#[test]
fn test_missing_arguments_exit_1() {
    let output = run_binary(&["u", "p", "amqp://127.0.0.1:1"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_blank_argument_exits_1() {
    let output = run_binary(&["u", "p", "amqp://127.0.0.1:1", "warehouse", "", "42", "false"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_bad_failure_flag_exits_1() {
    let output = run_binary(&[
        "u",
        "p",
        "amqp://127.0.0.1:1",
        "warehouse",
        "shipping",
        "42",
        "yes",
    ]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_missing_config_file_exits_1() {
    let output = run_binary(&[
        "u",
        "p",
        "amqp://127.0.0.1:1",
        "warehouse",
        "shipping",
        "42",
        "false",
        "--config",
        "/nonexistent/transacted-dual-send.json",
    ]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_help_exits_0() {
    let output = run_binary(&["--help"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("SIMULATE_FAILURE"));
}
