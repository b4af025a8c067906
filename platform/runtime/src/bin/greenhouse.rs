//! Process entrypoint (§10.3, §6). Two modes:
//!
//! - no argv: server mode — starts every background loop plus, if
//!   configured, the HTTP/WebSocket surface, and reads commands from stdin
//!   until `SYSTEM_SHUTDOWN` or EOF.
//! - one argv, a JSON command frame: CLI goal ingress — runs exactly one
//!   `validation_chain` execution and prints its result as a single JSON
//!   document to stdout, exiting 0 on success and 1 on failure.

use std::process::ExitCode;

use greenhouse_config::RuntimeConfig;
use greenhouse_runtime::Runtime;
use greenhouse_ui::{CommandFrame, parse_command};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = greenhouse_env::rust_log()
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let mut args = std::env::args().skip(1);
    match args.next() {
        Some(raw) => run_cli_goal(&raw).await,
        None => run_server().await,
    }
}

/// Single-shot CLI goal ingress: `greenhouse '{"command":"SUBMIT_GOAL","payload":{"goal":"..."}}'`.
async fn run_cli_goal(raw: &str) -> ExitCode {
    let frame = match parse_command(raw) {
        Ok(frame) => frame,
        Err(err) => {
            print_json_error(&err.to_string());
            return ExitCode::FAILURE;
        }
    };
    let goal = frame.payload.get("goal").and_then(serde_json::Value::as_str).unwrap_or_default().to_string();
    if goal.is_empty() {
        print_json_error("payload.goal is required");
        return ExitCode::FAILURE;
    }

    let config = RuntimeConfig::from_env();
    let runtime = match Runtime::build(config).await {
        Ok(runtime) => runtime,
        Err(err) => {
            print_json_error(&err.to_string());
            return ExitCode::FAILURE;
        }
    };

    match runtime.run_cli_goal(goal).await {
        Ok(result) => {
            println!("{}", serde_json::to_string(&result).unwrap_or_else(|_| "{}".to_string()));
            ExitCode::SUCCESS
        }
        Err(err) => {
            print_json_error(&err.to_string());
            ExitCode::FAILURE
        }
    }
}

fn print_json_error(reason: &str) {
    println!("{}", serde_json::json!({ "status": "error", "error": reason }));
}

/// Server mode: every background loop, the stdin command reader, and the
/// HTTP surface all run concurrently until `shutdown` fires.
async fn run_server() -> ExitCode {
    let config = RuntimeConfig::from_env();
    let runtime = match Runtime::build(config).await {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to build runtime");
            return ExitCode::FAILURE;
        }
    };

    let stdin_runtime = runtime.clone();
    let stdin_task = tokio::spawn(async move {
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match parse_command(trimmed) {
                        Ok(frame) => dispatch(&stdin_runtime, frame).await,
                        Err(err) => warn!(error = %err, "failed to parse stdin command"),
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "stdin read failed");
                    break;
                }
            }
        }
    });

    let result = runtime.run().await;
    stdin_task.abort();

    if let Err(err) = result {
        error!(error = %err, "runtime exited with error");
        return ExitCode::FAILURE;
    }
    info!("greenhouse runtime stopped");
    ExitCode::SUCCESS
}

async fn dispatch(runtime: &Runtime, frame: CommandFrame) {
    runtime.command_plane.dispatch(frame).await;
}
