mod calc;
mod config;
mod db;
mod export;
mod identity;
mod ipc;
mod report;
mod session;
mod store;
mod student;

use std::io::{self, BufRead, Write};

use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "MARKREGD_LOG";

fn init_logging() {
    // stdout carries the protocol; logs go to stderr only.
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn write_line(stdout: &mut impl Write, value: &serde_json::Value) {
    let _ = writeln!(
        stdout,
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{\"ok\":false}".to_string())
    );
}

fn main() {
    init_logging();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "markregd starting");

    let mut state = ipc::AppState::default();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                tracing::warn!(error = %e, "unparseable request line");
                write_line(
                    &mut stdout,
                    &serde_json::json!({
                        "ok": false,
                        "error": { "code": "bad_json", "message": e.to_string() }
                    }),
                );
                let _ = stdout.flush();
                continue;
            }
        };

        tracing::debug!(id = %req.id, method = %req.method, "request");
        let resp = ipc::handle_request(&mut state, req);
        write_line(&mut stdout, &resp);
        for event in state.drain_events() {
            write_line(&mut stdout, &event.to_json());
        }
        let _ = stdout.flush();
    }
    tracing::info!("stdin closed, exiting");
}
