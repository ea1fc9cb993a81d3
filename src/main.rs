mod cache;
mod calc;
mod config;
mod controller;
mod db;
mod error;
mod ipc;
mod logging;
mod model;
mod periods;
mod presenter;
mod source;
mod worker;

use std::io::{self, BufRead, Write};
use tracing::{error, info};

fn main() {
    if let Err(e) = logging::init_logging() {
        eprintln!("gradesd: logging disabled: {e}");
    }

    let config = config::EngineConfig::from_env();
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .thread_name("gradesd-worker")
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(target: "gradesd", error = %e, "failed to start worker runtime");
            std::process::exit(1);
        }
    };
    info!(target: "gradesd", version = env!("CARGO_PKG_VERSION"), workers = config.worker_threads, "gradesd starting");

    let mut state = ipc::AppState::new(config, runtime);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let _ = writeln!(stdout, "{}", ipc::err("", "bad_json", e.to_string(), None));
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    state.close_sessions();
    info!(target: "gradesd", "stdin closed, shutting down");
}
