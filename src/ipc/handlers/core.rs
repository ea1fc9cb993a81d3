use crate::config::{EngineConfig, SETTINGS_KEY};
use crate::db;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "openSessions": state.sessions.len(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            // Sessions read from the previous workspace's mirror.
            state.close_sessions();

            let mut config = EngineConfig::from_env();
            // A broken stored override must not prevent the workspace from opening.
            match db::settings_get_json(&conn, SETTINGS_KEY) {
                Ok(Some(stored)) => {
                    if let Err(e) = config.apply_patch(&stored) {
                        warn!(target: "gradesd::config", error = %e, "ignoring stored engine config");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(target: "gradesd::config", error = %e, "could not read stored engine config");
                }
            }
            // Thread count is fixed once the runtime exists.
            config.worker_threads = state.config.worker_threads;
            state.config = config;

            info!(target: "gradesd::workspace", path = %path.display(), "workspace selected");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "config": state.config }))
}

fn handle_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let patch = req.params.get("config").cloned().unwrap_or(json!({}));

    let mut next = state.config.clone();
    if let Err(e) = next.apply_patch(&patch) {
        return engine_err(&req.id, &e);
    }

    let mut stored = match db::settings_get_json(conn, SETTINGS_KEY) {
        Ok(v) => v.unwrap_or_else(|| json!({})),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let (Some(stored_obj), Some(patch_obj)) = (stored.as_object_mut(), patch.as_object()) {
        for (k, v) in patch_obj {
            stored_obj.insert(k.clone(), v.clone());
        }
    }
    if let Err(e) = db::settings_set_json(conn, SETTINGS_KEY, &stored) {
        return err(&req.id, "db_query_failed", e.to_string(), None);
    }

    info!(target: "gradesd::config", patch = %patch, "engine config updated");
    state.config = next;
    ok(&req.id, json!({ "config": state.config }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "config.get" => Some(handle_config_get(state, req)),
        "config.update" => Some(handle_config_update(state, req)),
        _ => None,
    }
}
