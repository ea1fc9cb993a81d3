use std::sync::Arc;
use std::time::Duration;

use crate::calc;
use crate::controller::GradesController;
use crate::db;
use crate::error::EngineError;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{flag, optional_id, parse_param, required_bool, required_id, required_str};
use crate::ipc::types::{AppState, Request, Session};
use crate::model::AssignmentGroup;
use crate::presenter::EventBuffer;
use crate::source::SqliteSource;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

const DEFAULT_WAIT_MS: u64 = 10_000;

fn wait_timeout(req: &Request) -> Duration {
    Duration::from_millis(
        req.params
            .get("timeoutMs")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_WAIT_MS),
    )
}

fn session_mut<'a>(state: &'a mut AppState, req: &Request) -> Result<&'a mut Session, serde_json::Value> {
    let id = required_str(req, "sessionId")?;
    match state.sessions.get_mut(&id) {
        Some(s) => Ok(s),
        None => Err(engine_err(&req.id, &EngineError::UnknownSession(id))),
    }
}

/// Drain delivered results (optionally waiting for them) and report state plus events.
fn snapshot(session: &mut Session, req: &Request) -> serde_json::Value {
    session.poll(flag(req, "wait"), wait_timeout(req));
    let events = session.presenter_mut().drain();
    json!({
        "state": session.state(),
        "events": events,
    })
}

fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_id(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let source = Arc::new(SqliteSource::new(db::db_path(&workspace)));
    let mut session: Session = GradesController::new(
        course_id,
        state.config.clone(),
        source,
        state.runtime.handle().clone(),
        EventBuffer::default(),
    );
    session.open(flag(req, "forceRefresh"));

    let session_id = Uuid::new_v4().to_string();
    let mut result = snapshot(&mut session, req);
    result["sessionId"] = json!(session_id);
    info!(target: "gradesd::grades", %session_id, course_id, "session opened");
    state.sessions.insert(session_id, session);
    ok(&req.id, result)
}

fn handle_poll(state: &mut AppState, req: &Request) -> serde_json::Value {
    match session_mut(state, req) {
        Ok(session) => ok(&req.id, snapshot(session, req)),
        Err(e) => e,
    }
}

fn handle_state(state: &mut AppState, req: &Request) -> serde_json::Value {
    match session_mut(state, req) {
        Ok(session) => ok(&req.id, json!({ "state": session.state() })),
        Err(e) => e,
    }
}

fn handle_select_period(state: &mut AppState, req: &Request) -> serde_json::Value {
    let grading_period_id = match optional_id(req, "gradingPeriodId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = req
        .params
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    if grading_period_id.is_none() && title.trim().is_empty() {
        return err(
            &req.id,
            "bad_params",
            "missing gradingPeriodId or title",
            None,
        );
    }
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    if let Err(e) = session.select_period(grading_period_id, &title) {
        return engine_err(&req.id, &e);
    }
    ok(&req.id, snapshot(session, req))
}

fn handle_set_graded_only(state: &mut AppState, req: &Request) -> serde_json::Value {
    let graded_only = match required_bool(req, "gradedOnly") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    session.set_graded_only(graded_only);
    ok(&req.id, snapshot(session, req))
}

fn what_if_value(req: &Request) -> Result<Option<String>, serde_json::Value> {
    match req.params.get("value") {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) if v.is_string() => Ok(v.as_str().map(|s| s.to_string())),
        Some(v) if v.is_number() => Ok(Some(v.to_string())),
        Some(other) => Err(err(
            &req.id,
            "bad_params",
            "value must be a string, number or null",
            Some(json!({ "value": other })),
        )),
    }
}

fn handle_what_if(state: &mut AppState, req: &Request) -> serde_json::Value {
    let assignment_id = match required_id(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let value = match what_if_value(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    if let Err(e) = session.apply_what_if(assignment_id, value.as_deref()) {
        return engine_err(&req.id, &e);
    }
    ok(&req.id, snapshot(session, req))
}

fn handle_clear_what_ifs(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    session.clear_what_ifs();
    ok(&req.id, snapshot(session, req))
}

fn handle_breakdown(state: &mut AppState, req: &Request) -> serde_json::Value {
    match session_mut(state, req) {
        Ok(session) => ok(&req.id, json!({ "groups": session.breakdown() })),
        Err(e) => e,
    }
}

fn handle_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session_id = match required_str(req, "sessionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(mut session) = state.sessions.remove(&session_id) else {
        return engine_err(&req.id, &EngineError::UnknownSession(session_id));
    };
    session.close();
    ok(&req.id, json!({ "closed": true }))
}

fn handle_compute(state: &mut AppState, req: &Request) -> serde_json::Value {
    let groups: Vec<AssignmentGroup> = match parse_param(req, "assignmentGroups") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let weighted = match required_bool(req, "weighted") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let graded_only = match required_bool(req, "gradedOnly") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let policy = state.config.policy(weighted, graded_only);
    ok(
        &req.id,
        json!({
            "score": calc::compute_grade_with(&groups, &policy),
            "groups": calc::group_breakdown(&groups, &policy),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.open" => Some(handle_open(state, req)),
        "grades.poll" => Some(handle_poll(state, req)),
        "grades.state" => Some(handle_state(state, req)),
        "grades.selectPeriod" => Some(handle_select_period(state, req)),
        "grades.setGradedOnly" => Some(handle_set_graded_only(state, req)),
        "grades.whatIf" => Some(handle_what_if(state, req)),
        "grades.clearWhatIfs" => Some(handle_clear_what_ifs(state, req)),
        "grades.breakdown" => Some(handle_breakdown(state, req)),
        "grades.close" => Some(handle_close(state, req)),
        "grades.compute" => Some(handle_compute(state, req)),
        _ => None,
    }
}
