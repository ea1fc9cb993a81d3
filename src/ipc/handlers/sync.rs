use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_id, parse_param, required_bool, required_id, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{AssignmentGroup, Course, Enrollment, GradingPeriod};
use crate::source::Endpoint;
use serde_json::json;
use tracing::{debug, info};

fn next_url(req: &Request) -> Option<String> {
    req.params
        .get("nextUrl")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn db_failed(req: &Request, e: anyhow::Error) -> serde_json::Value {
    err(&req.id, "db_query_failed", e.to_string(), None)
}

fn handle_sync_course(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course: Course = match parse_param(req, "course") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = db::upsert_course(conn, &course) {
        return db_failed(req, e);
    }
    debug!(target: "gradesd::sync", course_id = course.id, enrollments = course.enrollments.len(), "course mirrored");
    ok(&req.id, json!({ "courseId": course.id }))
}

fn handle_sync_grading_periods(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_id(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let periods: Vec<GradingPeriod> = match parse_param(req, "gradingPeriods") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let next = next_url(req);
    if let Err(e) = db::upsert_grading_periods(conn, course_id, &periods, next.as_deref()) {
        return db_failed(req, e);
    }
    ok(&req.id, json!({ "courseId": course_id, "count": periods.len() }))
}

fn handle_sync_assignment_groups(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_id(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grading_period_id = match optional_id(req, "gradingPeriodId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let groups: Vec<AssignmentGroup> = match parse_param(req, "assignmentGroups") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let next = next_url(req);
    if let Err(e) =
        db::upsert_assignment_groups(conn, course_id, grading_period_id, &groups, next.as_deref())
    {
        return db_failed(req, e);
    }
    let assignments: usize = groups.iter().map(|g| g.assignments.len()).sum();
    ok(
        &req.id,
        json!({
            "courseId": course_id,
            "gradingPeriodId": grading_period_id,
            "groups": groups.len(),
            "assignments": assignments,
        }),
    )
}

fn handle_sync_enrollments(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_id(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grading_period_id = match required_id(req, "gradingPeriodId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let enrollments: Vec<Enrollment> = match parse_param(req, "enrollments") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = db::upsert_enrollments(conn, course_id, grading_period_id, &enrollments) {
        return db_failed(req, e);
    }
    ok(&req.id, json!({ "courseId": course_id, "count": enrollments.len() }))
}

fn handle_sync_failure(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let endpoint_raw = match required_str(req, "endpoint") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(endpoint) = Endpoint::parse(&endpoint_raw) else {
        return err(
            &req.id,
            "bad_params",
            "endpoint must be one of: course, gradingPeriods, assignmentGroups, enrollments",
            Some(json!({ "endpoint": endpoint_raw })),
        );
    };
    let course_id = match required_id(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grading_period_id = match optional_id(req, "gradingPeriodId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let status = req
        .params
        .get("status")
        .and_then(|v| v.as_u64())
        .filter(|s| *s <= u16::MAX as u64)
        .unwrap_or(500) as u16;
    let message = req
        .params
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("request failed");
    if let Err(e) = db::record_failure(
        conn,
        endpoint.as_str(),
        course_id,
        grading_period_id,
        status,
        message,
    ) {
        return db_failed(req, e);
    }
    info!(target: "gradesd::sync", endpoint = endpoint.as_str(), course_id, status, "fetch failure recorded");
    ok(&req.id, json!({ "recorded": true }))
}

fn handle_sync_connectivity(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let online = match required_bool(req, "online") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = db::settings_set_json(conn, db::ONLINE_KEY, &json!(online)) {
        return db_failed(req, e);
    }
    info!(target: "gradesd::sync", online, "connectivity changed");
    ok(&req.id, json!({ "online": online }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sync.course" => Some(handle_sync_course(state, req)),
        "sync.gradingPeriods" => Some(handle_sync_grading_periods(state, req)),
        "sync.assignmentGroups" => Some(handle_sync_assignment_groups(state, req)),
        "sync.enrollments" => Some(handle_sync_enrollments(state, req)),
        "sync.failure" => Some(handle_sync_failure(state, req)),
        "sync.connectivity" => Some(handle_sync_connectivity(state, req)),
        _ => None,
    }
}
