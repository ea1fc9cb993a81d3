use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradesd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradesd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn student_enrollment() -> serde_json::Value {
    json!({
        "type": "student",
        "multiple_grading_periods_enabled": true,
        "current_grading_period_id": 7,
        "computed_current_score": 85.0,
        "computed_final_score": 70.0,
        "computed_current_grade": "B",
        "computed_final_grade": "C",
        "current_period_computed_current_score": 80.0,
        "current_period_computed_final_score": 40.0
    })
}

fn graded(id: i64, points: f64, score: f64) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("Assignment {id}"),
        "points_possible": points,
        "submission_types": ["online_upload"],
        "submission": {
            "assignment_id": id,
            "score": score,
            "grade": score.to_string(),
            "workflow_state": "graded"
        }
    })
}

fn ungraded(id: i64, points: f64) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("Assignment {id}"),
        "points_possible": points,
        "submission_types": ["online_upload"]
    })
}

fn seed_course(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    request_ok(
        stdin,
        reader,
        "seed-1",
        "sync.course",
        json!({
            "course": {
                "id": 42,
                "name": "Biology 101",
                "apply_assignment_group_weights": false,
                "enrollments": [student_enrollment()]
            }
        }),
    );
    request_ok(
        stdin,
        reader,
        "seed-2",
        "sync.gradingPeriods",
        json!({
            "courseId": 42,
            "gradingPeriods": [
                { "id": 7, "title": "Fall" },
                { "id": 8, "title": "Spring" }
            ]
        }),
    );
    request_ok(
        stdin,
        reader,
        "seed-3",
        "sync.assignmentGroups",
        json!({
            "courseId": 42,
            "gradingPeriodId": 7,
            "assignmentGroups": [{
                "id": 1,
                "name": "Homework",
                "position": 1,
                "group_weight": 100.0,
                "assignments": [graded(10, 100.0, 80.0), ungraded(11, 100.0)]
            }]
        }),
    );
    request_ok(
        stdin,
        reader,
        "seed-4",
        "sync.enrollments",
        json!({
            "courseId": 42,
            "gradingPeriodId": 7,
            "enrollments": [student_enrollment()]
        }),
    );
    request_ok(
        stdin,
        reader,
        "seed-5",
        "sync.assignmentGroups",
        json!({
            "courseId": 42,
            "assignmentGroups": [{
                "id": 1,
                "name": "Homework",
                "position": 1,
                "group_weight": 100.0,
                "assignments": [graded(10, 100.0, 80.0), graded(12, 50.0, 20.0)]
            }]
        }),
    );
}

fn has_event(result: &serde_json::Value, event: &str, enabled: bool) -> bool {
    result["events"]
        .as_array()
        .map(|events| {
            events
                .iter()
                .any(|e| e["event"] == json!(event) && e["enabled"] == json!(enabled))
        })
        .unwrap_or(false)
}

#[test]
fn initial_load_selects_current_period_and_what_if_round_trips() {
    let workspace = tempfile::tempdir().expect("temp dir");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    seed_course(&mut stdin, &mut reader);

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.open",
        json!({ "courseId": 42, "wait": true }),
    );
    let session_id = opened["sessionId"].as_str().expect("session id").to_string();
    let state = &opened["state"];
    assert_eq!(state["settled"], json!(true));
    assert_eq!(
        state["selection"],
        json!({ "kind": "specificPeriodSelected", "gradingPeriodId": 7 })
    );
    assert_eq!(
        state["pickerTitles"],
        json!(["All Grading Periods", "Fall", "Spring"])
    );
    assert_eq!(state["courseName"], json!("Biology 101"));
    assert_eq!(state["gradedOnly"], json!(true));
    assert_eq!(state["noNetwork"], json!(false));
    assert_eq!(state["assignmentCount"], json!(2));
    assert_eq!(state["grade"]["currentScore"].as_f64(), Some(80.0));
    assert_eq!(state["grade"]["computedScore"].as_f64(), Some(80.0));
    assert_eq!(state["displayedScore"].as_f64(), Some(80.0));
    assert!(has_event(&opened, "whatIfGradingEnabled", true));
    assert!(has_event(&opened, "termSpinnerEnabled", true));

    let what_if = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.whatIf",
        json!({ "sessionId": session_id, "assignmentId": 11, "value": "100", "wait": true }),
    );
    assert_eq!(what_if["state"]["whatIfCount"], json!(1));
    assert_eq!(what_if["state"]["whatIfs"]["11"], json!("100"));
    assert_eq!(what_if["state"]["grade"]["computedScore"].as_f64(), Some(90.0));
    assert_eq!(what_if["state"]["displayedScore"].as_f64(), Some(90.0));
    // Server-reported score is untouched by hypotheticals.
    assert_eq!(what_if["state"]["grade"]["currentScore"].as_f64(), Some(80.0));

    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.whatIf",
        json!({ "sessionId": session_id, "assignmentId": 11, "value": null, "wait": true }),
    );
    assert_eq!(cleared["state"]["whatIfCount"], json!(0));
    assert_eq!(cleared["state"]["grade"]["computedScore"].as_f64(), Some(80.0));
    assert_eq!(cleared["state"]["displayedScore"].as_f64(), Some(80.0));

    let numeric = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "grades.whatIf",
        json!({ "sessionId": session_id, "assignmentId": 10, "value": 60, "wait": true }),
    );
    assert_eq!(numeric["state"]["grade"]["computedScore"].as_f64(), Some(60.0));
    let reset = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "grades.clearWhatIfs",
        json!({ "sessionId": session_id, "wait": true }),
    );
    assert_eq!(reset["state"]["whatIfCount"], json!(0));
    assert_eq!(reset["state"]["grade"]["computedScore"].as_f64(), Some(80.0));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "grades.close",
        json!({ "sessionId": session_id }),
    );
    drop(stdin);
    let _ = child.wait();
}

#[test]
fn period_switch_resets_graded_only_and_reloads_unscoped() {
    let workspace = tempfile::tempdir().expect("temp dir");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    seed_course(&mut stdin, &mut reader);

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.open",
        json!({ "courseId": 42, "wait": true }),
    );
    let session_id = opened["sessionId"].as_str().expect("session id").to_string();

    let all_assignments = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.setGradedOnly",
        json!({ "sessionId": session_id, "gradedOnly": false, "wait": true }),
    );
    let state = &all_assignments["state"];
    assert_eq!(state["gradedOnly"], json!(false));
    assert_eq!(state["grade"]["computedScore"].as_f64(), Some(40.0));
    assert_eq!(state["displayedScore"].as_f64(), Some(40.0));

    let switched = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.selectPeriod",
        json!({ "sessionId": session_id, "title": "All Grading Periods", "wait": true }),
    );
    let state = &switched["state"];
    assert_eq!(state["selection"], json!({ "kind": "allPeriodsSelected" }));
    assert_eq!(state["gradedOnly"], json!(true));
    assert_eq!(state["assignmentCount"], json!(2));
    assert_eq!(state["grade"]["computedScore"].as_f64(), Some(66.67));
    assert_eq!(state["grade"]["currentScore"].as_f64(), Some(85.0));
    assert_eq!(state["displayedScore"].as_f64(), Some(85.0));
    // The reload disables what-if entry until the new groups arrive.
    assert!(has_event(&switched, "whatIfGradingEnabled", false));
    assert!(has_event(&switched, "whatIfGradingEnabled", true));

    let breakdown = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "grades.breakdown",
        json!({ "sessionId": session_id }),
    );
    let groups = breakdown["groups"].as_array().expect("groups");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["earned"].as_f64(), Some(100.0));
    assert_eq!(groups[0]["possible"].as_f64(), Some(150.0));
    assert_eq!(groups[0]["percent"].as_f64(), Some(66.67));

    let back = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "grades.selectPeriod",
        json!({ "sessionId": session_id, "title": "Fall", "wait": true }),
    );
    assert_eq!(
        back["state"]["selection"],
        json!({ "kind": "specificPeriodSelected", "gradingPeriodId": 7 })
    );
    assert_eq!(back["state"]["grade"]["computedScore"].as_f64(), Some(80.0));
    assert_eq!(back["state"]["grade"]["currentScore"].as_f64(), Some(80.0));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn invalid_inputs_are_reported_without_touching_state() {
    let workspace = tempfile::tempdir().expect("temp dir");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    seed_course(&mut stdin, &mut reader);
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.open",
        json!({ "courseId": 42, "wait": true }),
    );
    let session_id = opened["sessionId"].as_str().expect("session id").to_string();

    let not_numeric = request(
        &mut stdin,
        &mut reader,
        "3",
        "grades.whatIf",
        json!({ "sessionId": session_id, "assignmentId": 11, "value": "A+" }),
    );
    assert_eq!(not_numeric["error"]["code"], json!("bad_params"));

    let unknown_assignment = request(
        &mut stdin,
        &mut reader,
        "4",
        "grades.whatIf",
        json!({ "sessionId": session_id, "assignmentId": 999, "value": "5" }),
    );
    assert_eq!(unknown_assignment["error"]["code"], json!("not_found"));

    let unknown_period = request(
        &mut stdin,
        &mut reader,
        "5",
        "grades.selectPeriod",
        json!({ "sessionId": session_id, "gradingPeriodId": 99, "title": "Summer" }),
    );
    assert_eq!(unknown_period["error"]["code"], json!("not_found"));

    let empty_selection = request(
        &mut stdin,
        &mut reader,
        "6",
        "grades.selectPeriod",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(empty_selection["error"]["code"], json!("bad_params"));

    let unknown_session = request(
        &mut stdin,
        &mut reader,
        "7",
        "grades.poll",
        json!({ "sessionId": "missing" }),
    );
    assert_eq!(unknown_session["error"]["code"], json!("not_found"));

    let state = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "grades.state",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(state["state"]["whatIfCount"], json!(0));
    assert_eq!(
        state["state"]["selection"],
        json!({ "kind": "specificPeriodSelected", "gradingPeriodId": 7 })
    );
    assert_eq!(state["state"]["grade"]["computedScore"].as_f64(), Some(80.0));

    drop(stdin);
    let _ = child.wait();
}
