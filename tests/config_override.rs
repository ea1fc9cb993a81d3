use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradesd");
    let mut child = Command::new(exe)
        .env_remove("GRADESD_ALL_PERIODS_TITLE")
        .env_remove("GRADESD_ROUNDING_PLACES")
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

fn thirds() -> serde_json::Value {
    json!([{
        "id": 1,
        "position": 1,
        "group_weight": 100.0,
        "assignments": [{
            "id": 1,
            "points_possible": 3.0,
            "submission_types": ["online_upload"],
            "submission": { "score": 2.0, "grade": "2", "workflow_state": "graded" }
        }]
    }])
}

#[test]
fn config_update_applies_and_persists_per_workspace() {
    let workspace = tempfile::tempdir().expect("temp dir");
    let path = workspace.path().to_string_lossy().to_string();

    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar();
        let _ = request(&mut stdin, &mut reader, "1", "workspace.select", json!({ "path": path }));

        let initial = request(&mut stdin, &mut reader, "2", "config.get", json!({}));
        assert_eq!(
            initial["result"]["config"]["allPeriodsTitle"],
            json!("All Grading Periods")
        );
        assert_eq!(initial["result"]["config"]["roundingPlaces"], json!(2));

        let rejected = request(
            &mut stdin,
            &mut reader,
            "3",
            "config.update",
            json!({ "config": { "roundingPlaces": 1, "colour": "blue" } }),
        );
        assert_eq!(rejected["error"]["code"], json!("bad_params"));
        let unchanged = request(&mut stdin, &mut reader, "4", "config.get", json!({}));
        assert_eq!(unchanged["result"]["config"]["roundingPlaces"], json!(2));

        let updated = request(
            &mut stdin,
            &mut reader,
            "5",
            "config.update",
            json!({ "config": { "roundingPlaces": 1, "allPeriodsTitle": "Whole Year" } }),
        );
        assert_eq!(updated["ok"], json!(true));
        assert_eq!(updated["result"]["config"]["roundingPlaces"], json!(1));

        let computed = request(
            &mut stdin,
            &mut reader,
            "6",
            "grades.compute",
            json!({ "assignmentGroups": thirds(), "weighted": false, "gradedOnly": true }),
        );
        assert_eq!(computed["result"]["score"].as_f64(), Some(66.7));

        let _ = request(
            &mut stdin,
            &mut reader,
            "7",
            "sync.course",
            json!({ "course": { "id": 5, "name": "Art" } }),
        );
        let _ = request(
            &mut stdin,
            &mut reader,
            "8",
            "sync.assignmentGroups",
            json!({ "courseId": 5, "assignmentGroups": thirds() }),
        );
        let opened = request(
            &mut stdin,
            &mut reader,
            "9",
            "grades.open",
            json!({ "courseId": 5, "wait": true }),
        );
        let state = &opened["result"]["state"];
        assert_eq!(state["pickerTitles"], json!(["Whole Year"]));
        assert_eq!(state["grade"]["computedScore"].as_f64(), Some(66.7));

        drop(stdin);
        let _ = child.wait();
    }

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let before = request(&mut stdin, &mut reader, "1", "config.get", json!({}));
    assert_eq!(before["result"]["config"]["roundingPlaces"], json!(2));

    let _ = request(&mut stdin, &mut reader, "2", "workspace.select", json!({ "path": path }));
    let restored = request(&mut stdin, &mut reader, "3", "config.get", json!({}));
    assert_eq!(restored["result"]["config"]["roundingPlaces"], json!(1));
    assert_eq!(
        restored["result"]["config"]["allPeriodsTitle"],
        json!("Whole Year")
    );

    drop(stdin);
    let _ = child.wait();
}
