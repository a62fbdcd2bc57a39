use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendanced");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendanced");
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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
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
        "expected ok for {}: {}",
        method,
        value
    );
    value.get("result").cloned().expect("result")
}

struct Fixture {
    entry_id: String,
    student_ids: Vec<String>,
    department_id: String,
}

/// CSE has one batch, two students, a Monday class. A second department
/// (EEE) stays empty so cohort series completeness is observable.
fn setup_cohorts(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Fixture {
    let workspace = temp_dir("attendanced-stats");
    request_ok(
        stdin,
        reader,
        "w",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let dep = request_ok(
        stdin,
        reader,
        "d1",
        "departments.create",
        json!({ "code": "CSE", "name": "Computer Science" }),
    );
    request_ok(
        stdin,
        reader,
        "d2",
        "departments.create",
        json!({ "code": "EEE", "name": "Electrical" }),
    );
    let batch = request_ok(
        stdin,
        reader,
        "b",
        "batches.create",
        json!({
            "departmentId": dep["departmentId"],
            "code": "CSE-2026",
            "semesterNo": 3
        }),
    );
    let batch_id = batch["batchId"].as_str().expect("batchId").to_string();

    let defined = request_ok(
        stdin,
        reader,
        "p",
        "periods.define",
        json!({
            "batchId": batch_id,
            "intervals": [{ "start": "09:00", "end": "10:00", "label": "P1" }]
        }),
    );
    let subject = request_ok(
        stdin,
        reader,
        "s",
        "subjects.create",
        json!({ "code": "MA101", "name": "Maths" }),
    );
    let faculty = request_ok(
        stdin,
        reader,
        "f",
        "faculty.create",
        json!({ "name": "A. Rao" }),
    );
    let entry = request_ok(
        stdin,
        reader,
        "e",
        "timetable.upsertEntry",
        json!({
            "batchId": batch_id,
            "semester": 3,
            "weekday": 1,
            "periodId": defined["periods"][0]["id"],
            "subjectId": subject["subjectId"],
            "facultyId": faculty["facultyId"]
        }),
    );

    let mut student_ids = Vec::new();
    for (i, name) in ["Asha", "Bilal"].iter().enumerate() {
        let st = request_ok(
            stdin,
            reader,
            &format!("st{i}"),
            "students.create",
            json!({ "batchId": batch_id, "name": name }),
        );
        student_ids.push(st["studentId"].as_str().expect("studentId").to_string());
    }

    Fixture {
        entry_id: entry["entry"]["id"].as_str().expect("entry id").to_string(),
        student_ids,
        department_id: dep["departmentId"].as_str().expect("dep id").to_string(),
    }
}

#[test]
fn seven_present_of_ten_is_seventy_percent() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = setup_cohorts(&mut stdin, &mut reader);

    for day in 1..=10 {
        let status = match day {
            1..=7 => "present",
            8 | 9 => "absent",
            _ => "leave",
        };
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("m{day}"),
            "attendance.record",
            json!({
                "entryId": fx.entry_id,
                "date": format!("2026-08-{:02}", day),
                "marks": [{ "studentId": fx.student_ids[0], "status": status }]
            }),
        );
    }

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "q",
        "stats.student",
        json!({ "studentId": fx.student_ids[0], "asOfDate": "2026-08-10" }),
    );
    assert_eq!(stats["total"], 10);
    assert_eq!(stats["present"], 7);
    assert_eq!(stats["absent"], 2);
    assert_eq!(stats["percentage"], 70.0);
    // The as-of day had one session and the student was on leave.
    assert_eq!(stats["todayPercentage"], 0.0);

    let _ = child.kill();
}

#[test]
fn zero_records_render_as_zero_not_an_error() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = setup_cohorts(&mut stdin, &mut reader);

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "q",
        "stats.student",
        json!({ "studentId": fx.student_ids[1] }),
    );
    assert_eq!(stats["total"], 0);
    assert_eq!(stats["percentage"], 0.0);
    assert_eq!(stats["todayPercentage"], 0.0);

    let _ = child.kill();
}

#[test]
fn today_percentage_tracks_the_as_of_date_only() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = setup_cohorts(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.record",
        json!({
            "entryId": fx.entry_id,
            "date": "2026-08-17",
            "marks": [{ "studentId": fx.student_ids[0], "status": "absent" }]
        }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.record",
        json!({
            "entryId": fx.entry_id,
            "date": "2026-08-24",
            "marks": [{ "studentId": fx.student_ids[0], "status": "present" }]
        }),
    );

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "q",
        "stats.student",
        json!({ "studentId": fx.student_ids[0], "asOfDate": "2026-08-24" }),
    );
    assert_eq!(stats["percentage"], 50.0);
    assert_eq!(stats["todayPercentage"], 100.0);

    let _ = child.kill();
}

#[test]
fn cohort_series_is_complete_including_empty_groups() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = setup_cohorts(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.record",
        json!({
            "entryId": fx.entry_id,
            "date": "2026-08-24",
            "marks": [
                { "studentId": fx.student_ids[0], "status": "present" },
                { "studentId": fx.student_ids[1], "status": "absent" }
            ]
        }),
    );

    let cohort = request_ok(
        &mut stdin,
        &mut reader,
        "q",
        "stats.cohort",
        json!({ "groupBy": "department" }),
    );
    let groups = cohort["groups"].as_array().expect("groups");
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0]["group"], "CSE");
    assert_eq!(groups[0]["present"], 1);
    assert_eq!(groups[0]["absent"], 1);
    assert_eq!(groups[1]["group"], "EEE");
    assert_eq!(groups[1]["present"], 0);
    assert_eq!(groups[1]["leave"], 0);

    let scoped = request_ok(
        &mut stdin,
        &mut reader,
        "q2",
        "stats.cohort",
        json!({ "groupBy": "batch", "departmentId": fx.department_id }),
    );
    let groups = scoped["groups"].as_array().expect("groups");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["group"], "CSE-2026");

    let _ = child.kill();
}

#[test]
fn unknown_student_stats_are_not_found() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _fx = setup_cohorts(&mut stdin, &mut reader);

    let resp = request(
        &mut stdin,
        &mut reader,
        "q",
        "stats.student",
        json!({ "studentId": "ghost" }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "not_found");

    let _ = child.kill();
}
