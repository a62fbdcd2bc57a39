use crate::attendance::{self, Mark, Status};
use crate::ipc::error::{engine, err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use serde_json::json;

fn parse_date(params: &serde_json::Value) -> Result<NaiveDate, serde_json::Value> {
    let Some(s) = params.get("date").and_then(|v| v.as_str()) else {
        return Err(json!({ "key": "date" }));
    };
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| json!({ "date": s, "expected": "YYYY-MM-DD" }))
}

fn parse_marks(params: &serde_json::Value) -> Result<Vec<Mark>, serde_json::Value> {
    let Some(items) = params.get("marks").and_then(|v| v.as_array()) else {
        return Err(json!({ "key": "marks" }));
    };
    let mut marks = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let student_id = item.get("studentId").and_then(|v| v.as_str());
        let status_s = item.get("status").and_then(|v| v.as_str());
        let (Some(student_id), Some(status_s)) = (student_id, status_s) else {
            return Err(json!({ "index": i, "expected": "{studentId, status}" }));
        };
        let status = match Status::parse(status_s) {
            Ok(v) => v,
            Err(_) => return Err(json!({ "index": i, "status": status_s })),
        };
        marks.push(Mark {
            student_id: student_id.to_string(),
            status,
        });
    }
    Ok(marks)
}

fn handle_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let entry_id = match req.params.get("entryId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing entryId", None),
    };
    let date = match parse_date(&req.params) {
        Ok(v) => v,
        Err(d) => return err(&req.id, "bad_params", "missing or malformed date", Some(d)),
    };
    let marks = match parse_marks(&req.params) {
        Ok(v) => v,
        Err(d) => return err(&req.id, "bad_params", "malformed marks", Some(d)),
    };
    let skip_invalid = req
        .params
        .get("skipInvalid")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    match attendance::record_attendance(conn, &entry_id, date, &marks, skip_invalid) {
        Ok(outcome) => ok(
            &req.id,
            json!({
                "sessionId": outcome.session_id,
                "recorded": outcome.recorded,
                "skipped": outcome.skipped
            }),
        ),
        Err(e) => engine(&req.id, &e),
    }
}

fn handle_delete_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let session_id = match req.params.get("sessionId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing sessionId", None),
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };

    match attendance::delete_record(conn, &session_id, &student_id) {
        Ok(()) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => engine(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.record" => Some(handle_record(state, req)),
        "attendance.deleteRecord" => Some(handle_delete_record(state, req)),
        _ => None,
    }
}
