use crate::ipc::error::{engine, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::schedule;
use crate::timetable::{self, UpsertEntry};
use serde_json::json;

/// The grid accepts weekdays either as 1..=7 (Monday=1) or as an English
/// day name, since both shells send both.
fn parse_weekday(params: &serde_json::Value) -> Result<u8, serde_json::Value> {
    let Some(v) = params.get("weekday") else {
        return Err(json!({ "key": "weekday" }));
    };
    if let Some(n) = v.as_i64() {
        return schedule::validate_weekday(n).map_err(|_| json!({ "weekday": n }));
    }
    if let Some(s) = v.as_str() {
        if let Some(n) = schedule::weekday_from_name(s) {
            return Ok(n);
        }
        return Err(json!({ "weekday": s }));
    }
    Err(json!({ "key": "weekday" }))
}

fn entry_json(e: &timetable::Entry) -> serde_json::Value {
    json!({
        "id": e.id,
        "batchId": e.batch_id,
        "semester": e.semester,
        "weekday": e.weekday,
        "periodId": e.period_id,
        "subjectId": e.subject_id,
        "facultyId": e.faculty_id
    })
}

fn handle_upsert_entry(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let get = |key: &str| req.params.get(key).and_then(|v| v.as_str());
    let (Some(batch_id), Some(period_id), Some(subject_id), Some(faculty_id)) = (
        get("batchId"),
        get("periodId"),
        get("subjectId"),
        get("facultyId"),
    ) else {
        return err(
            &req.id,
            "bad_params",
            "missing batchId/periodId/subjectId/facultyId",
            None,
        );
    };
    let Some(semester) = req.params.get("semester").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing semester", None);
    };
    let weekday = match parse_weekday(&req.params) {
        Ok(v) => v,
        Err(d) => {
            return err(
                &req.id,
                "bad_params",
                "weekday must be 1..=7 or a day name",
                Some(d),
            )
        }
    };
    let entry_id = get("entryId").map(|s| s.to_string());

    let request = UpsertEntry {
        batch_id: batch_id.to_string(),
        semester,
        weekday,
        period_id: period_id.to_string(),
        subject_id: subject_id.to_string(),
        faculty_id: faculty_id.to_string(),
        entry_id,
    };
    match timetable::upsert_entry(conn, request) {
        Ok(entry) => ok(&req.id, json!({ "entry": entry_json(&entry) })),
        Err(e) => engine(&req.id, &e),
    }
}

fn handle_delete_entry(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let entry_id = match req.params.get("entryId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing entryId", None),
    };

    match timetable::delete_entry(conn, &entry_id) {
        Ok(()) => ok(&req.id, json!({ "deleted": entry_id })),
        Err(e) => engine(&req.id, &e),
    }
}

fn handle_list_entries(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let batch_id = match req.params.get("batchId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing batchId", None),
    };
    let Some(semester) = req.params.get("semester").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing semester", None);
    };

    match timetable::list_entries(conn, &batch_id, semester) {
        Ok(grid) => {
            let entries: Vec<serde_json::Value> = grid
                .iter()
                .map(|g| {
                    let mut e = entry_json(&g.entry);
                    e["periodLabel"] = json!(g.period_label);
                    e["periodStart"] = json!(g.period_start);
                    e["periodEnd"] = json!(g.period_end);
                    e
                })
                .collect();
            ok(&req.id, json!({ "entries": entries }))
        }
        Err(e) => engine(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timetable.upsertEntry" => Some(handle_upsert_entry(state, req)),
        "timetable.deleteEntry" => Some(handle_delete_entry(state, req)),
        "timetable.listEntries" => Some(handle_list_entries(state, req)),
        _ => None,
    }
}
