use crate::ipc::error::{engine, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::periods;
use crate::schedule::{self, PeriodSpan};
use serde_json::json;

fn parse_intervals(params: &serde_json::Value) -> Result<Vec<PeriodSpan>, serde_json::Value> {
    let Some(items) = params.get("intervals").and_then(|v| v.as_array()) else {
        return Err(json!({ "key": "intervals" }));
    };
    let mut spans = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let start_s = item.get("start").and_then(|v| v.as_str());
        let end_s = item.get("end").and_then(|v| v.as_str());
        let label = item.get("label").and_then(|v| v.as_str());
        let (Some(start_s), Some(end_s), Some(label)) = (start_s, end_s, label) else {
            return Err(json!({ "index": i, "expected": "{start, end, label}" }));
        };
        let Some(start) = schedule::parse_time(start_s) else {
            return Err(json!({ "index": i, "start": start_s, "expected": "HH:MM" }));
        };
        let Some(end) = schedule::parse_time(end_s) else {
            return Err(json!({ "index": i, "end": end_s, "expected": "HH:MM" }));
        };
        spans.push(PeriodSpan {
            start,
            end,
            label: label.to_string(),
        });
    }
    Ok(spans)
}

fn periods_json(list: &[periods::Period]) -> serde_json::Value {
    json!(list
        .iter()
        .map(|p| json!({
            "id": p.id,
            "batchId": p.batch_id,
            "start": p.start,
            "end": p.end,
            "label": p.label
        }))
        .collect::<Vec<_>>())
}

fn handle_periods_define(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let batch_id = match req.params.get("batchId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing batchId", None),
    };
    let spans = match parse_intervals(&req.params) {
        Ok(v) => v,
        Err(d) => return err(&req.id, "bad_params", "malformed intervals", Some(d)),
    };
    let force = req
        .params
        .get("force")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    match periods::define_periods(conn, &batch_id, spans, force) {
        Ok(defined) => ok(&req.id, json!({ "periods": periods_json(&defined) })),
        Err(e) => engine(&req.id, &e),
    }
}

fn handle_periods_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let batch_id = match req.params.get("batchId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing batchId", None),
    };

    match periods::list_periods(conn, &batch_id) {
        Ok(list) => ok(&req.id, json!({ "periods": periods_json(&list) })),
        Err(e) => engine(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "periods.define" => Some(handle_periods_define(state, req)),
        "periods.list" => Some(handle_periods_list(state, req)),
        _ => None,
    }
}
