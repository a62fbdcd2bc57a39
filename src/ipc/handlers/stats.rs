use crate::ipc::error::{engine, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::stats::{self, CohortFilter, GroupBy};
use chrono::{Local, NaiveDate};
use serde_json::json;

fn handle_student_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    let as_of = match req.params.get("asOfDate").and_then(|v| v.as_str()) {
        Some(s) => match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            Ok(d) => d,
            Err(_) => {
                return err(
                    &req.id,
                    "bad_params",
                    "asOfDate must be YYYY-MM-DD",
                    Some(json!({ "asOfDate": s })),
                )
            }
        },
        None => Local::now().date_naive(),
    };

    match stats::student_stats(conn, &student_id, as_of) {
        Ok(s) => ok(
            &req.id,
            json!({
                "total": s.total,
                "present": s.present,
                "absent": s.absent,
                "leave": s.leave,
                "percentage": s.percentage,
                "todayPercentage": s.today_percentage
            }),
        ),
        Err(e) => engine(&req.id, &e),
    }
}

fn handle_cohort_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let group_by = match req.params.get("groupBy").and_then(|v| v.as_str()) {
        Some("department") => GroupBy::Department,
        Some("batch") => GroupBy::Batch,
        Some(other) => {
            return err(
                &req.id,
                "bad_params",
                "groupBy must be department or batch",
                Some(json!({ "groupBy": other })),
            )
        }
        None => return err(&req.id, "bad_params", "missing groupBy", None),
    };
    let filter = CohortFilter {
        department_id: req
            .params
            .get("departmentId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        batch_id: req
            .params
            .get("batchId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
    };

    match stats::cohort_stats(conn, &filter, group_by) {
        Ok(rows) => {
            let groups: Vec<serde_json::Value> = rows
                .iter()
                .map(|r| {
                    json!({
                        "group": r.group,
                        "present": r.present,
                        "absent": r.absent,
                        "leave": r.leave
                    })
                })
                .collect();
            ok(&req.id, json!({ "groups": groups }))
        }
        Err(e) => engine(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stats.student" => Some(handle_student_stats(state, req)),
        "stats.cohort" => Some(handle_cohort_stats(state, req)),
        _ => None,
    }
}
