//! Identity/registry seam: the minimal entity CRUD the engine's referential
//! checks need. The real platform owns richer lifecycles for these records;
//! the engine only requires that valid ids exist.

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn required_str(params: &serde_json::Value, key: &str) -> Result<String, serde_json::Value> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| json!({ "key": key }))
}

fn handle_departments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let code = match required_str(&req.params, "code") {
        Ok(v) => v,
        Err(d) => return err(&req.id, "bad_params", "missing code", Some(d)),
    };
    let name = match required_str(&req.params, "name") {
        Ok(v) => v,
        Err(d) => return err(&req.id, "bad_params", "missing name", Some(d)),
    };

    let department_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO departments(id, code, name) VALUES(?, ?, ?)",
        (&department_id, &code, &name),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "departments" })),
        );
    }
    ok(&req.id, json!({ "departmentId": department_id, "code": code }))
}

fn handle_batches_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let department_id = match required_str(&req.params, "departmentId") {
        Ok(v) => v,
        Err(d) => return err(&req.id, "bad_params", "missing departmentId", Some(d)),
    };
    let code = match required_str(&req.params, "code") {
        Ok(v) => v,
        Err(d) => return err(&req.id, "bad_params", "missing code", Some(d)),
    };
    let Some(semester_no) = req.params.get("semesterNo").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing semesterNo", None);
    };

    let exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM departments WHERE id = ?",
            [&department_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(
            &req.id,
            "not_found",
            "department not found",
            Some(json!({ "kind": "department", "id": department_id })),
        );
    }

    let batch_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO batches(id, department_id, code, semester_no) VALUES(?, ?, ?, ?)",
        (&batch_id, &department_id, &code, semester_no),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "batches" })),
        );
    }
    ok(&req.id, json!({ "batchId": batch_id, "code": code }))
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let code = match required_str(&req.params, "code") {
        Ok(v) => v,
        Err(d) => return err(&req.id, "bad_params", "missing code", Some(d)),
    };
    let name = match required_str(&req.params, "name") {
        Ok(v) => v,
        Err(d) => return err(&req.id, "bad_params", "missing name", Some(d)),
    };

    let subject_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO subjects(id, code, name) VALUES(?, ?, ?)",
        (&subject_id, &code, &name),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "subjects" })),
        );
    }
    ok(&req.id, json!({ "subjectId": subject_id, "code": code }))
}

fn handle_faculty_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match required_str(&req.params, "name") {
        Ok(v) => v,
        Err(d) => return err(&req.id, "bad_params", "missing name", Some(d)),
    };

    let faculty_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO faculty(id, name, active) VALUES(?, ?, 1)",
        (&faculty_id, &name),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "faculty" })),
        );
    }
    ok(&req.id, json!({ "facultyId": faculty_id, "name": name }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let batch_id = match required_str(&req.params, "batchId") {
        Ok(v) => v,
        Err(d) => return err(&req.id, "bad_params", "missing batchId", Some(d)),
    };
    let name = match required_str(&req.params, "name") {
        Ok(v) => v,
        Err(d) => return err(&req.id, "bad_params", "missing name", Some(d)),
    };
    let roll_no = req
        .params
        .get("rollNo")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM batches WHERE id = ?", [&batch_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(
            &req.id,
            "not_found",
            "batch not found",
            Some(json!({ "kind": "batch", "id": batch_id })),
        );
    }

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, batch_id, name, roll_no, active) VALUES(?, ?, ?, ?, 1)",
        (&student_id, &batch_id, &name, &roll_no),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }
    ok(&req.id, json!({ "studentId": student_id, "name": name }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let batch_id = match required_str(&req.params, "batchId") {
        Ok(v) => v,
        Err(d) => return err(&req.id, "bad_params", "missing batchId", Some(d)),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, name, roll_no, active FROM students WHERE batch_id = ? ORDER BY name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&batch_id], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "rollNo": row.get::<_, Option<String>>(2)?,
                "active": row.get::<_, i64>(3)? != 0
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "departments.create" => Some(handle_departments_create(state, req)),
        "batches.create" => Some(handle_batches_create(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "faculty.create" => Some(handle_faculty_create(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        _ => None,
    }
}
