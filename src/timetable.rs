use crate::error::EngineError;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub batch_id: String,
    pub semester: i64,
    pub weekday: u8,
    pub period_id: String,
    pub subject_id: String,
    pub faculty_id: String,
}

/// One grid row for rendering: the entry plus its period's bounds. The
/// period columns are optional because a forced period redefinition can
/// leave an entry pointing at a deleted period.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridEntry {
    #[serde(flatten)]
    pub entry: Entry,
    pub period_label: Option<String>,
    pub period_start: Option<String>,
    pub period_end: Option<String>,
}

pub struct UpsertEntry {
    pub batch_id: String,
    pub semester: i64,
    pub weekday: u8,
    pub period_id: String,
    pub subject_id: String,
    pub faculty_id: String,
    pub entry_id: Option<String>,
}

fn batch_exists(conn: &Connection, batch_id: &str) -> Result<bool, EngineError> {
    let found = conn
        .query_row("SELECT 1 FROM batches WHERE id = ?", [batch_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?;
    Ok(found.is_some())
}

/// All referential checks run before any write: the period must belong to
/// the batch, the subject must exist, the faculty member must exist and be
/// active.
fn check_references(conn: &Connection, req: &UpsertEntry) -> Result<(), EngineError> {
    if !batch_exists(conn, &req.batch_id)? {
        return Err(EngineError::not_found("batch", req.batch_id.as_str()));
    }
    let period_ok = conn
        .query_row(
            "SELECT 1 FROM periods WHERE id = ? AND batch_id = ?",
            (&req.period_id, &req.batch_id),
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if !period_ok {
        return Err(EngineError::not_found("period", req.period_id.as_str()));
    }
    let subject_ok = conn
        .query_row("SELECT 1 FROM subjects WHERE id = ?", [&req.subject_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some();
    if !subject_ok {
        return Err(EngineError::not_found("subject", req.subject_id.as_str()));
    }
    let faculty_ok = conn
        .query_row(
            "SELECT 1 FROM faculty WHERE id = ? AND active = 1",
            [&req.faculty_id],
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if !faculty_ok {
        return Err(EngineError::not_found("faculty", req.faculty_id.as_str()));
    }
    Ok(())
}

pub fn upsert_entry(conn: &Connection, req: UpsertEntry) -> Result<Entry, EngineError> {
    if req.semester < 1 {
        return Err(EngineError::Validation(format!(
            "semester must be >= 1, got {}",
            req.semester
        )));
    }

    match &req.entry_id {
        None => {
            check_references(conn, &req)?;
            let booked: Option<String> = conn
                .query_row(
                    "SELECT id FROM timetable_entries
                     WHERE batch_id = ? AND weekday = ? AND period_id = ? AND semester = ?",
                    (&req.batch_id, req.weekday, &req.period_id, req.semester),
                    |r| r.get(0),
                )
                .optional()?;
            if let Some(existing) = booked {
                return Err(EngineError::Conflict {
                    reason: "SlotAlreadyBooked",
                    details: Some(json!({ "entryId": existing })),
                });
            }
            let id = Uuid::new_v4().to_string();
            // The UNIQUE(batch_id, weekday, period_id, semester) index backs
            // this insert if two callers race past the check above.
            conn.execute(
                "INSERT INTO timetable_entries(
                    id, batch_id, semester, weekday, period_id, subject_id, faculty_id)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    &req.batch_id,
                    req.semester,
                    req.weekday,
                    &req.period_id,
                    &req.subject_id,
                    &req.faculty_id,
                ),
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(f, _)
                    if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    EngineError::conflict("SlotAlreadyBooked")
                }
                other => EngineError::Store(other),
            })?;
            Ok(Entry {
                id,
                batch_id: req.batch_id,
                semester: req.semester,
                weekday: req.weekday,
                period_id: req.period_id,
                subject_id: req.subject_id,
                faculty_id: req.faculty_id,
            })
        }
        Some(entry_id) => {
            let stored: Option<(String, i64, u8, String)> = conn
                .query_row(
                    "SELECT batch_id, semester, weekday, period_id
                     FROM timetable_entries WHERE id = ?",
                    [entry_id],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
                )
                .optional()?;
            let Some((batch_id, semester, weekday, period_id)) = stored else {
                return Err(EngineError::not_found("entry", entry_id.as_str()));
            };
            // The slot identity is immutable once booked; relocating a class
            // is delete-and-recreate.
            if batch_id != req.batch_id
                || semester != req.semester
                || weekday != req.weekday
                || period_id != req.period_id
            {
                return Err(EngineError::Validation(
                    "slot identity cannot change; delete the entry and recreate it".to_string(),
                ));
            }
            check_references(conn, &req)?;
            conn.execute(
                "UPDATE timetable_entries SET subject_id = ?, faculty_id = ? WHERE id = ?",
                (&req.subject_id, &req.faculty_id, entry_id),
            )?;
            Ok(Entry {
                id: entry_id.clone(),
                batch_id,
                semester,
                weekday,
                period_id,
                subject_id: req.subject_id,
                faculty_id: req.faculty_id,
            })
        }
    }
}

/// Sessions and records already taken under the entry are kept as history.
pub fn delete_entry(conn: &Connection, entry_id: &str) -> Result<(), EngineError> {
    let removed = conn.execute("DELETE FROM timetable_entries WHERE id = ?", [entry_id])?;
    if removed == 0 {
        return Err(EngineError::not_found("entry", entry_id));
    }
    Ok(())
}

/// Grid order: weekday, then the period's start time. Entries whose period
/// was force-replaced have no start time and sort last within their day.
pub fn list_entries(
    conn: &Connection,
    batch_id: &str,
    semester: i64,
) -> Result<Vec<GridEntry>, EngineError> {
    if !batch_exists(conn, batch_id)? {
        return Err(EngineError::not_found("batch", batch_id));
    }
    let mut stmt = conn.prepare(
        "SELECT e.id, e.batch_id, e.semester, e.weekday, e.period_id,
                e.subject_id, e.faculty_id, p.label, p.start_time, p.end_time
         FROM timetable_entries e
         LEFT JOIN periods p ON p.id = e.period_id
         WHERE e.batch_id = ? AND e.semester = ?
         ORDER BY e.weekday, p.start_time IS NULL, p.start_time",
    )?;
    let rows = stmt
        .query_map((batch_id, semester), |r| {
            Ok(GridEntry {
                entry: Entry {
                    id: r.get(0)?,
                    batch_id: r.get(1)?,
                    semester: r.get(2)?,
                    weekday: r.get(3)?,
                    period_id: r.get(4)?,
                    subject_id: r.get(5)?,
                    faculty_id: r.get(6)?,
                },
                period_label: r.get(7)?,
                period_start: r.get(8)?,
                period_end: r.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::periods;
    use crate::schedule::{parse_time, PeriodSpan};

    fn span(start: &str, end: &str, label: &str) -> PeriodSpan {
        PeriodSpan {
            start: parse_time(start).expect("start"),
            end: parse_time(end).expect("end"),
            label: label.to_string(),
        }
    }

    fn test_conn() -> (Connection, Vec<periods::Period>) {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::init_schema(&conn).expect("schema");
        conn.execute(
            "INSERT INTO departments(id, code, name) VALUES('d1', 'CSE', 'Computer Science')",
            [],
        )
        .expect("seed department");
        conn.execute(
            "INSERT INTO batches(id, department_id, code, semester_no)
             VALUES('b1', 'd1', 'CSE-2026', 3)",
            [],
        )
        .expect("seed batch");
        conn.execute(
            "INSERT INTO subjects(id, code, name) VALUES('s1', 'MA101', 'Maths')",
            [],
        )
        .expect("seed subject");
        conn.execute(
            "INSERT INTO subjects(id, code, name) VALUES('s2', 'PH101', 'Physics')",
            [],
        )
        .expect("seed subject 2");
        conn.execute("INSERT INTO faculty(id, name, active) VALUES('f1', 'A. Rao', 1)", [])
            .expect("seed faculty");
        conn.execute("INSERT INTO faculty(id, name, active) VALUES('f2', 'B. Sen', 1)", [])
            .expect("seed faculty 2");
        let defined = periods::define_periods(
            &conn,
            "b1",
            vec![span("09:00", "10:00", "P1"), span("10:00", "11:00", "P2")],
            false,
        )
        .expect("define periods");
        (conn, defined)
    }

    fn create_req(period_id: &str, subject_id: &str, faculty_id: &str) -> UpsertEntry {
        UpsertEntry {
            batch_id: "b1".to_string(),
            semester: 3,
            weekday: 1,
            period_id: period_id.to_string(),
            subject_id: subject_id.to_string(),
            faculty_id: faculty_id.to_string(),
            entry_id: None,
        }
    }

    #[test]
    fn double_booking_a_slot_is_a_conflict() {
        let (conn, ps) = test_conn();
        upsert_entry(&conn, create_req(&ps[0].id, "s1", "f1")).expect("first booking");

        let err = upsert_entry(&conn, create_req(&ps[0].id, "s2", "f2"))
            .expect_err("same slot again");
        assert_eq!(err.code(), "conflict");
        assert_eq!(err.details().expect("details")["reason"], "SlotAlreadyBooked");
    }

    #[test]
    fn update_changes_subject_and_faculty_only() {
        let (conn, ps) = test_conn();
        let created = upsert_entry(&conn, create_req(&ps[0].id, "s1", "f1")).expect("create");

        let mut update = create_req(&ps[0].id, "s2", "f2");
        update.entry_id = Some(created.id.clone());
        let updated = upsert_entry(&conn, update).expect("update");
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.subject_id, "s2");
        assert_eq!(updated.faculty_id, "f2");

        // Attempting to move the slot through an update is rejected.
        let mut relocate = create_req(&ps[1].id, "s2", "f2");
        relocate.entry_id = Some(created.id);
        let err = upsert_entry(&conn, relocate).expect_err("slot move");
        assert_eq!(err.code(), "validation");
    }

    #[test]
    fn references_are_checked_before_booking() {
        let (conn, ps) = test_conn();
        let err =
            upsert_entry(&conn, create_req(&ps[0].id, "missing", "f1")).expect_err("bad subject");
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.details().expect("details")["kind"], "subject");

        let err = upsert_entry(&conn, create_req("no-such-period", "s1", "f1"))
            .expect_err("period from another batch");
        assert_eq!(err.code(), "not_found");

        conn.execute("UPDATE faculty SET active = 0 WHERE id = 'f1'", [])
            .expect("deactivate");
        let err =
            upsert_entry(&conn, create_req(&ps[0].id, "s1", "f1")).expect_err("inactive faculty");
        assert_eq!(err.details().expect("details")["kind"], "faculty");
    }

    #[test]
    fn list_orders_by_weekday_then_period_start() {
        let (conn, ps) = test_conn();
        let mut tue_late = create_req(&ps[1].id, "s1", "f1");
        tue_late.weekday = 2;
        let mut tue_early = create_req(&ps[0].id, "s2", "f2");
        tue_early.weekday = 2;
        let mon = create_req(&ps[1].id, "s1", "f1");

        upsert_entry(&conn, tue_late).expect("tue late");
        upsert_entry(&conn, tue_early).expect("tue early");
        upsert_entry(&conn, mon).expect("mon");

        let grid = list_entries(&conn, "b1", 3).expect("list");
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0].entry.weekday, 1);
        assert_eq!(grid[1].entry.weekday, 2);
        assert_eq!(grid[1].period_label.as_deref(), Some("P1"));
        assert_eq!(grid[2].period_label.as_deref(), Some("P2"));
    }

    #[test]
    fn orphaned_entries_survive_and_sort_last() {
        let (conn, ps) = test_conn();
        upsert_entry(&conn, create_req(&ps[0].id, "s1", "f1")).expect("book");

        periods::define_periods(&conn, "b1", vec![span("08:00", "09:00", "P0")], true)
            .expect("forced redefine");
        let new_ps = periods::list_periods(&conn, "b1").expect("list periods");
        let mut fresh = create_req(&new_ps[0].id, "s2", "f2");
        fresh.weekday = 1;
        upsert_entry(&conn, fresh).expect("book against new period");

        let grid = list_entries(&conn, "b1", 3).expect("list");
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[0].period_label.as_deref(), Some("P0"));
        assert!(grid[1].period_label.is_none());
    }

    #[test]
    fn delete_requires_existing_entry() {
        let (conn, ps) = test_conn();
        let created = upsert_entry(&conn, create_req(&ps[0].id, "s1", "f1")).expect("create");
        delete_entry(&conn, &created.id).expect("delete");
        let err = delete_entry(&conn, &created.id).expect_err("already gone");
        assert_eq!(err.code(), "not_found");
    }
}
