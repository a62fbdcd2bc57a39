use crate::error::EngineError;
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Present,
    Absent,
    Leave,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Present => "present",
            Status::Absent => "absent",
            Status::Leave => "leave",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s.to_ascii_lowercase().as_str() {
            "present" => Ok(Status::Present),
            "absent" => Ok(Status::Absent),
            "leave" => Ok(Status::Leave),
            other => Err(EngineError::Validation(format!(
                "status must be one of: present, absent, leave (got {})",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionRef {
    pub id: String,
    pub entry_id: String,
    pub date: String,
}

#[derive(Debug, Clone)]
pub struct Mark {
    pub student_id: String,
    pub status: Status,
}

#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub session_id: String,
    pub recorded: usize,
    pub skipped: Vec<String>,
}

fn entry_exists(conn: &Connection, entry_id: &str) -> Result<bool, EngineError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM timetable_entries WHERE id = ?",
            [entry_id],
            |r| r.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Lazily materializes the dated occurrence of an entry. The insert is a
/// single conditional statement, so two concurrent callers opening the same
/// roster converge on one row; never check-then-insert.
pub fn get_or_create_session(
    conn: &Connection,
    entry_id: &str,
    date: NaiveDate,
) -> Result<SessionRef, EngineError> {
    if !entry_exists(conn, entry_id)? {
        return Err(EngineError::not_found("entry", entry_id));
    }
    let date_s = date.format("%Y-%m-%d").to_string();
    let candidate_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO class_sessions(id, entry_id, date)
         VALUES(?, ?, ?)
         ON CONFLICT(entry_id, date) DO NOTHING",
        (&candidate_id, entry_id, &date_s),
    )?;
    let id: String = conn.query_row(
        "SELECT id FROM class_sessions WHERE entry_id = ? AND date = ?",
        (entry_id, &date_s),
        |r| r.get(0),
    )?;
    Ok(SessionRef {
        id,
        entry_id: entry_id.to_string(),
        date: date_s,
    })
}

/// Takes attendance for one entry+date in a single transaction: the session
/// is created on first use, then each (session, student) status is upserted.
/// Re-marking overwrites; it never duplicates a row.
///
/// By default one unknown student aborts the whole call with nothing
/// written. `skip_invalid` instead records the valid marks and reports the
/// ids that were skipped.
pub fn record_attendance(
    conn: &Connection,
    entry_id: &str,
    date: NaiveDate,
    marks: &[Mark],
    skip_invalid: bool,
) -> Result<RecordOutcome, EngineError> {
    let tx = conn.unchecked_transaction()?;
    let session = get_or_create_session(&tx, entry_id, date)?;

    // Referential pass before any record is written.
    let mut skipped = Vec::new();
    for mark in marks {
        let exists = tx
            .query_row(
                "SELECT 1 FROM students WHERE id = ?",
                [&mark.student_id],
                |r| r.get::<_, i64>(0),
            )
            .optional()?
            .is_some();
        if !exists {
            if skip_invalid {
                skipped.push(mark.student_id.clone());
            } else {
                return Err(EngineError::not_found("student", mark.student_id.as_str()));
            }
        }
    }

    let marked_at = Utc::now().to_rfc3339();
    let mut recorded = 0usize;
    for mark in marks {
        if skipped.contains(&mark.student_id) {
            continue;
        }
        tx.execute(
            "INSERT INTO attendance_records(session_id, student_id, status, marked_at)
             VALUES(?, ?, ?, ?)
             ON CONFLICT(session_id, student_id) DO UPDATE SET
               status = excluded.status,
               marked_at = excluded.marked_at",
            (&session.id, &mark.student_id, mark.status.as_str(), &marked_at),
        )?;
        recorded += 1;
    }
    tx.commit()?;

    Ok(RecordOutcome {
        session_id: session.id,
        recorded,
        skipped,
    })
}

/// Explicit correction path: removes one student's record from a session.
pub fn delete_record(
    conn: &Connection,
    session_id: &str,
    student_id: &str,
) -> Result<(), EngineError> {
    let removed = conn.execute(
        "DELETE FROM attendance_records WHERE session_id = ? AND student_id = ?",
        (session_id, student_id),
    )?;
    if removed == 0 {
        return Err(EngineError::not_found("record", student_id));
    }
    Ok(())
}
