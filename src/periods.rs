use crate::error::EngineError;
use crate::schedule::{self, PeriodSpan};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub id: String,
    pub batch_id: String,
    pub start: String,
    pub end: String,
    pub label: String,
}

fn batch_exists(conn: &Connection, batch_id: &str) -> Result<bool, EngineError> {
    let found = conn
        .query_row("SELECT 1 FROM batches WHERE id = ?", [batch_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?;
    Ok(found.is_some())
}

/// Replaces the batch's whole period set in one transaction. Validation and
/// the in-use check run before any mutation; a rejected call leaves the
/// previously stored periods untouched.
///
/// Redefining periods would orphan timetable entries that reference the old
/// period ids, so the replace is rejected with `PeriodsInUse` unless the
/// caller passes `force`.
pub fn define_periods(
    conn: &Connection,
    batch_id: &str,
    spans: Vec<PeriodSpan>,
    force: bool,
) -> Result<Vec<Period>, EngineError> {
    let spans = schedule::validate_spans(spans)?;

    if !batch_exists(conn, batch_id)? {
        return Err(EngineError::not_found("batch", batch_id));
    }

    let mut stmt = conn.prepare(
        "SELECT id FROM timetable_entries
         WHERE batch_id = ?
           AND period_id IN (SELECT id FROM periods WHERE batch_id = ?)
         ORDER BY id",
    )?;
    let live_entry_ids = stmt
        .query_map([batch_id, batch_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    if !live_entry_ids.is_empty() && !force {
        return Err(EngineError::Conflict {
            reason: "PeriodsInUse",
            details: Some(json!({ "entryIds": live_entry_ids })),
        });
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM periods WHERE batch_id = ?", [batch_id])?;
    let mut out = Vec::with_capacity(spans.len());
    for s in spans {
        let id = Uuid::new_v4().to_string();
        let start = s.start.format("%H:%M").to_string();
        let end = s.end.format("%H:%M").to_string();
        tx.execute(
            "INSERT INTO periods(id, batch_id, start_time, end_time, label)
             VALUES(?, ?, ?, ?, ?)",
            (&id, batch_id, &start, &end, &s.label),
        )?;
        out.push(Period {
            id,
            batch_id: batch_id.to_string(),
            start,
            end,
            label: s.label,
        });
    }
    tx.commit()?;
    Ok(out)
}

pub fn list_periods(conn: &Connection, batch_id: &str) -> Result<Vec<Period>, EngineError> {
    if !batch_exists(conn, batch_id)? {
        return Err(EngineError::not_found("batch", batch_id));
    }
    let mut stmt = conn.prepare(
        "SELECT id, batch_id, start_time, end_time, label
         FROM periods
         WHERE batch_id = ?
         ORDER BY start_time",
    )?;
    let rows = stmt
        .query_map([batch_id], |r| {
            Ok(Period {
                id: r.get(0)?,
                batch_id: r.get(1)?,
                start: r.get(2)?,
                end: r.get(3)?,
                label: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
