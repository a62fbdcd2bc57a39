use crate::error::EngineError;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

/// Attendance percentage rounded to two decimals. A student with no records
/// is `0`, never NaN — dashboards render this field directly.
pub fn percentage(part: i64, total: i64) -> f64 {
    if total <= 0 {
        0.0
    } else {
        (10_000.0 * part as f64 / total as f64).round() / 100.0
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    pub total: i64,
    pub present: i64,
    pub absent: i64,
    pub leave: i64,
    pub percentage: f64,
    pub today_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortRow {
    pub group: String,
    pub present: i64,
    pub absent: i64,
    pub leave: i64,
}

#[derive(Debug, Clone, Default)]
pub struct CohortFilter {
    pub department_id: Option<String>,
    pub batch_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Department,
    Batch,
}

fn status_counts(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<(i64, i64, i64, i64), EngineError> {
    let row = conn.query_row(sql, params, |r| {
        Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
    })?;
    Ok(row)
}

pub fn student_stats(
    conn: &Connection,
    student_id: &str,
    as_of: NaiveDate,
) -> Result<StudentStats, EngineError> {
    let exists = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some();
    if !exists {
        return Err(EngineError::not_found("student", student_id));
    }

    let (total, present, absent, leave) = status_counts(
        conn,
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'present' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'absent' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'leave' THEN 1 ELSE 0 END), 0)
         FROM attendance_records
         WHERE student_id = ?",
        [student_id],
    )?;

    let as_of_s = as_of.format("%Y-%m-%d").to_string();
    let (today_total, today_present, _, _) = status_counts(
        conn,
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN ar.status = 'present' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN ar.status = 'absent' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN ar.status = 'leave' THEN 1 ELSE 0 END), 0)
         FROM attendance_records ar
         JOIN class_sessions cs ON cs.id = ar.session_id
         WHERE ar.student_id = ? AND cs.date = ?",
        (student_id, &as_of_s),
    )?;

    Ok(StudentStats {
        total,
        present,
        absent,
        leave,
        percentage: percentage(present, total),
        today_percentage: percentage(today_present, today_total),
    })
}

/// Present/Absent/Leave counts per cohort. Every group in the filter's scope
/// gets a row, zero-valued when nothing was recorded, so chart consumers see
/// a complete series regardless of data sparsity.
pub fn cohort_stats(
    conn: &Connection,
    filter: &CohortFilter,
    group_by: GroupBy,
) -> Result<Vec<CohortRow>, EngineError> {
    if let Some(dep) = &filter.department_id {
        let ok = conn
            .query_row("SELECT 1 FROM departments WHERE id = ?", [dep], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?
            .is_some();
        if !ok {
            return Err(EngineError::not_found("department", dep.as_str()));
        }
    }
    if let Some(batch) = &filter.batch_id {
        let ok = conn
            .query_row("SELECT 1 FROM batches WHERE id = ?", [batch], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?
            .is_some();
        if !ok {
            return Err(EngineError::not_found("batch", batch.as_str()));
        }
    }

    let sql = match group_by {
        GroupBy::Batch => {
            "SELECT b.code,
                    COALESCE(SUM(CASE WHEN ar.status = 'present' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN ar.status = 'absent' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN ar.status = 'leave' THEN 1 ELSE 0 END), 0)
             FROM batches b
             LEFT JOIN students s ON s.batch_id = b.id
             LEFT JOIN attendance_records ar ON ar.student_id = s.id
             WHERE (?1 IS NULL OR b.department_id = ?1)
               AND (?2 IS NULL OR b.id = ?2)
             GROUP BY b.id, b.code
             ORDER BY b.code"
        }
        GroupBy::Department => {
            "SELECT d.code,
                    COALESCE(SUM(CASE WHEN ar.status = 'present' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN ar.status = 'absent' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN ar.status = 'leave' THEN 1 ELSE 0 END), 0)
             FROM departments d
             LEFT JOIN batches b ON b.department_id = d.id
             LEFT JOIN students s ON s.batch_id = b.id
             LEFT JOIN attendance_records ar ON ar.student_id = s.id
             WHERE (?1 IS NULL OR d.id = ?1)
               AND (?2 IS NULL OR b.id = ?2)
             GROUP BY d.id, d.code
             ORDER BY d.code"
        }
    };

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map((&filter.department_id, &filter.batch_id), |r| {
            Ok(CohortRow {
                group: r.get(0)?,
                present: r.get(1)?,
                absent: r.get(2)?,
                leave: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
