use crate::error::EngineError;
use chrono::NaiveTime;

/// One candidate period interval, half-open `[start, end)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodSpan {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub label: String,
}

pub fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

/// Validates a batch's candidate period list independently of the store:
/// non-empty, every interval well-formed, and pairwise disjoint once sorted
/// by start (back-to-back `end_i == start_{i+1}` is allowed).
///
/// Returns the spans sorted by start time.
pub fn validate_spans(mut spans: Vec<PeriodSpan>) -> Result<Vec<PeriodSpan>, EngineError> {
    if spans.is_empty() {
        return Err(EngineError::Validation(
            "period list must not be empty".to_string(),
        ));
    }
    for s in &spans {
        if s.start >= s.end {
            return Err(EngineError::Validation(format!(
                "period {} must start before it ends",
                s.label
            )));
        }
    }
    spans.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end)));
    for pair in spans.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(EngineError::Overlap {
                first: pair[0].label.clone(),
                second: pair[1].label.clone(),
            });
        }
    }
    Ok(spans)
}

/// Accepts 1..=7 (Monday = 1) the way the grid stores weekdays.
pub fn validate_weekday(n: i64) -> Result<u8, EngineError> {
    if (1..=7).contains(&n) {
        Ok(n as u8)
    } else {
        Err(EngineError::Validation(format!(
            "weekday must be 1..=7 (Monday=1), got {}",
            n
        )))
    }
}

pub fn weekday_from_name(name: &str) -> Option<u8> {
    match name.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(1),
        "tuesday" | "tue" => Some(2),
        "wednesday" | "wed" => Some(3),
        "thursday" | "thu" => Some(4),
        "friday" | "fri" => Some(5),
        "saturday" | "sat" => Some(6),
        "sunday" | "sun" => Some(7),
        _ => None,
    }
}
