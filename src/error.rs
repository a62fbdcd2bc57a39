use serde_json::json;
use thiserror::Error;

/// Engine error taxonomy. Every variant maps to one stable machine code so
/// presentation layers react on `code` + `details` alone, never on message
/// text.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("periods {first} and {second} overlap")]
    Overlap { first: String, second: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{reason}")]
    Conflict {
        reason: &'static str,
        details: Option<serde_json::Value>,
    },

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn conflict(reason: &'static str) -> Self {
        EngineError::Conflict {
            reason,
            details: None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::Overlap { .. } => "overlap",
            EngineError::NotFound { .. } => "not_found",
            EngineError::Conflict { .. } => "conflict",
            EngineError::Store(_) => "store",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            EngineError::Validation(_) => None,
            EngineError::Overlap { first, second } => Some(json!({
                "first": first,
                "second": second
            })),
            EngineError::NotFound { kind, id } => Some(json!({
                "kind": kind,
                "id": id
            })),
            EngineError::Conflict { reason, details } => {
                let mut d = json!({ "reason": reason });
                if let Some(extra) = details {
                    d["context"] = extra.clone();
                }
                Some(d)
            }
            EngineError::Store(_) => None,
        }
    }
}
