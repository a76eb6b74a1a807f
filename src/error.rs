use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::model::GradeRecord;

/// Points at the input record that failed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRef {
    pub index: usize,
    pub student_id: String,
    pub subject_id: String,
}

impl RecordRef {
    pub fn of(index: usize, record: &GradeRecord) -> Self {
        Self {
            index,
            student_id: record.student_id.clone(),
            subject_id: record.subject_id.clone(),
        }
    }
}

fn record_suffix(record: &Option<RecordRef>) -> String {
    match record {
        Some(r) => format!(
            " (record #{}, student {:?}, subject {:?})",
            r.index, r.student_id, r.subject_id
        ),
        None => String::new(),
    }
}

fn index_suffix(record: &Option<RecordRef>) -> String {
    match record {
        Some(r) => format!(" (record #{})", r.index),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReportError {
    #[error("{message}{}", record_suffix(.record))]
    Validation {
        message: String,
        record: Option<RecordRef>,
    },
    #[error(
        "subject {subject_id:?} has coefficient {found} but an earlier record carried {expected}{}",
        index_suffix(.record)
    )]
    InconsistentSubjectCoefficient {
        subject_id: String,
        expected: f64,
        found: f64,
        record: Option<RecordRef>,
    },
}

/// Wire shape of an error, mirrors `{ code, message, details }`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ReportError {
    pub fn validation(message: impl Into<String>) -> Self {
        ReportError::Validation {
            message: message.into(),
            record: None,
        }
    }

    pub fn invalid_record(index: usize, record: &GradeRecord, message: impl Into<String>) -> Self {
        ReportError::Validation {
            message: message.into(),
            record: Some(RecordRef::of(index, record)),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ReportError::Validation { .. } => "validation_error",
            ReportError::InconsistentSubjectCoefficient { .. } => {
                "inconsistent_subject_coefficient"
            }
        }
    }

    pub fn record(&self) -> Option<&RecordRef> {
        match self {
            ReportError::Validation { record, .. } => record.as_ref(),
            ReportError::InconsistentSubjectCoefficient { record, .. } => record.as_ref(),
        }
    }

    pub fn payload(&self) -> ErrorPayload {
        let details = match self {
            ReportError::Validation { record, .. } => {
                record.as_ref().map(|r| json!({ "record": r }))
            }
            ReportError::InconsistentSubjectCoefficient {
                subject_id,
                expected,
                found,
                record,
            } => {
                let mut d = json!({
                    "subjectId": subject_id,
                    "expected": expected,
                    "found": found,
                });
                if let Some(r) = record {
                    d["record"] = json!(r);
                }
                Some(d)
            }
        };
        ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
            details,
        }
    }
}
