use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "userrole", rename_all = "lowercase")]
pub(crate) enum UserRole {
    Admin,
    Teacher,
    Student,
}

/// Persisted lifecycle of a homework submission, stored as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub(crate) enum SubmissionStatus {
    Initialized = 0,
    Grading = 1,
    Completed = 2,
    Modified = 3,
    Failed = 7,
}

impl SubmissionStatus {
    pub(crate) fn code(self) -> i32 {
        self as i32
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "INITIALIZED",
            Self::Grading => "GRADING",
            Self::Completed => "COMPLETED",
            Self::Modified => "MODIFIED",
            Self::Failed => "FAILED",
        }
    }

    pub(crate) fn has_result(self) -> bool {
        matches!(self, Self::Completed | Self::Modified)
    }
}

/// What a student sees for a homework: either a stored status or the virtual
/// "not submitted yet" state, which is never written to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmissionProgress {
    NotSubmitted,
    Stored(SubmissionStatus),
}

impl SubmissionProgress {
    pub(crate) const NOT_SUBMITTED_CODE: i32 = -1;

    pub(crate) fn code(self) -> i32 {
        match self {
            Self::NotSubmitted => Self::NOT_SUBMITTED_CODE,
            Self::Stored(status) => status.code(),
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::NotSubmitted => "NOT_SUBMITTED",
            Self::Stored(status) => status.as_str(),
        }
    }
}

impl From<Option<SubmissionStatus>> for SubmissionProgress {
    fn from(value: Option<SubmissionStatus>) -> Self {
        value.map_or(Self::NotSubmitted, Self::Stored)
    }
}
