use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A company a user is tracking applications against. Owned by exactly one
/// user, set at creation and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
    pub user_id: i64,
}

/// A job application progressing through the status lifecycle.
///
/// `applied_at` and `user_id` are assigned at creation and immutable; the
/// only mutable field is `status`, constrained by [`crate::lifecycle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobApplication {
    pub id: i64,
    pub title: String,
    pub status: JobStatus,
    pub applied_at: DateTime<Utc>,
    pub company_id: i64,
    pub user_id: i64,
}

/// Closed set of job application statuses persisted in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Applied,
    Interview,
    Offer,
    Rejected,
}

impl JobStatus {
    /// Returns the canonical database representation for the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Interview => "interview",
            Self::Offer => "offer",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "applied" => Ok(Self::Applied),
            "interview" => Ok(Self::Interview),
            "offer" => Ok(Self::Offer),
            "rejected" => Ok(Self::Rejected),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Raised when a string does not name a member of the status set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);

/// Sort direction for job listings, keyed on the applied timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// Resolves a query parameter value. Anything but `"asc"` falls back
    /// to descending, including absence.
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("asc") => Self::Asc,
            _ => Self::Desc,
        }
    }

    /// SQL keyword used when composing ORDER BY clauses.
    pub fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}
