use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map of a document snapshot, as delivered by the trigger layer.
pub type DocumentFields = Map<String, Value>;

/// Status of a job application as written by the employer side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
    Shortlisted,
    Other(String),
}

impl ApplicationStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pending" => ApplicationStatus::Pending,
            "accepted" => ApplicationStatus::Accepted,
            "rejected" => ApplicationStatus::Rejected,
            "shortlisted" => ApplicationStatus::Shortlisted,
            other => ApplicationStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Shortlisted => "shortlisted",
            ApplicationStatus::Other(s) => s,
        }
    }

    /// Only decisions made by the employer are pushed to the applicant.
    pub fn is_notifiable(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Accepted
                | ApplicationStatus::Rejected
                | ApplicationStatus::Shortlisted
        )
    }
}

/// Snapshot of an application document (`jobs/{jobId}/applications/{id}` or
/// `Users/{userId}/appliedjobs/{jobId}`).
///
/// The document is schemaless on the store side, so the raw fields are kept and
/// read through typed accessors. Empty strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationRecord {
    fields: DocumentFields,
}

impl ApplicationRecord {
    pub fn new(fields: DocumentFields) -> Self {
        Self { fields }
    }

    /// Raw `status` value, used for before/after comparison.
    pub fn raw_status(&self) -> Option<&Value> {
        self.fields.get("status")
    }

    pub fn status(&self) -> Option<ApplicationStatus> {
        self.raw_status()
            .and_then(Value::as_str)
            .map(ApplicationStatus::parse)
    }

    /// Non-empty string value of an arbitrary field.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Display title of the job, `title` first then `jobTitle`.
    pub fn job_title(&self) -> Option<&str> {
        self.text("title").or_else(|| self.text("jobTitle"))
    }

    pub fn company_name(&self) -> Option<&str> {
        self.text("companyName")
    }

    pub fn job_id(&self) -> Option<&str> {
        self.text("jobId")
    }
}

impl From<Value> for ApplicationRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self::new(fields),
            _ => Self::default(),
        }
    }
}
