use serde::Serialize;
use serde_json::json;

/// Failure that crosses a component boundary. `code` is the stable value the
/// IPC layer reports; weight-resolution problems never become one of these.
#[derive(Debug, Clone, Serialize)]
pub struct VisError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl VisError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn duplicate_course(course_id: i64) -> Self {
        Self::new("duplicate_course", "course already collected in this request")
            .with_details(json!({ "courseId": course_id }))
    }

    pub fn course_not_found(course_id: i64) -> Self {
        Self::new("not_found", "course not found").with_details(json!({ "courseId": course_id }))
    }

    pub fn db(e: impl std::fmt::Display) -> Self {
        Self::new("db_query_failed", e.to_string())
    }
}

impl std::fmt::Display for VisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for VisError {}

impl From<rusqlite::Error> for VisError {
    fn from(e: rusqlite::Error) -> Self {
        VisError::db(e)
    }
}
