use crate::error::HttpError;
use crate::response::HttpResponse;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a server-side task.
///
/// `Enqueued -> Processing -> {Succeeded, Failed, Canceled}`; a task may
/// also go from `Enqueued` straight to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Enqueued,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskStatus {
    /// Wire token (lower-case).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Enqueued => "enqueued",
            TaskStatus::Processing => "processing",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        }
    }

    /// `Succeeded`, `Failed` and `Canceled` are terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Canceled
        )
    }

    /// Position in the lifecycle; transitions never decrease it.
    pub(crate) fn rank(self) -> u8 {
        match self {
            TaskStatus::Enqueued => 0,
            TaskStatus::Processing => 1,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Canceled => 2,
        }
    }
}

impl FromStr for TaskStatus {
    type Err = HttpError;

    /// Parses a status token, ignoring ASCII case. Anything else is an error.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let status = match token.to_ascii_lowercase().as_str() {
            "enqueued" => TaskStatus::Enqueued,
            "processing" => TaskStatus::Processing,
            "succeeded" => TaskStatus::Succeeded,
            "failed" => TaskStatus::Failed,
            "canceled" => TaskStatus::Canceled,
            _ => return Err(HttpError::UnknownTaskStatus(token.to_owned())),
        };
        Ok(status)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-assigned task identifier.
///
/// The service reports ids as JSON numbers; strings are accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(String);

impl TaskId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.parse::<u64>() {
            Ok(n) => serializer.serialize_u64(n),
            Err(_) => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum WireId {
            Number(u64),
            Text(String),
        }

        Ok(match WireId::deserialize(deserializer)? {
            WireId::Number(n) => TaskId::from(n),
            WireId::Text(s) => TaskId(s),
        })
    }
}

/// Summary returned by a mutating call that enqueued a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    pub task_uid: TaskId,
    pub index_uid: Option<String>,
    pub status: TaskStatus,
    pub kind: Option<String>,
    pub enqueued_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTaskSummary {
    #[serde(alias = "uid")]
    task_uid: TaskId,
    #[serde(default)]
    index_uid: Option<String>,
    status: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    enqueued_at: Option<String>,
}

impl TaskHandle {
    /// Parse the accepted-task summary from a mutating call's response.
    ///
    /// # Errors
    /// Returns `HttpStatus` for non-2xx responses, `Json` for malformed
    /// bodies and `UnknownTaskStatus` for unrecognised status tokens.
    pub fn from_response(response: &HttpResponse) -> Result<Self, HttpError> {
        let wire: WireTaskSummary = response.json()?;
        Ok(Self {
            task_uid: wire.task_uid,
            index_uid: wire.index_uid,
            status: wire.status.parse()?,
            kind: wire.kind,
            enqueued_at: wire.enqueued_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> &TaskId {
        &self.task_uid
    }
}

/// Failure detail of a `Failed` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub message: String,
    pub code: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub link: Option<String>,
}

/// Full task state as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub uid: TaskId,
    pub index_uid: Option<String>,
    pub status: TaskStatus,
    pub kind: Option<String>,
    /// Operation-specific result payload
    pub details: Option<serde_json::Value>,
    pub error: Option<TaskError>,
    /// ISO-8601 processing duration
    pub duration: Option<String>,
    pub enqueued_at: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTaskRecord {
    #[serde(alias = "taskUid")]
    uid: TaskId,
    #[serde(default)]
    index_uid: Option<String>,
    status: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    details: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<TaskError>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    enqueued_at: Option<String>,
    #[serde(default)]
    started_at: Option<String>,
    #[serde(default)]
    finished_at: Option<String>,
}

impl TaskRecord {
    /// Decode a task object.
    ///
    /// # Errors
    /// Returns `Json` for malformed bodies and `UnknownTaskStatus` for
    /// unrecognised status tokens.
    pub fn from_slice(body: &[u8]) -> Result<Self, HttpError> {
        let wire: WireTaskRecord = serde_json::from_slice(body)?;
        Ok(Self {
            uid: wire.uid,
            index_uid: wire.index_uid,
            status: wire.status.parse()?,
            kind: wire.kind,
            details: wire.details,
            error: wire.error,
            duration: wire.duration,
            enqueued_at: wire.enqueued_at,
            started_at: wire.started_at,
            finished_at: wire.finished_at,
        })
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::context::CallContext;
    use bytes::Bytes;
    use http::{HeaderMap, StatusCode};

    #[test]
    fn test_status_tokens() {
        for status in [
            TaskStatus::Enqueued,
            TaskStatus::Processing,
            TaskStatus::Succeeded,
            TaskStatus::Failed,
            TaskStatus::Canceled,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert_eq!("SUCCEEDED".parse::<TaskStatus>().unwrap(), TaskStatus::Succeeded);
    }

    #[test]
    fn test_unknown_status_is_error() {
        match "paused".parse::<TaskStatus>() {
            Err(HttpError::UnknownTaskStatus(token)) => assert_eq!(token, "paused"),
            other => panic!("expected UnknownTaskStatus, got {other:?}"),
        }
    }

    #[test]
    fn test_terminal_and_rank() {
        assert!(!TaskStatus::Enqueued.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Enqueued.rank() < TaskStatus::Processing.rank());
        assert!(TaskStatus::Processing.rank() < TaskStatus::Canceled.rank());
    }

    #[test]
    fn test_task_id_from_number_or_string() {
        let n: TaskId = serde_json::from_str("42").unwrap();
        let s: TaskId = serde_json::from_str(r#""42""#).unwrap();
        assert_eq!(n, s);
        assert_eq!(n.to_string(), "42");
        assert_eq!(serde_json::to_string(&n).unwrap(), "42");
        assert_eq!(serde_json::to_string(&TaskId::new("abc")).unwrap(), r#""abc""#);
    }

    #[test]
    fn test_record_decodes_failed_task() {
        let body = br#"{
            "uid": 7,
            "indexUid": "movies",
            "status": "failed",
            "type": "documentAdditionOrUpdate",
            "details": { "receivedDocuments": 1, "indexedDocuments": 0 },
            "error": {
                "message": "Document doesn't have a `id` attribute",
                "code": "missing_document_id",
                "type": "invalid_request",
                "link": "https://docs.example.com/errors#missing_document_id"
            },
            "duration": "PT0.001S",
            "enqueuedAt": "2024-05-01T10:00:00Z",
            "startedAt": "2024-05-01T10:00:00.5Z",
            "finishedAt": "2024-05-01T10:00:01Z"
        }"#;

        let record = TaskRecord::from_slice(body).unwrap();
        assert_eq!(record.uid, TaskId::from(7_u64));
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.is_terminal());
        assert!(!record.is_success());
        assert_eq!(record.error.unwrap().code, "missing_document_id");
        assert_eq!(record.details.unwrap()["receivedDocuments"], 1);
    }

    #[test]
    fn test_record_minimal_fields() {
        let record = TaskRecord::from_slice(br#"{"taskUid": 3, "status": "enqueued"}"#).unwrap();
        assert_eq!(record.uid.as_str(), "3");
        assert_eq!(record.status, TaskStatus::Enqueued);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_record_unknown_status() {
        let err = TaskRecord::from_slice(br#"{"uid": 3, "status": "archived"}"#).unwrap_err();
        assert!(matches!(err, HttpError::UnknownTaskStatus(ref s) if s == "archived"));
    }

    #[test]
    fn test_handle_from_accepted_response() {
        let resp = HttpResponse::new(
            StatusCode::ACCEPTED,
            HeaderMap::new(),
            Bytes::from_static(
                br#"{"taskUid":12,"indexUid":"movies","status":"enqueued","type":"indexCreation","enqueuedAt":"2024-05-01T10:00:00Z"}"#,
            ),
            CallContext::new(),
        );
        let handle = TaskHandle::from_response(&resp).unwrap();
        assert_eq!(handle.id(), &TaskId::from(12_u64));
        assert_eq!(handle.index_uid.as_deref(), Some("movies"));
        assert_eq!(handle.status, TaskStatus::Enqueued);
        assert_eq!(handle.kind.as_deref(), Some("indexCreation"));
    }
}
