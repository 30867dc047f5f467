//! Job and progress event model.
//!
//! Progress statuses form a closed enumeration so terminal-state handling is
//! exhaustiveness-checked, and events serialise to the wire shape consumed by
//! delivery clients.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Status of a single progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    /// The transform is still running.
    InProgress,
    /// The job completed; the artifact is downloadable.
    Finished,
    /// The job failed; no artifact is available.
    Error,
}

impl ProgressStatus {
    /// Whether this status ends a job's event stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressStatus::Finished | ProgressStatus::Error)
    }
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressStatus::InProgress => write!(f, "in_progress"),
            ProgressStatus::Finished => write!(f, "finished"),
            ProgressStatus::Error => write!(f, "error"),
        }
    }
}

/// One progress event in a job's ordered stream.
///
/// A stream is zero or more `in_progress` events with non-decreasing percent,
/// then exactly one terminal event, then closure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Event status.
    pub status: ProgressStatus,
    /// Percent complete, 0-100.
    pub progress: u8,
    /// Download location, present only on `finished`.
    #[serde(rename = "downloadUrl", skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl ProgressEvent {
    /// An intermediate progress sample.
    pub fn in_progress(percent: u8) -> Self {
        Self {
            status: ProgressStatus::InProgress,
            progress: percent.min(100),
            download_url: None,
        }
    }

    /// The terminal success event, pointing at the artifact.
    pub fn finished(download_url: String) -> Self {
        Self {
            status: ProgressStatus::Finished,
            progress: 100,
            download_url: Some(download_url),
        }
    }

    /// The terminal failure event.
    pub fn error() -> Self {
        Self {
            status: ProgressStatus::Error,
            progress: 0,
            download_url: None,
        }
    }
}

/// A clip extraction request as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipRequest {
    /// URL of the source media.
    #[serde(rename = "videoUrl")]
    pub video_url: String,
    /// Clip start as HH:MM:SS.
    #[serde(rename = "clipStart")]
    pub clip_start: String,
    /// Clip end as HH:MM:SS, strictly after the start.
    #[serde(rename = "clipEnd")]
    pub clip_end: String,
    /// Vertical-resolution cap for the fetched media (e.g. "720").
    #[serde(default)]
    pub quality: String,
}

/// Response to a submission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// "started" or "error".
    pub status: String,
    /// The job identifier, empty on error.
    #[serde(rename = "processId")]
    pub process_id: String,
}

impl SubmitResponse {
    /// A successful submission carrying the new job id.
    pub fn started(process_id: String) -> Self {
        Self {
            status: "started".to_string(),
            process_id,
        }
    }

    /// A rejected submission; no job id is issued.
    pub fn error() -> Self {
        Self {
            status: "error".to_string(),
            process_id: String::new(),
        }
    }
}

/// Generate a job identifier unique for the process lifetime.
///
/// Clock nanoseconds plus a random salt, so two submissions in the same
/// nanosecond still diverge.
pub fn generate_job_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let salt: u32 = rand::rng().random_range(0..10_000);
    format!("{}{}", nanos, salt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // Events round-trip through their JSON wire form.
        #[test]
        fn prop_event_json_round_trip(percent in 0u8..=100, finished in proptest::bool::ANY) {
            let event = if finished {
                ProgressEvent::finished(format!("/download/{}", percent))
            } else {
                ProgressEvent::in_progress(percent)
            };

            let json = serde_json::to_string(&event).expect("event should serialize");
            let back: ProgressEvent = serde_json::from_str(&json).expect("json should deserialize");
            prop_assert_eq!(event, back);
        }

        // in_progress never exceeds 100 even for raw samples past the end.
        #[test]
        fn prop_in_progress_clamped(percent in 0u8..=255) {
            prop_assert!(ProgressEvent::in_progress(percent).progress <= 100);
        }
    }

    #[test]
    fn test_status_serialises_to_wire_names() {
        assert_eq!(
            serde_json::to_string(&ProgressStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&ProgressStatus::Finished).unwrap(),
            "\"finished\""
        );
        assert_eq!(
            serde_json::to_string(&ProgressStatus::Error).unwrap(),
            "\"error\""
        );
    }

    #[test]
    fn test_download_url_omitted_unless_finished() {
        let json = serde_json::to_string(&ProgressEvent::in_progress(40)).unwrap();
        assert!(!json.contains("downloadUrl"));

        let json = serde_json::to_string(&ProgressEvent::finished("/download/42".into())).unwrap();
        assert!(json.contains("\"downloadUrl\":\"/download/42\""));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ProgressStatus::InProgress.is_terminal());
        assert!(ProgressStatus::Finished.is_terminal());
        assert!(ProgressStatus::Error.is_terminal());
    }

    #[test]
    fn test_request_parses_client_wire_names() {
        let json = r#"{
            "videoUrl": "https://example.com/watch?v=abc",
            "clipStart": "00:00:10",
            "clipEnd": "00:00:40",
            "quality": "720"
        }"#;
        let request: ClipRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.video_url, "https://example.com/watch?v=abc");
        assert_eq!(request.clip_start, "00:00:10");
        assert_eq!(request.clip_end, "00:00:40");
        assert_eq!(request.quality, "720");
    }

    #[test]
    fn test_request_quality_defaults_empty() {
        let json = r#"{"videoUrl": "u", "clipStart": "00:00:01", "clipEnd": "00:00:02"}"#;
        let request: ClipRequest = serde_json::from_str(json).unwrap();
        assert!(request.quality.is_empty());
    }

    #[test]
    fn test_generated_ids_unique() {
        let ids: HashSet<String> = (0..256).map(|_| generate_job_id()).collect();
        assert_eq!(ids.len(), 256);
    }

    #[test]
    fn test_submit_response_shapes() {
        let started = serde_json::to_string(&SubmitResponse::started("abc123".into())).unwrap();
        assert!(started.contains("\"status\":\"started\""));
        assert!(started.contains("\"processId\":\"abc123\""));

        let error = serde_json::to_string(&SubmitResponse::error()).unwrap();
        assert!(error.contains("\"status\":\"error\""));
        assert!(error.contains("\"processId\":\"\""));
    }
}
