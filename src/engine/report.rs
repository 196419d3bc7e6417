// ABOUTME: The report record binding subprocess execution back into the graph
// ABOUTME: One JSON object per line; must round-trip exactly for caching

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Report keys. `invoc-output` is the one the graph binds outputs from; the
/// rest are observability data carried through to the run log.
pub mod keys {
    pub const INVOC_OUTPUT: &str = "invoc-output";
    pub const INVOC_STDOUT: &str = "invoc-stdout";
    pub const INVOC_STDERR: &str = "invoc-stderr";
    pub const INVOC_TIME: &str = "invoc-time";
    pub const FILE_SIZE_STAGEIN: &str = "file-size-stagein";
    pub const FILE_SIZE_STAGEOUT: &str = "file-size-stageout";
}

/// One report line. This is the only contract between what an external
/// script wrote and what gets bound back into the graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    pub run_id: String,
    /// Task node id, for debugging identity only.
    pub task_id: usize,
    /// The invocation signature.
    pub invoc_id: String,
    pub task_name: String,
    pub lang: String,
    pub key: String,
    pub value: serde_json::Value,
}

/// The static fields shared by every report entry of one invocation.
#[derive(Debug, Clone)]
pub struct ReportHeader {
    pub run_id: String,
    pub task_id: usize,
    pub invoc_id: String,
    pub task_name: String,
    pub lang: String,
}

impl ReportHeader {
    pub fn entry(&self, key: &str, value: serde_json::Value) -> ReportEntry {
        ReportEntry {
            timestamp: Utc::now().timestamp_millis(),
            run_id: self.run_id.clone(),
            task_id: self.task_id,
            invoc_id: self.invoc_id.clone(),
            task_name: self.task_name.clone(),
            lang: self.lang.clone(),
            key: key.to_string(),
            value,
        }
    }
}

impl ReportEntry {
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub fn to_line(&self) -> String {
        // ReportEntry contains nothing a Serialize impl can fail on.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// The `invoc-output` payload: output name to value array.
    pub fn output_payload(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        if self.key == keys::INVOC_OUTPUT {
            self.value.as_object()
        } else {
            None
        }
    }
}
