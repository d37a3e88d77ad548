use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::settings::InferenceSettings;

/// One attachment inside a generation request. `id` is the 1-based position
/// of the attachment in the message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImagePayload {
    pub data: String,
    pub id: usize,
}

/// Body of `POST /api/v1/generate`. Every inference setting is flattened into
/// the top level of the object.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub session_id: String,
    pub image_data: Vec<ImagePayload>,
    #[serde(flatten)]
    pub settings: InferenceSettings,
}

/// One decoded frame of a streaming response.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct GenerationChunk {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub stop: bool,
}

/// Error body returned with non-success statuses.
#[derive(Deserialize, Debug)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ErrorBody {
    /// Human-readable detail: strings verbatim, structured details as JSON.
    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::Null => None,
            Value::String(text) if text.trim().is_empty() => None,
            Value::String(text) => Some(text.trim().to_string()),
            other => Some(other.to_string()),
        }
    }
}

/// Snapshot from `GET /api/v1/metrics`. The default value is the zeroed
/// fallback used when the endpoint cannot be reached.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ServerMetrics {
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub memory_usage: f64,
    #[serde(default)]
    pub gpu_name: Option<String>,
    #[serde(default)]
    pub gpu_usage: Option<f64>,
    #[serde(default)]
    pub vram_usage: Option<f64>,
}

pub mod metrics;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_detail_accepts_strings_and_structures() {
        let plain: ErrorBody = serde_json::from_value(json!({"detail": "model offline"})).unwrap();
        assert_eq!(plain.detail_text().as_deref(), Some("model offline"));

        let structured: ErrorBody =
            serde_json::from_value(json!({"detail": [{"loc": ["body", "session_id"]}]})).unwrap();
        assert_eq!(
            structured.detail_text().as_deref(),
            Some(r#"[{"loc":["body","session_id"]}]"#)
        );

        let missing: ErrorBody = serde_json::from_value(json!({})).unwrap();
        assert_eq!(missing.detail_text(), None);
    }

    #[test]
    fn metrics_tolerate_missing_gpu() {
        let metrics: ServerMetrics =
            serde_json::from_value(json!({"cpu_usage": 12.5, "memory_usage": 40.0})).unwrap();
        assert_eq!(metrics.cpu_usage, 12.5);
        assert_eq!(metrics.gpu_name, None);
        assert_eq!(metrics.vram_usage, None);
    }

    #[test]
    fn chunk_without_content_is_empty() {
        let chunk: GenerationChunk = serde_json::from_str(r#"{"stop": true}"#).unwrap();
        assert_eq!(chunk.content, "");
        assert!(chunk.stop);
    }
}
