use std::fmt;
use std::time::Duration;

use futures_util::StreamExt;
use memchr::memchr;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::{ErrorBody, GenerationChunk, GenerationRequest};
use crate::utils::url::service_url;

#[derive(Clone, Debug, PartialEq)]
pub enum StreamMessage {
    /// The service accepted the request and the body is being streamed.
    Started,
    Chunk(String),
    Error(String),
    End,
}

/// A frame (or part of one) that could not be decoded.
#[derive(Debug)]
pub struct FrameError {
    pub payload: String,
    pub source: serde_json::Error,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "undecodable frame {:?}: {}", self.payload, self.source)
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

const MAX_LOGGED_PAYLOAD: usize = 120;

fn extract_data_payload(line: &str) -> &str {
    line.strip_prefix("data:").map(str::trim_start).unwrap_or(line)
}

fn decode_line(line: &str, out: &mut Vec<Result<GenerationChunk, FrameError>>) {
    let payload = extract_data_payload(line.trim());
    if payload.is_empty() || payload == "[DONE]" {
        return;
    }

    // A single transport frame may carry several JSON objects back to back.
    let objects = serde_json::Deserializer::from_str(payload).into_iter::<GenerationChunk>();
    for object in objects {
        match object {
            Ok(chunk) => out.push(Ok(chunk)),
            Err(source) => {
                out.push(Err(FrameError {
                    payload: payload.chars().take(MAX_LOGGED_PAYLOAD).collect(),
                    source,
                }));
                break;
            }
        }
    }
}

/// Parses the whole frame as a run of JSON objects. `None` when any part of
/// it fails, so the caller can fall back to per-line decoding.
fn decode_whole(frame: &str) -> Option<Vec<Result<GenerationChunk, FrameError>>> {
    serde_json::Deserializer::from_str(frame)
        .into_iter::<GenerationChunk>()
        .map(|object| object.ok().map(Ok))
        .collect()
}

fn has_sse_lines(frame: &str) -> bool {
    frame.lines().any(|line| line.trim_start().starts_with("data:"))
}

/// Decodes one delivered frame into content chunks.
///
/// A frame is first read as one or more JSON objects, which may span lines.
/// SSE frames, and frames that do not parse as a whole, are decoded line by
/// line: a malformed line only loses itself, never the lines around it.
pub fn decode_frame(bytes: &[u8]) -> Vec<Result<GenerationChunk, FrameError>> {
    let text = String::from_utf8_lossy(bytes);
    let frame = text.trim();
    if frame.is_empty() {
        return Vec::new();
    }
    if !has_sse_lines(frame) {
        if let Some(decoded) = decode_whole(frame) {
            return decoded;
        }
    }

    let mut decoded = Vec::new();
    let mut rest = bytes;
    loop {
        let (line, next) = match memchr(b'\n', rest) {
            Some(pos) => (&rest[..pos], Some(&rest[pos + 1..])),
            None => (rest, None),
        };
        decode_line(&String::from_utf8_lossy(line), &mut decoded);
        match next {
            Some(next) => rest = next,
            None => break,
        }
    }
    decoded
}

/// Error text for a non-success response: the body's `detail` when present,
/// otherwise the status text.
pub fn format_api_error(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|body| body.detail_text())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.as_str().to_string())
        });
    format!("Failed to send message: {detail}")
}

#[derive(Debug)]
pub struct StreamParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub request: GenerationRequest,
    /// Longest wait for the next frame before the turn fails. `None` waits
    /// forever.
    pub idle_timeout: Option<Duration>,
    pub stream_id: u64,
}

#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) {
        let tx = self.tx.clone();
        tokio::spawn(run_stream(params, tx));
    }
}

async fn run_stream(params: StreamParams, tx: mpsc::UnboundedSender<(StreamMessage, u64)>) {
    let StreamParams {
        client,
        base_url,
        request,
        idle_timeout,
        stream_id,
    } = params;
    let send = |message: StreamMessage| {
        let _ = tx.send((message, stream_id));
    };

    let generate_url = service_url(&base_url, "generate");
    debug!(stream_id, url = %generate_url, "sending generation request");

    let response = match client
        .post(generate_url)
        .header(CONTENT_TYPE, "application/json")
        .json(&request)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            send(StreamMessage::Error(format!("Failed to send message: {e}")));
            send(StreamMessage::End);
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        send(StreamMessage::Error(format_api_error(status, &error_text)));
        send(StreamMessage::End);
        return;
    }

    send(StreamMessage::Started);
    let mut stream = response.bytes_stream();
    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    send(StreamMessage::Error(format!(
                        "No data received for {} seconds",
                        limit.as_secs()
                    )));
                    break;
                }
            },
            None => stream.next().await,
        };

        match next {
            Some(Ok(bytes)) => {
                for decoded in decode_frame(&bytes) {
                    match decoded {
                        Ok(chunk) => send(StreamMessage::Chunk(chunk.content)),
                        Err(err) => warn!(stream_id, error = %err, "discarding stream frame"),
                    }
                }
            }
            Some(Err(e)) => {
                send(StreamMessage::Error(format!("Failed to read response: {e}")));
                break;
            }
            None => break,
        }
    }

    debug!(stream_id, "stream finished");
    send(StreamMessage::End);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::SessionId;
    use crate::core::settings::InferenceSettings;
    use crate::utils::test_utils::{spawn_stub_server, test_client, StubResponse};

    fn contents(bytes: &[u8]) -> Vec<String> {
        decode_frame(bytes)
            .into_iter()
            .filter_map(Result::ok)
            .map(|chunk| chunk.content)
            .collect()
    }

    fn test_request() -> GenerationRequest {
        crate::core::request::build_request(
            "hello",
            &[],
            "",
            &InferenceSettings::default(),
            &SessionId::from("abc"),
        )
        .expect("request")
    }

    async fn collect(
        rx: &mut mpsc::UnboundedReceiver<(StreamMessage, u64)>,
    ) -> Vec<StreamMessage> {
        let mut messages = Vec::new();
        while let Some((message, _)) = rx.recv().await {
            let done = message == StreamMessage::End;
            messages.push(message);
            if done {
                break;
            }
        }
        messages
    }

    #[test]
    fn decode_frame_reads_single_object() {
        assert_eq!(contents(br#"{"content":"Hi"}"#), vec!["Hi"]);
    }

    #[test]
    fn decode_frame_reads_objects_spanning_lines() {
        let decoded = decode_frame(b"{\n  \"content\": \"Hi\"\n}");
        assert_eq!(decoded.len(), 1);
        assert_eq!(contents(b"{\n  \"content\": \"Hi\"\n}"), vec!["Hi"]);
        assert_eq!(
            contents(b"{\n\"content\": \"a\"\n}\n{\"content\":\n\"b\"}\n"),
            vec!["a", "b"]
        );
    }

    #[test]
    fn decode_frame_accepts_sse_prefix_and_coalesced_objects() {
        assert_eq!(
            contents(b"data: {\"content\":\"a\"}\n{\"content\":\"b\"}{\"content\":\"c\"}\n\ndata: [DONE]\n"),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn decode_frame_isolates_malformed_lines() {
        let decoded = decode_frame(b"{\"content\":\"Hi\"}\nnot-json\n{\"content\":\"!\"}");
        assert_eq!(decoded.len(), 3);
        assert!(decoded[1].is_err());
        assert_eq!(contents(b"not-json"), Vec::<String>::new());
        assert_eq!(
            contents(b"{\"content\":\"Hi\"}\nnot-json\n{\"content\":\"!\"}"),
            vec!["Hi", "!"]
        );
    }

    #[test]
    fn decode_frame_replaces_invalid_utf8() {
        let decoded = decode_frame(b"{\"content\":\"caf\xC3\"}");
        assert_eq!(decoded.len(), 1);
        let chunk = decoded.into_iter().next().unwrap().expect("lossy decode parses");
        assert!(chunk.content.starts_with("caf"));
    }

    #[test]
    fn format_api_error_prefers_detail() {
        assert_eq!(
            format_api_error(StatusCode::BAD_REQUEST, r#"{"detail":"prompt too long"}"#),
            "Failed to send message: prompt too long"
        );
        assert_eq!(
            format_api_error(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>"),
            "Failed to send message: Bad Gateway"
        );
        assert_eq!(
            format_api_error(StatusCode::INTERNAL_SERVER_ERROR, r#"{"detail":null}"#),
            "Failed to send message: Internal Server Error"
        );
    }

    #[tokio::test]
    async fn streams_chunks_and_skips_malformed_frames() {
        let server = spawn_stub_server(vec![StubResponse::chunked(
            200,
            &[r#"{"content":"Hi"}"#, r#"{"content":" there"}"#, "not-json", r#"{"content":"!"}"#],
        )])
        .await;

        let (service, mut rx) = ChatStreamService::new();
        service.spawn_stream(StreamParams {
            client: test_client(),
            base_url: server.base_url(),
            request: test_request(),
            idle_timeout: None,
            stream_id: 7,
        });

        let messages = collect(&mut rx).await;
        assert_eq!(
            messages,
            vec![
                StreamMessage::Started,
                StreamMessage::Chunk("Hi".into()),
                StreamMessage::Chunk(" there".into()),
                StreamMessage::Chunk("!".into()),
                StreamMessage::End,
            ]
        );

        let captured = server.requests().await;
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].path, "/api/v1/generate");
        assert_eq!(captured[0].body["prompt"], "hello");
        assert_eq!(captured[0].body["session_id"], "abc");
    }

    #[tokio::test]
    async fn error_status_reports_detail() {
        let server = spawn_stub_server(vec![StubResponse::json(
            503,
            r#"{"detail":"model is loading"}"#,
        )])
        .await;

        let (service, mut rx) = ChatStreamService::new();
        service.spawn_stream(StreamParams {
            client: test_client(),
            base_url: server.base_url(),
            request: test_request(),
            idle_timeout: None,
            stream_id: 1,
        });

        assert_eq!(
            collect(&mut rx).await,
            vec![
                StreamMessage::Error("Failed to send message: model is loading".into()),
                StreamMessage::End,
            ]
        );
    }

    #[tokio::test]
    async fn unreachable_service_fails_the_stream() {
        let (service, mut rx) = ChatStreamService::new();
        service.spawn_stream(StreamParams {
            client: test_client(),
            base_url: "http://127.0.0.1:9".into(),
            request: test_request(),
            idle_timeout: None,
            stream_id: 3,
        });

        let messages = collect(&mut rx).await;
        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[0], StreamMessage::Error(text) if text.starts_with("Failed to send message")));
        assert_eq!(messages[1], StreamMessage::End);
    }

    #[tokio::test]
    async fn idle_timeout_fails_a_stalled_stream() {
        let server = spawn_stub_server(vec![StubResponse::stalled(200, &[r#"{"content":"partial"}"#])]).await;

        let (service, mut rx) = ChatStreamService::new();
        service.spawn_stream(StreamParams {
            client: test_client(),
            base_url: server.base_url(),
            request: test_request(),
            idle_timeout: Some(Duration::from_millis(200)),
            stream_id: 4,
        });

        let messages = collect(&mut rx).await;
        assert_eq!(messages[0], StreamMessage::Started);
        assert_eq!(messages[1], StreamMessage::Chunk("partial".into()));
        assert!(matches!(&messages[2], StreamMessage::Error(text) if text.starts_with("No data received")));
        assert_eq!(messages[3], StreamMessage::End);
    }
}
