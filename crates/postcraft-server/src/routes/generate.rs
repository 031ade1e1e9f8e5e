use crate::state::AppState;
use axum::{
    extract::State,
    http::{self, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use postcraft::events::OutputEvent;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    topic: String,
}

// Streams the data-stream protocol lines produced by a run
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> axum::response::Response {
        let body = axum::body::Body::from_stream(self);

        let mut response = (StatusCode::OK, body).into_response();
        let headers = response.headers_mut();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("text/event-stream"),
        );
        headers.insert(
            http::header::CACHE_CONTROL,
            http::HeaderValue::from_static("no-cache"),
        );
        headers.insert(
            http::header::CONNECTION,
            http::HeaderValue::from_static("keep-alive"),
        );
        headers.insert(
            "x-vercel-ai-data-stream",
            http::HeaderValue::from_static("v1"),
        );
        response
    }
}

// Protocol-specific message formatting
struct ProtocolFormatter;

impl ProtocolFormatter {
    fn format_text(text: &str) -> String {
        let encoded_text = serde_json::to_string(text).unwrap_or_else(|_| String::new());
        format!("0:{}\n", encoded_text)
    }

    fn format_tool_call(id: &str, name: &str, args: &Value) -> String {
        let tool_call = json!({
            "toolCallId": id,
            "toolName": name,
            "args": args
        });
        format!("9:{}\n", tool_call)
    }

    fn format_tool_response(id: &str, result: &str) -> String {
        let response = json!({
            "toolCallId": id,
            "result": result,
        });
        format!("a:{}\n", response)
    }

    fn format_finish(reason: &str) -> String {
        let finish = json!({
            "finishReason": reason,
            "usage": {
                "promptTokens": 0,
                "completionTokens": 0
            }
        });
        format!("d:{}\n", finish)
    }

    /// Delimiters have no place in the protocol and are dropped
    fn format_event(event: &OutputEvent) -> Option<String> {
        match event {
            OutputEvent::Delimiter(_) => None,
            OutputEvent::ContentChunk(text) => Some(Self::format_text(text)),
            OutputEvent::ToolInvocation { id, name, args } => {
                Some(Self::format_tool_call(id, name, args))
            }
            OutputEvent::ToolResult { id, text, .. } => Some(Self::format_tool_response(id, text)),
        }
    }
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<SseResponse, StatusCode> {
    let topic = request.topic.trim().to_string();
    if topic.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let pipeline = state.pipeline().map_err(|e| {
        tracing::error!("Failed to build pipeline: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);

    tokio::spawn(async move {
        let mut events = match pipeline.run(&topic).await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!("Post generation failed before writing: {}", e);
                let _ = tx.send(ProtocolFormatter::format_finish("error")).await;
                return;
            }
        };

        let reason = loop {
            match timeout(Duration::from_millis(500), events.next()).await {
                Ok(Some(Ok(event))) => {
                    if let Some(line) = ProtocolFormatter::format_event(&event) {
                        if let Err(e) = tx.send(line).await {
                            tracing::error!("Error sending event through channel: {}", e);
                            break "stop";
                        }
                    }
                }
                Ok(Some(Err(e))) => {
                    tracing::error!("Error while writing post: {}", e);
                    break "error";
                }
                Ok(None) => break "stop",
                // Heartbeat, used to detect disconnected clients
                Err(_) => {
                    if tx.is_closed() {
                        break "stop";
                    }
                }
            }
        };

        if pipeline.degraded_searches() > 0 {
            tracing::warn!(
                degraded = pipeline.degraded_searches(),
                "post written from degraded research"
            );
        }
        let _ = tx.send(ProtocolFormatter::format_finish(reason)).await;
    });

    Ok(SseResponse::new(stream))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use postcraft::events::DelimiterKind;
    use postcraft::providers::configs::{OpenAiProviderConfig, ProviderConfig};
    use postcraft::search::SearchConfig;
    use tower::ServiceExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state_for(openai_host: &str) -> AppState {
        let mut provider = OpenAiProviderConfig::new("test-key");
        provider.host = openai_host.to_string();
        let mut search = SearchConfig::new("pplx-test");
        search.host = "http://127.0.0.1:9".to_string();

        AppState {
            provider_config: ProviderConfig::OpenAi(provider),
            search_config: search,
            model: "gpt-4o".to_string(),
        }
    }

    fn generate_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/generate")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_format_events() {
        assert_eq!(
            ProtocolFormatter::format_event(&OutputEvent::content("Line \"one\"\n")),
            Some("0:\"Line \\\"one\\\"\\n\"\n".to_string())
        );
        assert_eq!(
            ProtocolFormatter::format_event(&OutputEvent::Delimiter(DelimiterKind::Start)),
            None
        );

        let call = ProtocolFormatter::format_event(&OutputEvent::ToolInvocation {
            id: "call_1".to_string(),
            name: "search_web".to_string(),
            args: json!({"query": "EVs"}),
        })
        .unwrap();
        assert!(call.starts_with("9:"));
        let call: Value = serde_json::from_str(call[2..].trim()).unwrap();
        assert_eq!(
            call,
            json!({"toolCallId": "call_1", "toolName": "search_web", "args": {"query": "EVs"}})
        );

        let result = ProtocolFormatter::format_event(&OutputEvent::ToolResult {
            id: "call_1".to_string(),
            name: "search_web".to_string(),
            text: "EVs grew".to_string(),
        })
        .unwrap();
        let result: Value = serde_json::from_str(result.strip_prefix("a:").unwrap().trim()).unwrap();
        assert_eq!(result, json!({"toolCallId": "call_1", "result": "EVs grew"}));
    }

    #[test]
    fn test_format_finish() {
        let finish = ProtocolFormatter::format_finish("stop");
        let value: Value = serde_json::from_str(finish.strip_prefix("d:").unwrap().trim()).unwrap();
        assert_eq!(value["finishReason"], "stop");
    }

    #[tokio::test]
    async fn test_empty_topic_is_rejected() {
        let response = routes(state_for("http://127.0.0.1:9"))
            .oneshot(generate_request(json!({"topic": "   "})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_generate_streams_post() {
        let server = MockServer::start().await;
        let sse = [
            json!({"choices": [{"delta": {"content": "EV growth is"}}]}),
            json!({"choices": [{"delta": {"content": " accelerating."}}]}),
        ]
        .iter()
        .map(|event| format!("data: {}\n\n", event))
        .collect::<String>()
            + "data: [DONE]\n\n";

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Trend: EV growth accelerating"}}]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let response = routes(state_for(&server.uri()))
            .oneshot(generate_request(json!({"topic": "electric vehicles"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-vercel-ai-data-stream").unwrap(),
            "v1"
        );

        let body = body_text(response).await;
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "0:\"EV growth is\"");
        assert_eq!(lines[1], "0:\" accelerating.\"");
        assert!(lines[2].starts_with("d:{\"finishReason\":\"stop\""));
        assert_eq!(lines.len(), 3);
    }

    #[tokio::test]
    async fn test_backend_failure_finishes_with_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let response = routes(state_for(&server.uri()))
            .oneshot(generate_request(json!({"topic": "electric vehicles"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.starts_with("d:{\"finishReason\":\"error\""));
    }
}
