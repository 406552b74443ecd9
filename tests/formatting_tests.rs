//! Formatting chain integration tests against mocked backends

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voxbot::application::formatting::{FormatBackendKind, FormatOptions, FormattingChain};
use voxbot::application::ports::{FormatBackend, MetricsSink};
use voxbot::infrastructure::{DashScopeFormatter, GatewayFormatter};

const LONG_RAW: &str =
    "this is a longer transcript with enough words to be worth running through a formatter";

fn options() -> FormatOptions {
    FormatOptions {
        code_tags: false,
        keep_yo: true,
        chunked: false,
        dialogue: false,
        backend: None,
    }
}

#[derive(Default)]
struct RecordingMetrics {
    calls: Mutex<Vec<(String, bool)>>,
}

impl MetricsSink for RecordingMetrics {
    fn record_api_call(&self, backend: &str, _latency: Duration, success: bool) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((backend.to_string(), success));
    }
}

fn dashscope_response(text: &str, finish_reason: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "output": {
            "choices": [{
                "message": { "content": text },
                "finish_reason": finish_reason
            }]
        }
    }))
}

fn gateway_response(text: &str, finish_reason: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{
            "message": { "content": text },
            "finish_reason": finish_reason
        }]
    }))
}

fn qwen_backend(server: &MockServer) -> Arc<dyn FormatBackend> {
    Arc::new(DashScopeFormatter::with_base_url(
        Some("test-key".to_string()),
        server.uri(),
    ))
}

fn gateway_backend(server: &MockServer) -> Arc<dyn FormatBackend> {
    Arc::new(GatewayFormatter::with_base_url(
        Some("test-key".to_string()),
        server.uri(),
    ))
}

/// Chain starting at qwen; a test that never reaches the fallback can pass a
/// keyless gateway
fn chain(
    qwen: Arc<dyn FormatBackend>,
    gateway: Arc<dyn FormatBackend>,
    metrics: Arc<RecordingMetrics>,
) -> FormattingChain {
    FormattingChain::new(qwen, gateway, FormatBackendKind::Qwen, metrics)
}

fn keyless_gateway() -> Arc<dyn FormatBackend> {
    Arc::new(GatewayFormatter::new(None, None))
}

#[tokio::test]
async fn primary_success_needs_no_fallback() {
    let qwen = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/aigc/text-generation/generation"))
        .respond_with(dashscope_response("Formatted text from qwen.", "stop"))
        .expect(1)
        .mount(&qwen)
        .await;
    let gateway = MockServer::start().await;

    let metrics = Arc::new(RecordingMetrics::default());
    let chain = chain(
        qwen_backend(&qwen),
        gateway_backend(&gateway),
        metrics.clone(),
    );

    let out = chain.format(LONG_RAW, options()).await;
    assert_eq!(out, "Formatted text from qwen.");

    let calls = metrics.calls.lock().unwrap();
    assert_eq!(calls.as_slice(), &[("qwen-llm".to_string(), true)]);
}

#[tokio::test]
async fn primary_failure_falls_back_once() {
    let qwen = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend down"))
        .expect(1)
        .mount(&qwen)
        .await;

    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(gateway_response("Formatted by the gateway.", "stop"))
        .expect(1)
        .mount(&gateway)
        .await;

    let metrics = Arc::new(RecordingMetrics::default());
    let chain = chain(
        qwen_backend(&qwen),
        gateway_backend(&gateway),
        metrics.clone(),
    );

    let out = chain.format(LONG_RAW, options()).await;
    assert_eq!(out, "Formatted by the gateway.");

    let calls = metrics.calls.lock().unwrap();
    assert_eq!(
        calls.as_slice(),
        &[
            ("qwen-llm".to_string(), false),
            ("gemini".to_string(), true)
        ]
    );
}

#[tokio::test]
async fn backend_override_starts_the_chain_elsewhere() {
    let qwen = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(dashscope_response("should not be used", "stop"))
        .expect(0)
        .mount(&qwen)
        .await;
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(gateway_response("Gateway went first.", "stop"))
        .expect(1)
        .mount(&gateway)
        .await;

    let chain = chain(
        qwen_backend(&qwen),
        gateway_backend(&gateway),
        Arc::new(RecordingMetrics::default()),
    );

    let opts = FormatOptions {
        backend: Some(FormatBackendKind::Gateway),
        ..options()
    };
    let out = chain.format(LONG_RAW, opts).await;
    assert_eq!(out, "Gateway went first.");
}

#[tokio::test]
async fn both_backends_failing_returns_raw_text() {
    let qwen = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&qwen)
        .await;
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&gateway)
        .await;

    let chain = chain(
        qwen_backend(&qwen),
        gateway_backend(&gateway),
        Arc::new(RecordingMetrics::default()),
    );

    let out = chain.format(LONG_RAW, options()).await;
    assert_eq!(out, LONG_RAW);
}

#[tokio::test]
async fn reasoning_blocks_are_stripped_from_output() {
    let qwen = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(dashscope_response(
            "<think>the user wants\nclean text</think>Cleaned transcript.",
            "stop",
        ))
        .mount(&qwen)
        .await;

    let chain = chain(
        qwen_backend(&qwen),
        keyless_gateway(),
        Arc::new(RecordingMetrics::default()),
    );

    let out = chain.format(LONG_RAW, options()).await;
    assert_eq!(out, "Cleaned transcript.");
}

#[tokio::test]
async fn truncated_completion_keeps_raw_without_fallback() {
    let qwen = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(dashscope_response("Half of the transcri", "length"))
        .expect(1)
        .mount(&qwen)
        .await;

    // The fallback must never be called for a truncation
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(gateway_response("should not be used", "stop"))
        .expect(0)
        .mount(&gateway)
        .await;

    let chain = chain(
        qwen_backend(&qwen),
        gateway_backend(&gateway),
        Arc::new(RecordingMetrics::default()),
    );

    let out = chain.format(LONG_RAW, options()).await;
    assert_eq!(out, LONG_RAW);
}

#[tokio::test]
async fn short_transcripts_skip_formatting() {
    let qwen = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(dashscope_response("unexpected", "stop"))
        .expect(0)
        .mount(&qwen)
        .await;

    let chain = chain(
        qwen_backend(&qwen),
        keyless_gateway(),
        Arc::new(RecordingMetrics::default()),
    );

    let out = chain.format("only a few words here", options()).await;
    assert_eq!(out, "only a few words here");
}

#[tokio::test]
async fn unsolicited_code_tags_are_stripped() {
    let qwen = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(dashscope_response("<code>Formatted text.</code>", "stop"))
        .mount(&qwen)
        .await;

    let chain = chain(
        qwen_backend(&qwen),
        keyless_gateway(),
        Arc::new(RecordingMetrics::default()),
    );

    let out = chain.format(LONG_RAW, options()).await;
    assert_eq!(out, "Formatted text.");
}

#[tokio::test]
async fn missing_credentials_skip_to_fallback_silently() {
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(gateway_response("Gateway output.", "stop"))
        .expect(1)
        .mount(&gateway)
        .await;

    let keyless: Arc<dyn FormatBackend> = Arc::new(DashScopeFormatter::new(None));
    let metrics = Arc::new(RecordingMetrics::default());
    let chain = chain(keyless, gateway_backend(&gateway), metrics.clone());

    let out = chain.format(LONG_RAW, options()).await;
    assert_eq!(out, "Gateway output.");

    // A skipped backend records no metric at all
    let calls = metrics.calls.lock().unwrap();
    assert_eq!(calls.as_slice(), &[("gemini".to_string(), true)]);
}

#[tokio::test]
async fn degenerate_output_triggers_fallback() {
    let qwen = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(dashscope_response("<think>nothing left</think>ok", "stop"))
        .mount(&qwen)
        .await;
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(gateway_response("A proper formatted result.", "stop"))
        .expect(1)
        .mount(&gateway)
        .await;

    let chain = chain(
        qwen_backend(&qwen),
        gateway_backend(&gateway),
        Arc::new(RecordingMetrics::default()),
    );

    let out = chain.format(LONG_RAW, options()).await;
    assert_eq!(out, "A proper formatted result.");
}
