//! Integration tests for the OpenAI-compatible provider
//!
//! Both URL layouts run against wiremock:
//! - request body shape, tools and authentication headers
//! - retry on server errors, no retry on client errors
//! - finish reasons, tool calls and token usage

use friday_assistant::llm::provider::{
    CompletionRequest, FinishReason, LlmError, LlmProvider, Message,
};
use friday_assistant::llm::providers::{ApiFlavor, OpenAiConfig, OpenAiProvider};
use friday_assistant::tools::ToolDescription;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str) -> OpenAiConfig {
    OpenAiConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
        flavor: ApiFlavor::OpenAi,
    }
}

fn test_request(model: &str) -> CompletionRequest {
    CompletionRequest {
        messages: vec![Message::system("You are Friday."), Message::user("Hello")],
        model: model.to_string(),
        max_tokens: Some(100),
        temperature: Some(0.8),
        tools: None,
        tool_choice: None,
        metadata: HashMap::new(),
    }
}

fn text_completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 9, "completion_tokens": 12, "total_tokens": 21}
    })
}

#[tokio::test]
async fn test_openai_completion_sends_bearer_and_parses_reply() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-api-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 100,
            "messages": [
                {"role": "system", "content": "You are Friday."},
                {"role": "user", "content": "Hello"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_completion("Hi! How can I help?")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let response = provider.complete(test_request("gpt-4o-mini")).await.unwrap();

    assert_eq!(response.content.as_deref(), Some("Hi! How can I help?"));
    assert_eq!(response.model, "gpt-4o-mini");
    assert_eq!(response.finish_reason, FinishReason::Stop);
    assert_eq!(response.usage.total_tokens, 21);
    assert!(!response.has_tool_calls());
}

#[tokio::test]
async fn test_azure_completion_uses_deployment_path_and_api_key_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt-4o/chat/completions"))
        .and(query_param("api-version", "2025-01-01-preview"))
        .and(header("api-key", "azure-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_completion("From Azure")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(OpenAiConfig::azure(
        "azure-key".to_string(),
        format!("{}/", mock_server.uri()),
        "2025-01-01-preview".to_string(),
    ))
    .unwrap();

    let response = provider.complete(test_request("gpt-4o")).await.unwrap();
    assert_eq!(response.content.as_deref(), Some("From Azure"));
    assert_eq!(provider.name(), "azure_openai");
}

#[tokio::test]
async fn test_tools_are_sent_as_functions_and_calls_parsed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "tools": [{
                "type": "function",
                "function": {"name": "save_email_details"}
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {
                            "name": "save_email_details",
                            "arguments": "{\"prompt\": \"send to malay@example.com\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 50, "completion_tokens": 20, "total_tokens": 70}
        })))
        .mount(&mock_server)
        .await;

    let mut request = test_request("gpt-4o-mini");
    request.tools = Some(vec![ToolDescription {
        name: "save_email_details".to_string(),
        description: "Save an email draft".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {"prompt": {"type": "string"}},
            "required": ["prompt"]
        }),
    }]);

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let response = provider.complete(request).await.unwrap();

    assert_eq!(response.finish_reason, FinishReason::ToolCalls);
    let calls = response.tool_calls.unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "call_abc");
    assert_eq!(calls[0].name, "save_email_details");
    assert_eq!(calls[0].arguments["prompt"], "send to malay@example.com");
}

#[tokio::test]
async fn test_unparseable_tool_arguments_carry_parse_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {
                            "id": "call_bad",
                            "type": "function",
                            "function": {"name": "send_email", "arguments": "invalid json {{"}
                        },
                        {
                            "id": "call_empty",
                            "type": "function",
                            "function": {"name": "send_email", "arguments": ""}
                        }
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let response = provider.complete(test_request("gpt-4o-mini")).await.unwrap();

    let calls = response.tool_calls.unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].id, "call_bad");
    assert!(calls[0].argument_error.is_some());
    assert_eq!(calls[1].id, "call_empty");
    assert_eq!(calls[1].arguments, json!({}));
    assert!(calls[1].argument_error.is_none());
    assert_eq!(response.usage.total_tokens, 0);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service temporarily unavailable"))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_completion("Success after retry")))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let response = provider.complete(test_request("gpt-4o-mini")).await.unwrap();

    assert_eq!(response.content.as_deref(), Some("Success after retry"));
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_gives_up_after_all_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(4)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let error = provider
        .complete(test_request("gpt-4o-mini"))
        .await
        .unwrap_err();

    match error {
        LlmError::ApiError(msg) => assert!(msg.contains("server error")),
        other => panic!("Expected ApiError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string(
            r#"{"error": {"message": "This model's maximum context length is 128000 tokens"}}"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let error = provider
        .complete(test_request("gpt-4o-mini"))
        .await
        .unwrap_err();

    match error {
        LlmError::ApiError(msg) => {
            assert!(msg.contains("400"));
            assert!(msg.contains("maximum context length"));
        }
        other => panic!("Expected ApiError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rejected_key_is_authentication_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string(
            r#"{"error": {"message": "Incorrect API key provided"}}"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let error = provider
        .complete(test_request("gpt-4o-mini"))
        .await
        .unwrap_err();

    match error {
        LlmError::AuthenticationFailed(msg) => assert!(msg.contains("Incorrect API key")),
        other => panic!("Expected AuthenticationFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_choices_is_invalid_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-mini",
            "choices": []
        })))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let error = provider
        .complete(test_request("gpt-4o-mini"))
        .await
        .unwrap_err();
    assert!(matches!(error, LlmError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_length_finish_reason() {
    let mock_server = MockServer::start().await;

    let mut body = text_completion("Truncated");
    body["choices"][0]["finish_reason"] = json!("length");

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let response = provider.complete(test_request("gpt-4o-mini")).await.unwrap();
    assert_eq!(response.finish_reason, FinishReason::Length);
}

#[tokio::test]
async fn test_request_metadata_preserved() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_completion("ok")))
        .mount(&mock_server)
        .await;

    let mut request = test_request("gpt-4o-mini");
    request
        .metadata
        .insert("session".to_string(), "alice".to_string());

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let response = provider.complete(request).await.unwrap();
    assert_eq!(response.metadata.get("session").map(String::as_str), Some("alice"));
}

#[tokio::test]
async fn test_health_check_per_flavor() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("Authorization", "Bearer test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "list", "data": []})))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/openai/models"))
        .and(query_param("api-version", "2025-01-01-preview"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&mock_server)
        .await;

    let openai = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    assert!(openai.health_check().await.is_ok());

    let azure = OpenAiProvider::new(OpenAiConfig::azure(
        "wrong".to_string(),
        mock_server.uri(),
        "2025-01-01-preview".to_string(),
    ))
    .unwrap();
    assert!(matches!(
        azure.health_check().await,
        Err(LlmError::AuthenticationFailed(_))
    ));
}
