//! HTTP client for the conversation service.
//!
//! `POST {url}/v1/workspaces/{workspace}/message?version=...` with
//! `{"input": {"text": ...}, "context": {...}}`. Only `output.text` and
//! `context` of the answer are consumed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use tonechat_core::config::{Auth, DialogueConfig};
use tonechat_core::error::{Result, ToneChatError};
use tonechat_core::types::{DialogueContext, DialogueReply, ServiceKind};

use crate::http;
use crate::{DialogueRequest, DialogueService};

const SERVICE: ServiceKind = ServiceKind::Dialogue;

/// Dialogue service backed by the conversation REST API.
pub struct HttpDialogueService {
    client: Client,
    endpoint: String,
    version: String,
    auth: Option<Auth>,
}

impl HttpDialogueService {
    pub fn new(config: &DialogueConfig, timeout: Duration) -> Result<Self> {
        if config.workspace_id.is_empty() {
            return Err(ToneChatError::Config(
                "dialogue.workspace_id is required".to_string(),
            ));
        }
        Ok(Self {
            client: http::client(SERVICE, timeout)?,
            endpoint: format!(
                "{}/v1/workspaces/{}/message",
                config.url.trim_end_matches('/'),
                config.workspace_id
            ),
            version: config.version.clone(),
            auth: config.credentials.resolve(SERVICE),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DialogueService for HttpDialogueService {
    async fn message(&self, request: DialogueRequest) -> Result<DialogueReply> {
        let body = request_body(&request);
        let builder = self
            .client
            .post(&self.endpoint)
            .query(&[("version", self.version.as_str())])
            .json(&body);
        let response = http::send(SERVICE, http::authorize(builder, self.auth.as_ref())).await?;
        let value = http::json_body(SERVICE, response).await?;
        let reply = parse_reply(value)?;
        tracing::debug!(chars = reply.text.len(), "Dialogue reply received");
        Ok(reply)
    }
}

/// JSON body for a dialogue request. Absent fields are omitted.
pub fn request_body(request: &DialogueRequest) -> Value {
    let mut body = Map::new();
    if let Some(text) = &request.text {
        body.insert("input".to_string(), json!({ "text": text }));
    }
    if let Some(context) = &request.context {
        body.insert("context".to_string(), context.0.clone());
    }
    Value::Object(body)
}

#[derive(Deserialize)]
struct MessageResponse {
    output: Output,
    context: Option<Value>,
}

#[derive(Deserialize)]
struct Output {
    #[serde(default)]
    text: Vec<String>,
}

/// Decode a dialogue answer. Output segments are joined without separator;
/// a missing or null `context` yields a reply without one.
pub fn parse_reply(value: Value) -> Result<DialogueReply> {
    let response: MessageResponse = serde_json::from_value(value)
        .map_err(|e| ToneChatError::service(SERVICE, None, format!("malformed reply: {}", e)))?;
    Ok(DialogueReply {
        text: response.output.text.concat(),
        context: response
            .context
            .filter(|c| !c.is_null())
            .map(DialogueContext),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_opening_is_empty_object() {
        let body = request_body(&DialogueRequest::opening());
        assert_eq!(body, json!({}));
    }

    #[test]
    fn test_request_body_carries_text_and_context() {
        let ctx = DialogueContext(json!({"conversation_id": "abc", "system": {"turn": 2}}));
        let body = request_body(&DialogueRequest::new("hello", Some(ctx)));
        assert_eq!(body["input"]["text"], "hello");
        assert_eq!(body["context"]["conversation_id"], "abc");
        assert_eq!(body["context"]["system"]["turn"], 2);
    }

    #[test]
    fn test_parse_reply_joins_segments() {
        let value = json!({
            "output": {"text": ["Hello. ", "How can I help?"]},
            "context": {"conversation_id": "abc"}
        });
        let reply = parse_reply(value).unwrap();
        assert_eq!(reply.text, "Hello. How can I help?");
        assert_eq!(reply.context.unwrap().0["conversation_id"], "abc");
    }

    #[test]
    fn test_parse_reply_without_context_keeps_text() {
        let missing = parse_reply(json!({"output": {"text": ["hi"]}})).unwrap();
        assert_eq!(missing.text, "hi");
        assert!(missing.context.is_none());

        let null = parse_reply(json!({"output": {"text": ["hi"]}, "context": null})).unwrap();
        assert_eq!(null.text, "hi");
        assert!(null.context.is_none());
    }

    #[test]
    fn test_parse_reply_missing_output_is_service_error() {
        let err = parse_reply(json!({"context": {}})).unwrap_err();
        assert!(err.to_string().contains("malformed reply"));
    }

    #[test]
    fn test_new_requires_workspace() {
        let config = DialogueConfig::default();
        assert!(HttpDialogueService::new(&config, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_endpoint_format() {
        let config = DialogueConfig {
            url: "https://example.test/api/".into(),
            workspace_id: "ws1".into(),
            ..DialogueConfig::default()
        };
        let service = HttpDialogueService::new(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(
            service.endpoint(),
            "https://example.test/api/v1/workspaces/ws1/message"
        );
    }
}
