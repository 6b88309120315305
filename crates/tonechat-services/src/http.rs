//! Shared plumbing for the HTTP service clients.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

use tonechat_core::config::Auth;
use tonechat_core::error::{Result, ToneChatError};
use tonechat_core::types::ServiceKind;

/// Build a client with a per-request timeout.
pub fn client(service: ServiceKind, timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ToneChatError::Config(format!("{} client: {}", service, e)))
}

/// Attach credentials. API keys use the `apikey` basic-auth user.
pub fn authorize(request: RequestBuilder, auth: Option<&Auth>) -> RequestBuilder {
    match auth {
        Some(Auth::Basic { username, password }) => request.basic_auth(username, Some(password)),
        Some(Auth::ApiKey(key)) => request.basic_auth("apikey", Some(key)),
        None => request,
    }
}

/// Map a reqwest failure onto the transport side of the taxonomy.
pub fn transport_error(service: ServiceKind, err: reqwest::Error) -> ToneChatError {
    let message = if err.is_timeout() {
        format!("request timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    };
    ToneChatError::transport(service, message)
}

/// Send the request, turning non-2xx answers into service errors.
pub async fn send(service: ServiceKind, request: RequestBuilder) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(service, e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| {
        if body.is_empty() {
            status.to_string()
        } else {
            body
        }
    });
    tracing::debug!(service = %service, status = status.as_u16(), "Service returned an error");
    Err(ToneChatError::service(service, Some(status.as_u16()), message))
}

/// Read a JSON body, mapping decode failures to service errors.
pub async fn json_body(service: ServiceKind, response: Response) -> Result<Value> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(service, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ToneChatError::service(service, None, format!("malformed response: {}", e)))
}

/// Pull a human readable message out of an error payload.
///
/// The services answer with `{"error": "...", "code": 400}` or with
/// `{"error": {"message": "..."}}`; anything else is left to the caller.
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    if let Some(text) = error.as_str() {
        return Some(text.to_string());
    }
    error
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
}
