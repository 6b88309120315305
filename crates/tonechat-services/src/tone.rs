//! HTTP client for the tone analysis service.
//!
//! `POST {url}/v3/tone?version=...&tones=emotion,language,social` with
//! `{"text": ...}`; the answer's `document_tone.tone_categories` is mapped
//! onto [`ToneAnalysis`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use tonechat_core::config::{Auth, ToneConfig};
use tonechat_core::error::{Result, ToneChatError};
use tonechat_core::types::{ServiceKind, ToneCategory, ToneScore};

use crate::http;
use crate::{CategoryScores, ToneAnalysis, ToneService};

const SERVICE: ServiceKind = ServiceKind::Tone;

/// Tone service backed by the tone analyzer REST API.
pub struct HttpToneService {
    client: Client,
    endpoint: String,
    version: String,
    sentences: bool,
    auth: Option<Auth>,
}

impl HttpToneService {
    pub fn new(config: &ToneConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http::client(SERVICE, timeout)?,
            endpoint: format!("{}/v3/tone", config.url.trim_end_matches('/')),
            version: config.version.clone(),
            sentences: config.sentences,
            auth: config.credentials.resolve(SERVICE),
        })
    }
}

#[async_trait]
impl ToneService for HttpToneService {
    async fn analyze(&self, text: &str, categories: &[ToneCategory]) -> Result<ToneAnalysis> {
        let tones = tones_param(categories);
        let sentences = self.sentences.to_string();
        let builder = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("version", self.version.as_str()),
                ("tones", tones.as_str()),
                ("sentences", sentences.as_str()),
            ])
            .json(&json!({ "text": text }));
        let response = http::send(SERVICE, http::authorize(builder, self.auth.as_ref())).await?;
        let value = http::json_body(SERVICE, response).await?;
        parse_analysis(value)
    }
}

/// Comma separated category list for the `tones` parameter.
pub fn tones_param(categories: &[ToneCategory]) -> String {
    categories
        .iter()
        .map(|c| c.request_name())
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Deserialize)]
struct ToneResponse {
    document_tone: DocumentTone,
}

#[derive(Deserialize)]
struct DocumentTone {
    #[serde(default)]
    tone_categories: Vec<WireCategory>,
}

#[derive(Deserialize)]
struct WireCategory {
    #[serde(default)]
    category_id: String,
    #[serde(default)]
    category_name: String,
    #[serde(default)]
    tones: Vec<WireTone>,
}

#[derive(Deserialize)]
struct WireTone {
    score: f64,
    #[serde(default)]
    tone_id: String,
    #[serde(default)]
    tone_name: String,
}

/// Decode a tone answer.
pub fn parse_analysis(value: Value) -> Result<ToneAnalysis> {
    let response: ToneResponse = serde_json::from_value(value).map_err(|e| {
        ToneChatError::service(SERVICE, None, format!("malformed tone response: {}", e))
    })?;
    let categories = response
        .document_tone
        .tone_categories
        .into_iter()
        .map(|c| CategoryScores {
            category_id: c.category_id,
            category_name: c.category_name,
            tones: c
                .tones
                .into_iter()
                .map(|t| ToneScore::new(t.tone_id, t.tone_name, t.score))
                .collect(),
        })
        .collect();
    Ok(ToneAnalysis { categories })
}
