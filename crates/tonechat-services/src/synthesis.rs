//! HTTP client for the text-to-speech service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::json;

use tonechat_core::config::{Auth, SynthesisConfig};
use tonechat_core::error::{Result, ToneChatError};
use tonechat_core::types::{AudioClip, ServiceKind};

use crate::http;
use crate::SpeechSynthesizer;

const SERVICE: ServiceKind = ServiceKind::Synthesis;

/// Speech synthesizer backed by the text-to-speech REST API.
pub struct HttpSpeechSynthesizer {
    client: Client,
    endpoint: String,
    voice: String,
    accept: String,
    auth: Option<Auth>,
}

impl HttpSpeechSynthesizer {
    pub fn new(config: &SynthesisConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http::client(SERVICE, timeout)?,
            endpoint: format!("{}/v1/synthesize", config.url.trim_end_matches('/')),
            voice: config.voice.clone(),
            accept: config.accept.clone(),
            auth: config.credentials.resolve(SERVICE),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        let builder = self
            .client
            .post(&self.endpoint)
            .query(&[("voice", self.voice.as_str())])
            .header(ACCEPT, &self.accept)
            .json(&json!({ "text": text }));
        let response = http::send(SERVICE, http::authorize(builder, self.auth.as_ref())).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| self.accept.clone());
        let data = response
            .bytes()
            .await
            .map_err(|e| http::transport_error(SERVICE, e))?
            .to_vec();

        if data.is_empty() {
            return Err(ToneChatError::service(
                SERVICE,
                None,
                "synthesis returned no audio",
            ));
        }
        tracing::debug!(bytes = data.len(), content_type = %content_type, "Audio synthesized");
        Ok(AudioClip::new(content_type, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_builds_endpoint() {
        let config = SynthesisConfig {
            url: "https://tts.example.test/api/".into(),
            ..SynthesisConfig::default()
        };
        let synth = HttpSpeechSynthesizer::new(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(synth.endpoint, "https://tts.example.test/api/v1/synthesize");
        assert_eq!(synth.accept, "audio/wav");
        assert_eq!(synth.voice, "en-US_MichaelVoice");
    }
}
