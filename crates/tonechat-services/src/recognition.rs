//! HTTP client for the speech-to-text service.
//!
//! Audio is pulled from a [`Microphone`] chunk by chunk. With interim
//! results enabled, everything captured so far is re-recognized after each
//! chunk and emitted as an interim transcript. When capture ends, one last
//! recognition produces the final transcript. A stop abandons any request
//! in flight; with interim results on, the latest interim becomes final.
//! Empty recognitions are never emitted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use tonechat_core::config::{Auth, RecognitionConfig};
use tonechat_core::error::{Result, ToneChatError};
use tonechat_core::types::{PartialTranscript, ServiceKind};

use crate::http;
use crate::{Microphone, RecognitionSettings, SpeechRecognizer};

const SERVICE: ServiceKind = ServiceKind::Recognition;

/// Speech recognizer backed by the speech-to-text REST API.
pub struct HttpSpeechRecognizer {
    client: Client,
    endpoint: String,
    model: String,
    auth: Option<Auth>,
    microphone: Arc<dyn Microphone>,
}

impl HttpSpeechRecognizer {
    pub fn new(
        config: &RecognitionConfig,
        microphone: Arc<dyn Microphone>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http::client(SERVICE, timeout)?,
            endpoint: format!("{}/v1/recognize", config.url.trim_end_matches('/')),
            model: config.model.clone(),
            auth: config.credentials.resolve(SERVICE),
            microphone,
        })
    }

    async fn transcribe(&self, audio: &[u8], content_type: &str) -> Result<String> {
        let builder = self
            .client
            .post(&self.endpoint)
            .query(&[("model", self.model.as_str())])
            .header(CONTENT_TYPE, content_type)
            .body(audio.to_vec());
        let response = http::send(SERVICE, http::authorize(builder, self.auth.as_ref())).await?;
        let value = http::json_body(SERVICE, response).await?;
        best_transcript(value)
    }
}

#[async_trait]
impl SpeechRecognizer for HttpSpeechRecognizer {
    async fn recognize(
        &self,
        settings: RecognitionSettings,
        results: mpsc::Sender<PartialTranscript>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut source = self.microphone.open(&settings.content_type).await?;
        let mut captured: Vec<u8> = Vec::new();
        let mut latest = String::new();
        let mut stopped = false;

        loop {
            if *stop.borrow() {
                stopped = true;
                break;
            }
            let chunk = tokio::select! {
                biased;
                _ = stop.changed() => {
                    stopped = true;
                    break;
                }
                chunk = source.next_chunk() => chunk?,
            };
            let Some(bytes) = chunk else {
                break;
            };
            captured.extend_from_slice(&bytes);

            if settings.interim_results {
                let text = tokio::select! {
                    biased;
                    _ = stop.changed() => {
                        stopped = true;
                        break;
                    }
                    text = self.transcribe(&captured, &settings.content_type) => text?,
                };
                if text.is_empty() {
                    continue;
                }
                latest = text.clone();
                if results.send(PartialTranscript::interim(text)).await.is_err() {
                    return Ok(());
                }
            }
        }

        if captured.is_empty() {
            return Ok(());
        }
        let text = if stopped && settings.interim_results {
            tracing::debug!(bytes = captured.len(), "Stopped; latest interim transcript stands");
            latest
        } else {
            let text = self.transcribe(&captured, &settings.content_type).await?;
            tracing::debug!(bytes = captured.len(), "Final transcript recognized");
            if text.is_empty() {
                latest
            } else {
                text
            }
        };
        if text.is_empty() {
            return Ok(());
        }
        // The receiver may already be gone; the session is over either way.
        let _ = results.send(PartialTranscript::last(text)).await;
        Ok(())
    }
}

#[derive(Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognizeResult>,
}

#[derive(Deserialize)]
struct RecognizeResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Deserialize)]
struct Alternative {
    transcript: String,
}

/// Concatenate the top alternative of every result.
pub fn best_transcript(value: Value) -> Result<String> {
    let response: RecognizeResponse = serde_json::from_value(value).map_err(|e| {
        ToneChatError::service(SERVICE, None, format!("malformed recognition response: {}", e))
    })?;
    Ok(response
        .results
        .iter()
        .filter_map(|r| r.alternatives.first())
        .map(|a| a.transcript.as_str())
        .collect::<String>()
        .trim()
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use serde_json::json;

    use crate::testing::{self, Canned};
    use crate::AudioSource;

    /// Microphone yielding fixed chunks, then either ending or going quiet.
    struct ChunkMicrophone {
        chunks: Vec<Vec<u8>>,
        ends: bool,
    }

    struct ChunkSource {
        chunks: VecDeque<Vec<u8>>,
        ends: bool,
    }

    #[async_trait]
    impl Microphone for ChunkMicrophone {
        async fn open(&self, _content_type: &str) -> Result<Box<dyn AudioSource>> {
            Ok(Box::new(ChunkSource {
                chunks: self.chunks.iter().cloned().collect(),
                ends: self.ends,
            }))
        }
    }

    #[async_trait]
    impl AudioSource for ChunkSource {
        async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
            if let Some(chunk) = self.chunks.pop_front() {
                return Ok(Some(chunk));
            }
            if !self.ends {
                std::future::pending::<()>().await;
            }
            Ok(None)
        }
    }

    fn transcript(text: &str) -> Canned {
        Canned::json(200, json!({"results": [{"alternatives": [{"transcript": text}]}]}))
    }

    fn recognizer(url: String, microphone: ChunkMicrophone) -> HttpSpeechRecognizer {
        let config = RecognitionConfig {
            url,
            ..RecognitionConfig::default()
        };
        HttpSpeechRecognizer::new(&config, Arc::new(microphone), Duration::from_secs(10)).unwrap()
    }

    fn settings() -> RecognitionSettings {
        RecognitionSettings {
            content_type: "audio/wav".into(),
            interim_results: true,
        }
    }

    async fn collect(mut rx: mpsc::Receiver<PartialTranscript>) -> Vec<PartialTranscript> {
        let mut seen = Vec::new();
        while let Some(transcript) = rx.recv().await {
            seen.push(transcript);
        }
        seen
    }

    #[tokio::test]
    async fn test_empty_interim_is_not_emitted() {
        let url = testing::serve(vec![
            Canned::json(200, json!({"results": []})),
            transcript("hello"),
            transcript("hello there"),
        ])
        .await;
        let microphone = ChunkMicrophone {
            chunks: vec![b"aa".to_vec(), b"bb".to_vec()],
            ends: true,
        };
        let (tx, rx) = mpsc::channel(8);
        let (_stop_tx, stop_rx) = watch::channel(false);

        recognizer(url, microphone)
            .recognize(settings(), tx, stop_rx)
            .await
            .unwrap();

        let seen = collect(rx).await;
        assert_eq!(
            seen,
            vec![
                PartialTranscript::interim("hello"),
                PartialTranscript::last("hello there"),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_final_keeps_latest_interim() {
        let url = testing::serve(vec![
            transcript("hello"),
            Canned::json(200, json!({"results": []})),
        ])
        .await;
        let microphone = ChunkMicrophone {
            chunks: vec![b"aa".to_vec()],
            ends: true,
        };
        let (tx, rx) = mpsc::channel(8);
        let (_stop_tx, stop_rx) = watch::channel(false);

        recognizer(url, microphone)
            .recognize(settings(), tx, stop_rx)
            .await
            .unwrap();

        let seen = collect(rx).await;
        assert_eq!(
            seen,
            vec![
                PartialTranscript::interim("hello"),
                PartialTranscript::last("hello"),
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_abandons_recognition_in_flight() {
        let url = testing::serve(vec![Canned::Stall]).await;
        let microphone = ChunkMicrophone {
            chunks: vec![b"aa".to_vec()],
            ends: false,
        };
        let (tx, rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);
        let recognizer = recognizer(url, microphone);

        let session =
            tokio::spawn(async move { recognizer.recognize(settings(), tx, stop_rx).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), session)
            .await
            .expect("stop returns while the service is still silent")
            .unwrap();
        assert!(result.is_ok());
        assert!(collect(rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_promotes_latest_interim_to_final() {
        let url = testing::serve(vec![transcript("i am furious")]).await;
        let microphone = ChunkMicrophone {
            chunks: vec![b"aa".to_vec()],
            ends: false,
        };
        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);
        let recognizer = recognizer(url, microphone);

        let session =
            tokio::spawn(async move { recognizer.recognize(settings(), tx, stop_rx).await });
        let interim = rx.recv().await.unwrap();
        assert_eq!(interim, PartialTranscript::interim("i am furious"));
        stop_tx.send(true).unwrap();

        session.await.unwrap().unwrap();
        assert_eq!(collect(rx).await, vec![PartialTranscript::last("i am furious")]);
    }

    #[test]
    fn test_best_transcript_joins_results() {
        let value = json!({
            "results": [
                {"alternatives": [{"transcript": "i am ", "confidence": 0.9}], "final": true},
                {"alternatives": [{"transcript": "furious "}, {"transcript": "curious "}], "final": false}
            ],
            "result_index": 0
        });
        assert_eq!(best_transcript(value).unwrap(), "i am furious");
    }

    #[test]
    fn test_best_transcript_empty_results() {
        assert_eq!(best_transcript(json!({"results": []})).unwrap(), "");
        assert_eq!(best_transcript(json!({})).unwrap(), "");
    }

    #[test]
    fn test_best_transcript_malformed() {
        let err = best_transcript(json!({"results": [{"alternatives": [{"confidence": 1}]}]}))
            .unwrap_err();
        assert!(matches!(err, ToneChatError::Service { .. }));
    }
}
