//! Speech-to-text over an OpenAI-compatible `/audio/transcriptions` endpoint

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use sipbot_audio::AudioClip;
use tracing::debug;

use crate::engine::Transcriber;
use crate::error::{AssistError, Result};

/// Default transcription model
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Whisper-style transcriber. The clip is uploaded as a 16-bit mono WAV.
pub struct OpenAiTranscriber {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiTranscriber {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url)
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, clip: &AudioClip) -> Result<String> {
        let wav = clip.to_wav_bytes()?;
        debug!(
            "Uploading {:.2}s clip ({} bytes) for transcription",
            clip.duration_secs(),
            wav.len()
        );

        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AssistError::from_response(response).await);
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| AssistError::parse(format!("transcription body: {}", e)))?;

        Ok(body.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn clip() -> AudioClip {
        AudioClip::new(vec![0.1; 1600], 16000)
    }

    fn transcriber(base: &str) -> OpenAiTranscriber {
        OpenAiTranscriber::new("sk-test", base, DEFAULT_TRANSCRIPTION_MODEL, Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn test_transcribe_returns_trimmed_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "text": "  I need help  " })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let stt = transcriber(&format!("{}/v1/", server.uri()));
        let text = stt.transcribe(&clip()).await.unwrap();
        assert_eq!(text, "I need help");
    }

    #[tokio::test]
    async fn test_transcribe_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let stt = transcriber(&server.uri());
        match stt.transcribe(&clip()).await {
            Err(AssistError::Api { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad key");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transcribe_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let stt = transcriber(&server.uri());
        assert!(matches!(
            stt.transcribe(&clip()).await,
            Err(AssistError::Parse(_))
        ));
    }
}
