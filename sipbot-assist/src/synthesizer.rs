//! Text-to-speech over the ElevenLabs REST API
//!
//! Audio is requested as raw 16 kHz PCM and written out as a WAV file, which
//! is what baresip's `aufile` player expects.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use sipbot_audio::AudioClip;
use tracing::debug;

use crate::engine::Synthesizer;
use crate::error::{AssistError, Result};

/// Default synthesis model
pub const DEFAULT_TTS_MODEL: &str = "eleven_monolingual_v1";

/// Sample rate of the requested `pcm_16000` output format
const PCM_SAMPLE_RATE: u32 = 16000;

/// Premade voices addressable by name
const PREMADE_VOICES: &[(&str, &str)] = &[
    ("rachel", "21m00Tcm4TlvDq8ikWAM"),
    ("adam", "pNInz6obpgDQGcFmaJgB"),
    ("bella", "EXAVITQu4vr4xnEE6YPK"),
    ("antoni", "ErXwobaYiN019PkySvjV"),
];

/// Map a premade voice name to its ID; anything else is taken to be an ID already.
pub fn resolve_voice_id(voice: &str) -> &str {
    PREMADE_VOICES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(voice))
        .map(|(_, id)| *id)
        .unwrap_or(voice)
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

pub struct ElevenLabsSynthesizer {
    client: Client,
    api_key: String,
    base_url: String,
    voice_id: String,
    model: String,
}

impl ElevenLabsSynthesizer {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        voice: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        if voice.trim().is_empty() {
            return Err(AssistError::config("synthesis voice is empty"));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            voice_id: resolve_voice_id(voice.trim()).to_string(),
            model: model.into(),
        })
    }

    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id)
    }
}

/// Little-endian signed 16-bit PCM to normalized samples; a trailing odd byte is dropped.
fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
        .collect()
}

#[async_trait]
impl Synthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<PathBuf> {
        let request = SpeechRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("output_format", "pcm_16000")])
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AssistError::from_response(response).await);
        }

        let bytes = response.bytes().await?;
        let samples = pcm16_to_f32(&bytes);
        if samples.is_empty() {
            return Err(AssistError::Empty("synthesis"));
        }

        let clip = AudioClip::new(samples, PCM_SAMPLE_RATE);
        clip.write_wav(output)?;
        debug!(
            "Synthesized {:.2}s of speech to {}",
            clip.duration_secs(),
            output.display()
        );

        Ok(output.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn synthesizer(base: &str, voice: &str) -> ElevenLabsSynthesizer {
        ElevenLabsSynthesizer::new("xi-test", base, voice, DEFAULT_TTS_MODEL, Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn test_resolve_voice_id() {
        assert_eq!(resolve_voice_id("Rachel"), "21m00Tcm4TlvDq8ikWAM");
        assert_eq!(resolve_voice_id("rachel"), "21m00Tcm4TlvDq8ikWAM");
        assert_eq!(resolve_voice_id("customVoiceId123"), "customVoiceId123");
    }

    #[test]
    fn test_empty_voice_rejected() {
        let result = ElevenLabsSynthesizer::new(
            "k",
            "http://localhost",
            "  ",
            DEFAULT_TTS_MODEL,
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(AssistError::ConfigError(_))));
    }

    #[test]
    fn test_pcm16_to_f32() {
        let bytes = [0x00, 0x00, 0xff, 0x7f, 0x01, 0x80, 0x05];
        let samples = pcm16_to_f32(&bytes);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[1], 1.0);
        assert_eq!(samples[2], -1.0);
    }

    #[tokio::test]
    async fn test_synthesize_writes_wav() {
        let server = MockServer::start().await;
        let pcm: Vec<u8> = (0..1600i16).flat_map(|s| (s * 10).to_le_bytes()).collect();
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/21m00Tcm4TlvDq8ikWAM"))
            .and(query_param("output_format", "pcm_16000"))
            .and(header("xi-api-key", "xi-test"))
            .and(body_partial_json(serde_json::json!({
                "text": "Hello there",
                "model_id": DEFAULT_TTS_MODEL,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(pcm))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let output = dir.path().join("response.wav");
        let tts = synthesizer(&server.uri(), "Rachel");
        let written = tts.synthesize("Hello there", &output).await.unwrap();

        assert_eq!(written, output);
        let reader = hound::WavReader::open(&output).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 1600);
    }

    #[tokio::test]
    async fn test_synthesize_empty_body_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let output = dir.path().join("response.wav");
        let tts = synthesizer(&server.uri(), "Rachel");
        assert!(matches!(
            tts.synthesize("Hello", &output).await,
            Err(AssistError::Empty(_))
        ));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_synthesize_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let tts = synthesizer(&server.uri(), "voice-xyz");
        match tts.synthesize("Hello", &dir.path().join("r.wav")).await {
            Err(AssistError::Api { status, .. }) => assert_eq!(status, 429),
            other => panic!("expected Api error, got {:?}", other),
        }
    }
}
