//! Best-effort narration. Failures are logged by the caller and never abort a session.

pub mod nato;

use async_openai::{
    config::OpenAIConfig,
    types::{CreateSpeechRequestArgs, SpeechModel, SpeechResponseFormat, Voice},
    Client,
};
use async_trait::async_trait;
use std::env;
use tracing::info;

use crate::config::SpeechConfig;
use crate::error::SpeechError;

pub use nato::spell_nato;

/// Synthesized audio, addressable by `id`.
#[derive(Clone, Debug)]
pub struct SpeechClip {
    pub id: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait SpeechSynth: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SpeechClip, SpeechError>;
}

/// OpenAI text-to-speech.
#[derive(Clone)]
pub struct OpenAiSpeech {
    client: Client<OpenAIConfig>,
    model: SpeechModel,
    voice: Voice,
    format: SpeechResponseFormat,
    content_type: &'static str,
}

impl OpenAiSpeech {
    pub fn new(api_key: String, config: &SpeechConfig) -> Self {
        let client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
        let (format, content_type) = parse_format(&config.response_format);
        Self {
            client,
            model: parse_model(&config.model),
            voice: parse_voice(&config.voice),
            format,
            content_type,
        }
    }

    /// Built from `OPENAI_API_KEY`; `None` disables narration.
    pub fn from_env(config: &SpeechConfig) -> Option<Self> {
        let key = env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
        info!("🔊 [SPEECH] narration enabled (model: {})", config.model);
        Some(Self::new(key, config))
    }
}

#[async_trait]
impl SpeechSynth for OpenAiSpeech {
    async fn synthesize(&self, text: &str) -> Result<SpeechClip, SpeechError> {
        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .model(self.model.clone())
            .voice(self.voice.clone())
            .response_format(self.format.clone())
            .build()?;

        let response = self.client.audio().speech(request).await?;

        Ok(SpeechClip {
            id: uuid::Uuid::new_v4().simple().to_string(),
            bytes: response.bytes.to_vec(),
            content_type: self.content_type.to_string(),
        })
    }
}

fn parse_model(model: &str) -> SpeechModel {
    match model {
        "tts-1" => SpeechModel::Tts1,
        "tts-1-hd" => SpeechModel::Tts1Hd,
        other => SpeechModel::Other(other.to_string()),
    }
}

fn parse_voice(voice: &str) -> Voice {
    match voice.to_ascii_lowercase().as_str() {
        "echo" => Voice::Echo,
        "fable" => Voice::Fable,
        "onyx" => Voice::Onyx,
        "nova" => Voice::Nova,
        "shimmer" => Voice::Shimmer,
        _ => Voice::Alloy,
    }
}

fn parse_format(format: &str) -> (SpeechResponseFormat, &'static str) {
    match format.to_ascii_lowercase().as_str() {
        "opus" => (SpeechResponseFormat::Opus, "audio/ogg"),
        "aac" => (SpeechResponseFormat::Aac, "audio/aac"),
        "flac" => (SpeechResponseFormat::Flac, "audio/flac"),
        _ => (SpeechResponseFormat::Mp3, "audio/mpeg"),
    }
}
