//! Hosted speech-to-text backend.
//!
//! Uploads converted audio to an OpenAI-compatible transcription endpoint
//! as a multipart WAV file and maps the JSON response to a
//! [`TranscriptResult`]. Every transport or API failure is captured in the
//! result's `error` field; the adapter itself never fails.

use crate::convert::AudioFormat;
use crate::stt::{TranscriptResult, TranscriptionBackend};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::debug;

pub struct RemoteApiBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    format: AudioFormat,
}

impl RemoteApiBackend {
    pub fn new(endpoint: String, api_key: String, model: String, format: AudioFormat) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model,
            format,
        }
    }

    async fn request(&self, audio: &[u8]) -> anyhow::Result<String> {
        let wav = wrap_wav(audio, self.format)?;
        debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            upload_bytes = wav.len(),
            "uploading utterance"
        );

        let part = Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("transcription request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error {status}: {}", body.trim());
        }

        let json: serde_json::Value = response
            .json()
            .await
            .context("invalid transcription response body")?;
        Ok(json["text"].as_str().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl TranscriptionBackend for RemoteApiBackend {
    async fn transcribe(&self, audio: &[u8]) -> TranscriptResult {
        match self.request(audio).await {
            Ok(text) => TranscriptResult::from_text(text),
            Err(e) => TranscriptResult::from_error(format!("{e:#}")),
        }
    }

    fn name(&self) -> &'static str {
        "remote-api"
    }
}

/// Wrap raw s16le PCM in a WAV container for upload.
fn wrap_wav(pcm: &[u8], format: AudioFormat) -> anyhow::Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for sample in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
