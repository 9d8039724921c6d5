use crate::error::{Result, VoiceError};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::create_dir_all;
use tracing::{debug, info};

use super::TextToSpeech;

/// File stem used for `text` inside a cache directory.
pub fn cache_key(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Speech for one piece of text, optionally kept in a wav file.
///
/// A wav is reused only while the `.txt` file beside it still holds the
/// exact same text.
#[derive(Clone)]
pub struct TextToSpeechCache {
    tts: Option<Arc<dyn TextToSpeech>>,
    text: String,
    wav_file: Option<PathBuf>,
}

impl TextToSpeechCache {
    pub fn new(
        tts: Option<Arc<dyn TextToSpeech>>,
        text: impl Into<String>,
        wav_file: Option<PathBuf>,
    ) -> Self {
        Self {
            tts,
            text: text.into(),
            wav_file,
        }
    }

    /// Cache under `dir`, named after the hash of the text.
    pub fn in_dir(tts: Option<Arc<dyn TextToSpeech>>, text: impl Into<String>, dir: &Path) -> Self {
        let text = text.into();
        let wav_file = dir.join(cache_key(&text)).with_extension("wav");
        Self::new(tts, text, Some(wav_file))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cache_file_name(&self) -> Option<&Path> {
        self.wav_file.as_deref()
    }

    /// Cached audio if it is still current, freshly synthesized otherwise.
    pub async fn get_or_generate(&self) -> Result<Bytes> {
        if let Some(wav) = &self.wav_file {
            if is_cached(wav, &self.text).await? {
                debug!(file = %wav.display(), "tts cache hit");
                return Ok(tokio::fs::read(wav).await?.into());
            }
        }
        self.generate().await
    }

    /// Synthesize unconditionally, refreshing the cached file if there is one.
    pub async fn generate(&self) -> Result<Bytes> {
        let tts = self
            .tts
            .as_ref()
            .ok_or_else(|| VoiceError::Voice("Missing text to speech engine".to_string()))?;
        let audio = tts.synthesize(&self.text).await?;

        if let Some(wav) = &self.wav_file {
            if let Some(parent) = wav.parent() {
                if !parent.as_os_str().is_empty() {
                    create_dir_all(parent).await?;
                }
            }
            let tmp = wav.with_extension("wav.tmp");
            tokio::fs::write(&tmp, &audio).await?;
            tokio::fs::rename(&tmp, wav).await?;
            tokio::fs::write(sidecar(wav), self.text.as_bytes()).await?;
            info!(file = %wav.display(), bytes = audio.len(), "tts cache stored");
        }
        Ok(audio)
    }
}

impl std::fmt::Debug for TextToSpeechCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextToSpeechCache")
            .field("text", &self.text)
            .field("wav_file", &self.wav_file)
            .field("has_engine", &self.tts.is_some())
            .finish()
    }
}

fn sidecar(wav: &Path) -> PathBuf {
    wav.with_extension("txt")
}

async fn is_cached(wav: &Path, text: &str) -> Result<bool> {
    if !tokio::fs::try_exists(wav).await? {
        return Ok(false);
    }
    match tokio::fs::read_to_string(sidecar(wav)).await {
        Ok(cached) => Ok(cached == text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
