use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

mod cache;
mod http;
pub use cache::{cache_key, TextToSpeechCache};
pub use http::HttpTextToSpeech;


#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SynthesisConfig {
    pub url: Option<String>,
    pub voice: Option<String>,
    pub rate: Option<f32>,
    /// Where generated speech is kept when no explicit file is named.
    pub cache_dir: Option<String>,
}

impl SynthesisConfig {
    pub fn cache_dir(&self) -> PathBuf {
        match &self.cache_dir {
            Some(dir) => PathBuf::from(dir),
            None => std::env::temp_dir().join("ivrkit-tts"),
        }
    }

    /// Build the client this configuration describes.
    pub fn create_client(&self) -> Result<Arc<dyn TextToSpeech>> {
        Ok(Arc::new(HttpTextToSpeech::new(self)?))
    }
}

/// Turns text into playable audio.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Bytes>;
}
