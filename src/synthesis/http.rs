use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client as HttpClient;
use serde::Serialize;
use tracing::debug;

use super::SynthesisConfig;
use super::TextToSpeech;
use crate::version::get_useragent;

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rate: Option<f32>,
}

/// Speech engine reached over HTTP: the text goes out as JSON, the
/// response body is the audio.
#[derive(Debug)]
pub struct HttpTextToSpeech {
    http_client: HttpClient,
    url: String,
    voice: Option<String>,
    rate: Option<f32>,
}

impl HttpTextToSpeech {
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| anyhow!("Missing text to speech url"))?;
        let http_client = HttpClient::builder()
            .user_agent(get_useragent())
            .build()?;
        Ok(Self {
            http_client,
            url,
            voice: config.voice.clone(),
            rate: config.rate,
        })
    }
}

#[async_trait]
impl TextToSpeech for HttpTextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        let request = SynthesisRequest {
            text,
            voice: self.voice.as_deref(),
            rate: self.rate,
        };

        let request_start_time = std::time::Instant::now();
        let response = self
            .http_client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let audio = response.bytes().await?;

        debug!(
            url = %self.url,
            bytes = audio.len(),
            elapsed_ms = request_start_time.elapsed().as_millis() as u64,
            "synthesized text"
        );
        Ok(audio)
    }
}
