use anyhow::Error;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::synthesis::SynthesisConfig;

#[derive(Parser, Debug)]
#[command(version = crate::version::get_short_version())]
pub struct Cli {
    /// Configuration file; `ivrkit.toml` is used when present and this is not given.
    #[clap(long)]
    pub conf: Option<String>,
}

pub const DEFAULT_CONFIG_FILE: &str = "ivrkit.toml";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    /// Number of simulator lines the binary answers on.
    pub lines: u32,
    pub voice: VoiceProperties,
    pub simulator: SimulatorConfig,
    pub tts: Option<SynthesisConfig>,
}

/// Voice settings shared by every line of a [`LineManager`](crate::LineManager).
///
/// Read-only from the line's point of view; each line keeps its own copy.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct VoiceProperties {
    /// Total attempts at a multi-try prompt before `TooManyAttempts`.
    pub prompt_attempts: u32,
    /// Consecutive blank attempts at a multi-try prompt before `TooManyAttempts`.
    pub prompt_blank_attempts: u32,
    /// Milliseconds of silence between key presses that ends digit collection.
    pub digits_timeout_ms: u64,
    /// Greeting length beyond which a dial result is considered an answering machine.
    pub answering_machine_threshold_ms: u64,
    /// Default recording limit.
    pub record_timeout_ms: u64,
    /// How long an outbound dial may ring before it is reported as no answer.
    pub dial_timeout_ms: u64,
    /// Pause inserted for a space when speaking characters.
    pub phrase_pause_ms: u64,
    /// Directory holding the spoken characters (`1.wav`, `star.wav`, ...).
    pub system_recordings: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulatorConfig {
    pub addr: String,
}

impl VoiceProperties {
    pub fn digits_timeout(&self) -> Duration {
        Duration::from_millis(self.digits_timeout_ms)
    }

    pub fn answering_machine_threshold(&self) -> Duration {
        Duration::from_millis(self.answering_machine_threshold_ms)
    }

    pub fn record_timeout(&self) -> Duration {
        Duration::from_millis(self.record_timeout_ms)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn phrase_pause(&self) -> Duration {
        Duration::from_millis(self.phrase_pause_ms)
    }

    /// Path of a system recording such as `star` or `7`.
    pub fn system_recording(&self, name: &str) -> String {
        format!("{}/{}.wav", self.system_recordings, name)
    }
}

impl Default for VoiceProperties {
    fn default() -> Self {
        Self {
            prompt_attempts: 99,
            prompt_blank_attempts: 5,
            digits_timeout_ms: 5000,
            answering_machine_threshold_ms: 4000,
            record_timeout_ms: 5 * 60 * 1000,
            dial_timeout_ms: 30_000,
            phrase_pause_ms: 500,
            system_recordings: "System Recordings".to_string(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:6050".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            log_file: None,
            lines: 4,
            voice: VoiceProperties::default(),
            simulator: SimulatorConfig::default(),
            tts: None,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let config = toml::from_str(
            &std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("{}: {}", e, path))?,
        )?;
        Ok(config)
    }

    /// Load the file named on the command line, or the default file if it exists.
    pub fn resolve(conf: Option<&str>) -> Result<Self, Error> {
        match conf {
            Some(path) => Self::load(path),
            None if std::path::Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load(DEFAULT_CONFIG_FILE)
            }
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_voice_properties() {
        let config = Config::default();
        assert_eq!(config.voice.prompt_attempts, 99);
        assert_eq!(config.voice.prompt_blank_attempts, 5);
        assert_eq!(config.voice.digits_timeout(), Duration::from_millis(5000));
        assert_eq!(config.simulator.addr, "127.0.0.1:6050");
        assert!(config.tts.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            log_level = "debug"
            lines = 2

            [voice]
            prompt_attempts = 3
            digits_timeout_ms = 1500

            [tts]
            url = "http://127.0.0.1:8000/tts"
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.lines, 2);
        assert_eq!(config.voice.prompt_attempts, 3);
        assert_eq!(config.voice.prompt_blank_attempts, 5);
        assert_eq!(config.voice.digits_timeout_ms, 1500);
        assert_eq!(
            config.tts.unwrap().url.as_deref(),
            Some("http://127.0.0.1:8000/tts")
        );
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = Config::load("/nonexistent/ivrkit.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ivrkit.toml"));
    }

    #[test]
    fn test_explicit_conf_must_exist() {
        let err = Config::resolve(Some("/nonexistent/other.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/other.toml"));
    }

    #[test]
    fn test_explicit_conf_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lines.toml");
        std::fs::write(&path, "lines = 9\n").unwrap();
        let config = Config::resolve(path.to_str()).unwrap();
        assert_eq!(config.lines, 9);
    }

    #[test]
    fn test_answering_machine_threshold() {
        let voice = VoiceProperties::default();
        assert_eq!(voice.answering_machine_threshold(), Duration::from_millis(4000));
    }
}
