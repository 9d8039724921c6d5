//! Sample call flow answered by the `ivrkit` binary.
//!
//! welcome → main menu → (echo digits | record and play back | goodbye).

use crate::error::{Result, VoiceError};
use crate::line::Line;
use crate::prompt::{MultiTryPromptOptions, PromptOptions};
use crate::script::{Next, Script};
use crate::synthesis::{TextToSpeech, TextToSpeechCache};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const WELCOME_FILE: &str = "welcome.wav";
pub const WELCOME_TEXT: &str = "Welcome. Please listen to the following options.";
pub const MAIN_MENU_FILE: &str = "main-menu.wav";
pub const INVALID_OPTION_FILE: &str = "invalid-option.wav";
pub const ENTER_DIGITS_FILE: &str = "enter-digits.wav";
pub const RECORD_AFTER_TONE_FILE: &str = "record-after-tone.wav";
pub const GOODBYE_FILE: &str = "goodbye.wav";

const MENU_ATTEMPTS: u32 = 3;

/// Shared by every script of one call.
#[derive(Clone)]
pub struct DemoContext {
    /// Speaks the welcome when set; otherwise [`WELCOME_FILE`] is played.
    pub tts: Option<Arc<dyn TextToSpeech>>,
    pub tts_cache_dir: PathBuf,
    pub recordings_dir: PathBuf,
}

impl Default for DemoContext {
    fn default() -> Self {
        Self {
            tts: None,
            tts_cache_dir: std::env::temp_dir().join("ivrkit-tts"),
            recordings_dir: PathBuf::from("recordings"),
        }
    }
}

/// First script of the demo flow.
pub fn welcome(context: DemoContext) -> Box<dyn Script> {
    Box::new(Welcome { context })
}

struct Welcome {
    context: DemoContext,
}

#[async_trait]
impl Script for Welcome {
    fn description(&self) -> &str {
        "welcome"
    }

    async fn execute(&mut self, line: &mut Line, cancel: &CancellationToken) -> Result<Next> {
        info!(line = line.line_number(), "call answered");
        match &self.context.tts {
            Some(tts) => {
                let cache = TextToSpeechCache::in_dir(
                    Some(tts.clone()),
                    WELCOME_TEXT,
                    &self.context.tts_cache_dir,
                );
                line.play_text_to_speech(&cache, cancel).await?;
            }
            None => line.play_file(WELCOME_FILE, cancel).await?,
        }
        Ok(Next::script(MainMenu {
            context: self.context.clone(),
        }))
    }
}

struct MainMenu {
    context: DemoContext,
}

#[async_trait]
impl Script for MainMenu {
    fn description(&self) -> &str {
        "main menu"
    }

    async fn execute(&mut self, line: &mut Line, cancel: &CancellationToken) -> Result<Next> {
        let options = MultiTryPromptOptions {
            max_length: 1,
            allowed_digits: "123".to_string(),
            max_attempts: Some(MENU_ATTEMPTS),
            blank_max_attempts: Some(MENU_ATTEMPTS),
            invalid_answer_message: Some(INVALID_OPTION_FILE.to_string()),
            ..Default::default()
        };
        let choice = match line
            .multi_try_prompt(MAIN_MENU_FILE, None, &options, cancel)
            .await
        {
            Ok(choice) => choice,
            Err(VoiceError::TooManyAttempts) => return Ok(Next::script(Goodbye)),
            Err(e) => return Err(e),
        };

        let context = self.context.clone();
        Ok(match choice.as_str() {
            "1" => Next::script(EchoDigits { context }),
            "2" => Next::script(RecordMessage { context }),
            _ => Next::script(Goodbye),
        })
    }
}

/// Reads back whatever the caller keys in.
struct EchoDigits {
    context: DemoContext,
}

#[async_trait]
impl Script for EchoDigits {
    fn description(&self) -> &str {
        "echo digits"
    }

    async fn execute(&mut self, line: &mut Line, cancel: &CancellationToken) -> Result<Next> {
        match line
            .prompt(ENTER_DIGITS_FILE, &PromptOptions::default(), cancel)
            .await
        {
            Ok(digits) => line.play_characters(&digits, cancel).await?,
            Err(VoiceError::TooManyAttempts) => {}
            Err(e) => return Err(e),
        }
        Ok(Next::script(MainMenu {
            context: self.context.clone(),
        }))
    }
}

struct RecordMessage {
    context: DemoContext,
}

#[async_trait]
impl Script for RecordMessage {
    fn description(&self) -> &str {
        "record message"
    }

    async fn execute(&mut self, line: &mut Line, cancel: &CancellationToken) -> Result<Next> {
        let path = self
            .context
            .recordings_dir
            .join(format!("line-{}.wav", line.line_number()));
        let filename = path.to_string_lossy().into_owned();

        line.play_file(RECORD_AFTER_TONE_FILE, cancel).await?;
        line.record_to_file(&filename, cancel).await?;
        info!(line = line.line_number(), filename = %filename, "message recorded");
        line.play_file(&filename, cancel).await?;

        Ok(Next::script(MainMenu {
            context: self.context.clone(),
        }))
    }
}

struct Goodbye;

#[async_trait]
impl Script for Goodbye {
    fn description(&self) -> &str {
        "goodbye"
    }

    async fn execute(&mut self, line: &mut Line, cancel: &CancellationToken) -> Result<Next> {
        line.play_file(GOODBYE_FILE, cancel).await?;
        line.hangup().await?;
        Ok(Next::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::testing::{fake_line, test_properties, Call};
    use crate::line::LineStatus;
    use crate::script::ScriptManager;

    async fn run(line: &mut Line, context: DemoContext) -> Result<()> {
        ScriptManager::new(line, welcome(context), CancellationToken::new())
            .run()
            .await
    }

    #[tokio::test]
    async fn test_menu_goodbye() {
        let (mut line, fake) = fake_line(1);
        fake.digits("3#");

        run(&mut line, DemoContext::default()).await.unwrap();
        assert_eq!(
            fake.played(),
            vec![WELCOME_FILE, MAIN_MENU_FILE, GOODBYE_FILE]
        );
        assert_eq!(fake.count(|c| *c == Call::Hangup), 1);
        assert_eq!(line.status(), LineStatus::OnHook);
        line.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_choices_end_the_call() {
        let (mut line, fake) = fake_line(1);
        fake.digits("9#").digits("9#").digits("9#");

        run(&mut line, DemoContext::default()).await.unwrap();
        let played = fake.played();
        assert_eq!(played.iter().filter(|f| *f == MAIN_MENU_FILE).count(), 3);
        assert_eq!(
            played.iter().filter(|f| *f == INVALID_OPTION_FILE).count(),
            3
        );
        assert_eq!(played.last().map(String::as_str), Some(GOODBYE_FILE));
        line.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn test_echo_reads_digits_back() {
        let (mut line, fake) = fake_line(1);
        fake.digits("1#").digits("42#").digits("3#");

        run(&mut line, DemoContext::default()).await.unwrap();
        let properties = test_properties();
        assert_eq!(
            fake.played(),
            vec![
                WELCOME_FILE.to_string(),
                MAIN_MENU_FILE.to_string(),
                ENTER_DIGITS_FILE.to_string(),
                properties.system_recording("4"),
                properties.system_recording("2"),
                MAIN_MENU_FILE.to_string(),
                GOODBYE_FILE.to_string(),
            ]
        );
        line.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn test_record_and_play_back() {
        let (mut line, fake) = fake_line(7);
        fake.digits("2#").digits("3#");
        let dir = tempfile::tempdir().unwrap();
        let context = DemoContext {
            recordings_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        run(&mut line, context).await.unwrap();
        let recording = dir.path().join("line-7.wav").to_string_lossy().into_owned();
        assert_eq!(
            fake.count(|c| matches!(c, Call::Record { filename, .. } if *filename == recording)),
            1
        );
        assert!(fake.played().contains(&recording));
        line.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn test_hangup_stops_the_flow() {
        let (mut line, fake) = fake_line(1);
        fake.digits_error(VoiceError::Hangup);

        let err = run(&mut line, DemoContext::default()).await.unwrap_err();
        assert!(err.is_hangup());
        assert_eq!(line.status(), LineStatus::OnHook);
        line.dispose().await.unwrap();
    }
}
