//! Ask-until-valid digit collection.
//!
//! [`Line::prompt`] plays a prompt and collects one answer.
//! [`Line::multi_try_prompt`] repeats that until the answer validates or
//! the attempt budgets run out, which raises
//! [`VoiceError::TooManyAttempts`].
//!
//! Timeouts are reported by the backend as the `t` terminator. A timeout
//! only ends an answer when `t` is one of the configured terminators and
//! the answer is non-empty (or empty answers are allowed); otherwise the
//! attempt counts as timed out.

use crate::error::{Result, VoiceError};
use crate::line::{Line, TIMEOUT_TERMINATOR};
use crate::synthesis::TextToSpeechCache;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

mod phrase;

/// Answer check supplied by the script.
pub type Validator = dyn Fn(&str) -> bool + Send + Sync;

pub const DEFAULT_TERMINATORS: &str = "#";
pub const DEFAULT_MAX_LENGTH: usize = 30;
pub const DEFAULT_ALLOWED_DIGITS: &str = "0123456789*#";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOptions {
    pub max_length: usize,
    pub terminators: String,
    /// Every character of an accepted answer must be one of these. Empty
    /// accepts anything.
    pub allowed_digits: String,
    pub allow_empty: bool,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            terminators: DEFAULT_TERMINATORS.to_string(),
            allowed_digits: DEFAULT_ALLOWED_DIGITS.to_string(),
            allow_empty: false,
        }
    }
}

#[derive(Clone)]
pub struct MultiTryPromptOptions {
    pub max_length: usize,
    pub terminators: String,
    pub allowed_digits: String,
    pub allow_empty: bool,
    /// Falls back to `VoiceProperties::prompt_attempts`.
    pub max_attempts: Option<u32>,
    /// Falls back to `VoiceProperties::prompt_blank_attempts`.
    pub blank_max_attempts: Option<u32>,
    /// File or phrase played after a rejected answer.
    pub invalid_answer_message: Option<String>,
    /// Pressing this runs `on_special_terminator` and replays the prompt
    /// without using up an attempt.
    pub special_terminator: Option<char>,
    pub on_special_terminator: Option<Arc<dyn Fn() + Send + Sync>>,
    /// When false, running out of attempts returns an empty answer.
    pub catch_too_many_attempts: bool,
}

impl Default for MultiTryPromptOptions {
    fn default() -> Self {
        PromptOptions::default().into()
    }
}

impl From<PromptOptions> for MultiTryPromptOptions {
    fn from(options: PromptOptions) -> Self {
        Self {
            max_length: options.max_length,
            terminators: options.terminators,
            allowed_digits: options.allowed_digits,
            allow_empty: options.allow_empty,
            max_attempts: None,
            blank_max_attempts: None,
            invalid_answer_message: None,
            special_terminator: None,
            on_special_terminator: None,
            catch_too_many_attempts: true,
        }
    }
}

impl std::fmt::Debug for MultiTryPromptOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiTryPromptOptions")
            .field("max_length", &self.max_length)
            .field("terminators", &self.terminators)
            .field("allowed_digits", &self.allowed_digits)
            .field("allow_empty", &self.allow_empty)
            .field("max_attempts", &self.max_attempts)
            .field("blank_max_attempts", &self.blank_max_attempts)
            .field("invalid_answer_message", &self.invalid_answer_message)
            .field("special_terminator", &self.special_terminator)
            .field("catch_too_many_attempts", &self.catch_too_many_attempts)
            .finish()
    }
}

/// What a prompt plays before collecting digits.
#[derive(Debug, Clone)]
pub enum PromptSource {
    /// A wav file, or a phrase when the text contains `|`.
    FileOrPhrase(String),
    TextToSpeech(TextToSpeechCache),
}

impl From<&str> for PromptSource {
    fn from(value: &str) -> Self {
        PromptSource::FileOrPhrase(value.to_string())
    }
}

impl From<String> for PromptSource {
    fn from(value: String) -> Self {
        PromptSource::FileOrPhrase(value)
    }
}

impl From<TextToSpeechCache> for PromptSource {
    fn from(value: TextToSpeechCache) -> Self {
        PromptSource::TextToSpeech(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Accepted,
    Rejected,
    TimedOut,
    Special,
}

impl Line {
    /// Play `source` once and collect one answer.
    pub async fn prompt(
        &mut self,
        source: impl Into<PromptSource>,
        options: &PromptOptions,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let source = source.into();
        debug!(line = self.line_number(), ?source, "prompt");
        let options = MultiTryPromptOptions {
            max_attempts: Some(1),
            blank_max_attempts: Some(1),
            ..options.clone().into()
        };
        self.ask(&source, None, &options, cancel).await
    }

    /// Play `source` and collect answers until one passes `validator`.
    ///
    /// Without a validator an answer is accepted when it is non-empty, or
    /// empty with `allow_empty`.
    pub async fn multi_try_prompt(
        &mut self,
        source: impl Into<PromptSource>,
        validator: Option<&Validator>,
        options: &MultiTryPromptOptions,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let source = source.into();
        debug!(line = self.line_number(), ?source, "multi try prompt");
        self.ask(&source, validator, options, cancel).await
    }

    async fn ask(
        &mut self,
        source: &PromptSource,
        validator: Option<&Validator>,
        options: &MultiTryPromptOptions,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let max_attempts = options
            .max_attempts
            .filter(|n| *n > 0)
            .unwrap_or(self.properties.prompt_attempts);
        let blank_max_attempts = options
            .blank_max_attempts
            .filter(|n| *n > 0)
            .unwrap_or(self.properties.prompt_blank_attempts);
        let max_length = if options.max_length > 0 {
            options.max_length
        } else {
            DEFAULT_MAX_LENGTH
        };

        let mut terminators = if options.terminators.trim().is_empty() {
            DEFAULT_TERMINATORS.to_string()
        } else {
            options.terminators.clone()
        };
        if let Some(special) = options.special_terminator {
            terminators.push(special);
        }
        let mut requested = terminators.clone();
        requested.push(TIMEOUT_TERMINATOR);

        let mut count = 0;
        let mut blank_count = 0;
        while count < max_attempts && blank_count < blank_max_attempts {
            self.play_prompt(source, cancel).await?;

            let (answer, outcome) = match self.get_digits(max_length, &requested, cancel).await {
                Ok(answer) => {
                    let outcome = self.judge(&answer, &terminators, validator, options);
                    (answer, outcome)
                }
                Err(VoiceError::GetDigitsTimeout) => (String::new(), Outcome::TimedOut),
                Err(e) => return Err(e),
            };
            debug!(
                line = self.line_number(),
                attempt = count + 1,
                blank_count,
                answer = %answer,
                ?outcome,
                "prompt attempt"
            );

            match outcome {
                Outcome::Accepted => return Ok(answer),
                Outcome::Special => {
                    if let Some(callback) = &options.on_special_terminator {
                        callback();
                    }
                }
                Outcome::Rejected => {
                    if let Some(message) = &options.invalid_answer_message {
                        self.play_file_or_phrase(message, cancel).await?;
                    }
                }
                Outcome::TimedOut => {}
            }

            if answer.is_empty() {
                blank_count += 1;
            } else {
                blank_count = 0;
            }
            if outcome != Outcome::Special {
                count += 1;
            }
        }

        debug!(
            line = self.line_number(),
            count,
            blank_count,
            "prompt ran out of attempts"
        );
        if !options.catch_too_many_attempts {
            return Ok(String::new());
        }
        Err(VoiceError::TooManyAttempts)
    }

    fn judge(
        &self,
        answer: &str,
        terminators: &str,
        validator: Option<&Validator>,
        options: &MultiTryPromptOptions,
    ) -> Outcome {
        let last = self.last_terminator();
        if last.starts_with(TIMEOUT_TERMINATOR) {
            let timeout_ends_answer = terminators.contains(TIMEOUT_TERMINATOR)
                && (!answer.is_empty() || options.allow_empty);
            if !timeout_ends_answer {
                return Outcome::TimedOut;
            }
        }

        if let Some(special) = options.special_terminator {
            if last.starts_with(special) {
                return Outcome::Special;
            }
        }

        let allowed = options.allowed_digits.is_empty()
            || answer.chars().all(|c| options.allowed_digits.contains(c));
        let valid = match validator {
            Some(validator) => validator(answer),
            None => !answer.is_empty() || options.allow_empty,
        };
        if allowed && valid {
            Outcome::Accepted
        } else {
            Outcome::Rejected
        }
    }

    async fn play_prompt(&mut self, source: &PromptSource, cancel: &CancellationToken) -> Result<()> {
        match source {
            PromptSource::FileOrPhrase(file_or_phrase) => {
                self.play_file_or_phrase(file_or_phrase, cancel).await
            }
            PromptSource::TextToSpeech(cache) => self.play_text_to_speech(cache, cancel).await,
        }
    }
}
