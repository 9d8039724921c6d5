use super::dispose::{DisposeState, LineHandle};
use super::{BaseLine, CallAnalysis, LineStatus, MAX_VOLUME, MIN_VOLUME};
use crate::config::VoiceProperties;
use crate::error::{Result, VoiceError};
use crate::synthesis::TextToSpeechCache;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Dial calls with a shorter answering-machine threshold are rejected.
pub const MIN_ANSWERING_MACHINE_THRESHOLD: Duration = Duration::from_millis(1000);

/// One logical phone channel, owned by a single thread or task.
///
/// Every operation first checks the disposal flags, then forwards to the
/// backend while watching for a stop request from another thread and for
/// the caller's own `cancel` token.
pub struct Line {
    line_number: u32,
    base: Box<dyn BaseLine>,
    status: LineStatus,
    last_terminator: String,
    volume: i32,
    pub(super) dispose: Arc<DisposeState>,
    handle: LineHandle,
    pub(crate) properties: VoiceProperties,
}

impl Line {
    pub fn new(line_number: u32, base: Box<dyn BaseLine>, properties: VoiceProperties) -> Self {
        debug!(line = line_number, "new line");
        let dispose = Arc::new(DisposeState::new(line_number));
        let handle = LineHandle {
            state: dispose.clone(),
            backend: base.management(),
        };
        Self {
            line_number,
            base,
            status: LineStatus::OnHook,
            last_terminator: String::new(),
            volume: 0,
            dispose,
            handle,
            properties,
        }
    }

    pub fn line_number(&self) -> u32 {
        self.line_number
    }

    pub fn status(&self) -> LineStatus {
        self.status
    }

    /// The terminator that ended the last digit collection, or empty.
    pub fn last_terminator(&self) -> &str {
        &self.last_terminator
    }

    pub fn voice_properties(&self) -> &VoiceProperties {
        &self.properties
    }

    /// Handle another thread can use to stop this line.
    pub fn handle(&self) -> LineHandle {
        self.handle.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.dispose.is_disposed()
    }

    pub fn check_dispose(&self) -> Result<()> {
        self.dispose.check()
    }

    /// Wait for an inbound call and answer it after `rings` rings.
    pub async fn wait_rings(&mut self, rings: u32, cancel: &CancellationToken) -> Result<()> {
        debug!(line = self.line_number, rings, "wait rings");
        self.dispose.check()?;

        self.status = LineStatus::AcceptingCalls;
        self.dispose
            .guard(cancel, self.base.wait_rings(rings))
            .await?;

        self.status = LineStatus::Connected;
        self.dispose.check_disposing()
    }

    /// Hang up. Always forwarded, even when already on hook.
    pub async fn hangup(&mut self) -> Result<()> {
        debug!(line = self.line_number, "hangup");
        self.dispose.check()?;
        self.status = LineStatus::OnHook;
        self.base.hangup().await
    }

    pub async fn take_off_hook(&mut self) -> Result<()> {
        debug!(line = self.line_number, "take off hook");
        self.dispose.check()?;
        self.status = LineStatus::OffHook;
        self.base.take_off_hook().await
    }

    /// Dial out with call-progress analysis.
    ///
    /// A person or machine answering leaves the line connected; every other
    /// outcome hangs the line up and is returned to the caller. A dial
    /// stopped by disposal fails with [`VoiceError::Disposing`] and leaves
    /// the line off hook.
    pub async fn dial(
        &mut self,
        number: &str,
        answering_machine_threshold: Duration,
        cancel: &CancellationToken,
    ) -> Result<CallAnalysis> {
        if answering_machine_threshold < MIN_ANSWERING_MACHINE_THRESHOLD {
            return Err(VoiceError::invalid_argument(
                "answering_machine_threshold",
                format!(
                    "must be at least {}ms, got {}ms",
                    MIN_ANSWERING_MACHINE_THRESHOLD.as_millis(),
                    answering_machine_threshold.as_millis()
                ),
            ));
        }
        if number.trim().is_empty() {
            return Err(VoiceError::invalid_argument("number", "must not be empty"));
        }

        debug!(
            line = self.line_number,
            number,
            threshold_ms = answering_machine_threshold.as_millis() as u64,
            "dial"
        );
        self.dispose.check()?;

        self.take_off_hook().await?;
        debug!(line = self.line_number, number, "line is off hook, dialing");

        let result = self
            .dispose
            .guard(cancel, self.base.dial(number, answering_machine_threshold))
            .await?;
        debug!(line = self.line_number, analysis = %result, "call analysis");

        if result == CallAnalysis::Stopped {
            return Err(self.dispose.disposing());
        }

        if result.is_answered() {
            self.status = LineStatus::Connected;
        } else {
            self.hangup().await?;
        }
        Ok(result)
    }

    /// Dial with the configured answering-machine threshold.
    pub async fn dial_default(&mut self, number: &str, cancel: &CancellationToken) -> Result<CallAnalysis> {
        let threshold = self.properties.answering_machine_threshold();
        self.dial(number, threshold, cancel).await
    }

    pub async fn play_file(&mut self, filename: &str, cancel: &CancellationToken) -> Result<()> {
        debug!(line = self.line_number, filename, "play file");
        self.dispose.check()?;
        let result = self
            .dispose
            .guard(cancel, self.base.play_file(filename))
            .await;
        self.observe_hangup(result)
    }

    pub async fn play_audio(&mut self, audio: bytes::Bytes, cancel: &CancellationToken) -> Result<()> {
        debug!(line = self.line_number, bytes = audio.len(), "play audio");
        self.dispose.check()?;
        let result = self
            .dispose
            .guard(cancel, self.base.play_audio(audio))
            .await;
        self.observe_hangup(result)
    }

    /// Speak `cache`'s text, synthesizing it first when no cached audio exists.
    pub async fn play_text_to_speech(
        &mut self,
        cache: &TextToSpeechCache,
        cancel: &CancellationToken,
    ) -> Result<()> {
        debug!(line = self.line_number, text = cache.text(), "play text to speech");
        self.dispose.check()?;
        let audio = self
            .dispose
            .guard(cancel, cache.get_or_generate())
            .await?;
        match cache.cache_file_name() {
            Some(path) => {
                let path = path.to_string_lossy().into_owned();
                self.play_file(&path, cancel).await
            }
            None => self.play_audio(audio, cancel).await,
        }
    }

    /// Record with the configured default limit.
    pub async fn record_to_file(&mut self, filename: &str, cancel: &CancellationToken) -> Result<()> {
        let timeout = self.properties.record_timeout();
        self.record_to_file_with_timeout(filename, timeout, cancel)
            .await
    }

    pub async fn record_to_file_with_timeout(
        &mut self,
        filename: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        debug!(
            line = self.line_number,
            filename,
            timeout_ms = timeout.as_millis() as u64,
            "record to file"
        );
        self.dispose.check()?;
        let result = self
            .dispose
            .guard(cancel, self.base.record_to_file(filename, timeout))
            .await;
        self.observe_hangup(result)
    }

    /// Collect up to `max_digits` keys, stopping early at any of `terminators`.
    ///
    /// The terminator is stripped from the answer and kept in
    /// [`last_terminator`](Self::last_terminator).
    pub async fn get_digits(
        &mut self,
        max_digits: usize,
        terminators: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        debug!(line = self.line_number, max_digits, terminators, "get digits");
        self.dispose.check()?;
        let timeout = self.properties.digits_timeout();
        let result = self
            .dispose
            .guard(cancel, self.base.get_digits(max_digits, terminators, timeout))
            .await;
        let answer = self.observe_hangup(result)?;
        Ok(self.strip_terminator(answer, terminators))
    }

    /// Stay silent for `duration`. Interrupted like any other wait.
    pub async fn pause(&mut self, duration: Duration, cancel: &CancellationToken) -> Result<()> {
        self.dispose.check()?;
        self.dispose
            .guard(cancel, async {
                tokio::time::sleep(duration).await;
                Ok(())
            })
            .await
    }

    /// Discard buffered keys and return them.
    pub async fn flush_digit_buffer(&mut self) -> Result<String> {
        debug!(line = self.line_number, "flush digit buffer");
        self.dispose.check()?;
        match self.base.flush_digit_buffer().await {
            Ok(digits) => Ok(digits),
            Err(VoiceError::GetDigitsTimeout) => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    pub fn volume(&self) -> Result<i32> {
        self.dispose.check()?;
        Ok(self.volume)
    }

    pub async fn set_volume(&mut self, volume: i32) -> Result<()> {
        if !(MIN_VOLUME..=MAX_VOLUME).contains(&volume) {
            return Err(VoiceError::invalid_argument(
                "volume",
                format!("must be between {MIN_VOLUME} and {MAX_VOLUME}, got {volume}"),
            ));
        }
        self.dispose.check()?;
        self.base.set_volume(volume).await?;
        self.volume = volume;
        Ok(())
    }

    /// Recreate the backend device. Ignored once the line is disposed.
    pub async fn reset(&mut self) -> Result<()> {
        if self.dispose.is_disposed() {
            debug!(line = self.line_number, "reset ignored, line is already disposed");
            return Ok(());
        }
        debug!(line = self.line_number, "reset");
        self.base.reset().await
    }

    /// Hang up and release the backend. A second call does nothing.
    ///
    /// Only the owning thread calls this, and never while another
    /// operation on the same line is in flight.
    pub async fn dispose(&mut self) -> Result<()> {
        if self.dispose.is_disposed() {
            debug!(line = self.line_number, "dispose: line is already disposed");
            return Ok(());
        }
        debug!(line = self.line_number, "dispose: disposing of the line");

        self.status = LineStatus::OnHook;
        if let Err(e) = self.base.hangup().await {
            debug!(line = self.line_number, error = %e, "dispose: hangup failed");
        }
        let released = self.base.dispose().await;

        self.dispose.mark_disposed();
        self.status = LineStatus::Closed;
        released
    }

    /// A remote hangup leaves the line on hook before the error reaches the caller.
    fn observe_hangup<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(VoiceError::Hangup) = result {
            debug!(line = self.line_number, "caller hung up");
            self.status = LineStatus::OnHook;
        }
        result
    }

    fn strip_terminator(&mut self, mut answer: String, terminators: &str) -> String {
        self.last_terminator.clear();
        if let Some(last) = answer.chars().last() {
            if terminators.contains(last) {
                answer.pop();
                self.last_terminator.push(last);
            }
        }
        debug!(
            line = self.line_number,
            answer = %answer,
            terminator = %self.last_terminator,
            "digits collected"
        );
        answer
    }
}

impl Drop for Line {
    fn drop(&mut self) {
        if !self.dispose.is_disposed() {
            warn!(line = self.line_number, "line dropped without dispose");
        }
    }
}

impl std::fmt::Debug for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Line")
            .field("line_number", &self.line_number)
            .field("status", &self.status)
            .field("last_terminator", &self.last_terminator)
            .field("volume", &self.volume)
            .finish()
    }
}
