//! Test harness for [`Line`] and everything built on top of it.
//!
//! Provides [`FakeLine`]: a scripted in-memory [`BaseLine`] that records
//! every call forwarded to it, and [`FakePlugin`] to hand such lines to a
//! [`LineManager`](crate::LineManager).
//!
//! # Quick start
//!
//! ```rust,ignore
//! let (mut line, fake) = fake_line(1);
//! fake.digits("1234#");
//! let answer = line.get_digits(10, "#", &CancellationToken::new()).await?;
//! assert_eq!(answer, "1234");
//! assert_eq!(fake.count(|c| matches!(c, Call::GetDigits { .. })), 1);
//! ```

use super::{BaseLine, CallAnalysis, Line, LineManagement};
use crate::config::VoiceProperties;
use crate::error::{Result, VoiceError};
use crate::manager::VoicePlugin;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One call forwarded to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    WaitRings(u32),
    Hangup,
    TakeOffHook,
    Dial { number: String, threshold: Duration },
    PlayFile(String),
    PlayAudio(usize),
    Record { filename: String, timeout: Duration },
    GetDigits { max: usize, terminators: String },
    Flush,
    SetVolume(i32),
    Reset,
    Dispose,
}

#[derive(Default)]
struct Script {
    calls: Vec<Call>,
    answers: VecDeque<Result<String>>,
    dial_results: VecDeque<CallAnalysis>,
    play_failure: Option<VoiceError>,
    flush_result: Option<Result<String>>,
    block_forever: bool,
}

#[derive(Default)]
pub(crate) struct FakeManagement {
    stop: CancellationToken,
    triggers: AtomicUsize,
}

impl LineManagement for FakeManagement {
    fn trigger_dispose(&self) {
        self.triggers.fetch_add(1, Ordering::SeqCst);
        self.stop.cancel();
    }
}

/// Scripted backend line.
pub(crate) struct FakeLine {
    line_number: u32,
    script: Arc<Mutex<Script>>,
    management: Arc<FakeManagement>,
}

/// Test-side view of a [`FakeLine`] after it was moved into a [`Line`].
#[derive(Clone)]
pub(crate) struct FakeControl {
    script: Arc<Mutex<Script>>,
    management: Arc<FakeManagement>,
}

impl FakeLine {
    pub(crate) fn new(line_number: u32) -> (Self, FakeControl) {
        let script = Arc::new(Mutex::new(Script::default()));
        let management = Arc::new(FakeManagement::default());
        let control = FakeControl {
            script: script.clone(),
            management: management.clone(),
        };
        (
            Self {
                line_number,
                script,
                management,
            },
            control,
        )
    }

    fn record(&self, call: Call) {
        self.script.lock().unwrap().calls.push(call);
    }

    /// Returns true once stopped, if the script blocks forever.
    async fn blocked_until_stopped(&self) -> bool {
        let block_forever = self.script.lock().unwrap().block_forever;
        if block_forever {
            self.management.stop.cancelled().await;
        }
        block_forever
    }
}

/// Properties with a short digit timeout, so nothing in a test waits long.
pub(crate) fn test_properties() -> VoiceProperties {
    VoiceProperties {
        digits_timeout_ms: 50,
        phrase_pause_ms: 1,
        ..Default::default()
    }
}

pub(crate) fn fake_line(line_number: u32) -> (Line, FakeControl) {
    let (base, control) = FakeLine::new(line_number);
    (
        Line::new(line_number, Box::new(base), test_properties()),
        control,
    )
}

impl FakeControl {
    /// Queue the raw string the backend returns from the next `get_digits`.
    pub(crate) fn digits(&self, raw: &str) -> &Self {
        self.script
            .lock()
            .unwrap()
            .answers
            .push_back(Ok(raw.to_string()));
        self
    }

    /// Queue an error for the next `get_digits`.
    pub(crate) fn digits_error(&self, error: VoiceError) -> &Self {
        self.script.lock().unwrap().answers.push_back(Err(error));
        self
    }

    pub(crate) fn dial_result(&self, analysis: CallAnalysis) -> &Self {
        self.script
            .lock()
            .unwrap()
            .dial_results
            .push_back(analysis);
        self
    }

    pub(crate) fn fail_next_play(&self, error: VoiceError) -> &Self {
        self.script.lock().unwrap().play_failure = Some(error);
        self
    }

    pub(crate) fn flush_result(&self, result: Result<String>) -> &Self {
        self.script.lock().unwrap().flush_result = Some(result);
        self
    }

    /// Make `wait_rings`, `dial`, `play_file` and `get_digits` block until
    /// the backend is told to stop.
    pub(crate) fn block_forever(&self) -> &Self {
        self.script.lock().unwrap().block_forever = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub(crate) fn count(&self, matcher: impl Fn(&Call) -> bool) -> usize {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| matcher(c))
            .count()
    }

    pub(crate) fn played(&self) -> Vec<String> {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::PlayFile(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn trigger_count(&self) -> usize {
        self.management.triggers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BaseLine for FakeLine {
    fn line_number(&self) -> u32 {
        self.line_number
    }

    fn management(&self) -> Arc<dyn LineManagement> {
        self.management.clone()
    }

    async fn wait_rings(&mut self, rings: u32) -> Result<()> {
        self.record(Call::WaitRings(rings));
        if self.blocked_until_stopped().await {
            return Err(VoiceError::Disposing);
        }
        Ok(())
    }

    async fn hangup(&mut self) -> Result<()> {
        self.record(Call::Hangup);
        Ok(())
    }

    async fn take_off_hook(&mut self) -> Result<()> {
        self.record(Call::TakeOffHook);
        Ok(())
    }

    async fn dial(&mut self, number: &str, threshold: Duration) -> Result<CallAnalysis> {
        self.record(Call::Dial {
            number: number.to_string(),
            threshold,
        });
        if self.blocked_until_stopped().await {
            return Ok(CallAnalysis::Stopped);
        }
        let result = self.script.lock().unwrap().dial_results.pop_front();
        Ok(result.unwrap_or(CallAnalysis::Connected))
    }

    async fn play_file(&mut self, filename: &str) -> Result<()> {
        self.record(Call::PlayFile(filename.to_string()));
        if self.blocked_until_stopped().await {
            return Err(VoiceError::Disposing);
        }
        match self.script.lock().unwrap().play_failure.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn play_audio(&mut self, audio: Bytes) -> Result<()> {
        self.record(Call::PlayAudio(audio.len()));
        Ok(())
    }

    async fn record_to_file(&mut self, filename: &str, timeout: Duration) -> Result<()> {
        self.record(Call::Record {
            filename: filename.to_string(),
            timeout,
        });
        Ok(())
    }

    async fn get_digits(&mut self, max: usize, terminators: &str, _timeout: Duration) -> Result<String> {
        self.record(Call::GetDigits {
            max,
            terminators: terminators.to_string(),
        });
        if self.blocked_until_stopped().await {
            return Err(VoiceError::Disposing);
        }
        let next = self.script.lock().unwrap().answers.pop_front();
        match next {
            Some(answer) => answer,
            None if terminators.contains(super::TIMEOUT_TERMINATOR) => Ok("t".to_string()),
            None => Err(VoiceError::GetDigitsTimeout),
        }
    }

    async fn flush_digit_buffer(&mut self) -> Result<String> {
        self.record(Call::Flush);
        let result = self.script.lock().unwrap().flush_result.take();
        result.unwrap_or_else(|| Ok(String::new()))
    }

    async fn set_volume(&mut self, volume: i32) -> Result<()> {
        self.record(Call::SetVolume(volume));
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        self.record(Call::Reset);
        Ok(())
    }

    async fn dispose(&mut self) -> Result<()> {
        self.record(Call::Dispose);
        Ok(())
    }
}

/// Plugin that hands out [`FakeLine`]s and keeps their controls.
#[derive(Default)]
pub(crate) struct FakePlugin {
    controls: Mutex<HashMap<u32, FakeControl>>,
    disposed: AtomicUsize,
}

impl FakePlugin {
    pub(crate) fn control(&self, line_number: u32) -> Option<FakeControl> {
        self.controls.lock().unwrap().get(&line_number).cloned()
    }

    pub(crate) fn dispose_count(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl VoicePlugin for FakePlugin {
    fn get_line(&self, line_number: u32) -> Result<Box<dyn BaseLine>> {
        let (line, control) = FakeLine::new(line_number);
        self.controls.lock().unwrap().insert(line_number, control);
        Ok(Box::new(line))
    }

    fn voice_properties(&self) -> VoiceProperties {
        test_properties()
    }

    fn dispose(&self) -> Result<()> {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
