//! # Line state machine
//!
//! A [`Line`] wraps one backend [`BaseLine`] and turns its asynchronous,
//! device-driven events into a call-scripting API that a single owning
//! thread drives, while any other thread may force the line to stop.
//!
//! ```text
//!            ┌──────────── take_off_hook / dial ────────────┐
//!            │                                              ▼
//!   ┌────────┴─┐  wait_rings  ┌────────────────┐  rings  ┌───────────┐
//!   │  OnHook  │ ───────────▶ │ AcceptingCalls │ ──────▶ │ Connected │
//!   └──────────┘              └────────────────┘         └───────────┘
//!        ▲      hangup / remote hangup / failed dial          │
//!        └────────────────────────────────────────────────────┘
//!   dispose() from any state ──▶ Closed
//! ```
//!
//! ## Disposal
//!
//! [`LineHandle::trigger_dispose`] may be called from any thread. It wakes
//! whatever the owner is blocked on and every later operation fails with
//! [`VoiceError::Disposing`](crate::VoiceError::Disposing) until the owner
//! calls [`Line::dispose`]. After that, operations fail with
//! [`VoiceError::Disposed`](crate::VoiceError::Disposed).

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

mod blocking;
mod dispose;
mod wrapper;

#[cfg(test)]
pub(crate) mod testing;

pub use blocking::BlockingLine;
pub use dispose::LineHandle;
pub use wrapper::Line;

/// Lowest and highest accepted volume adjustment.
pub const MIN_VOLUME: i32 = -10;
pub const MAX_VOLUME: i32 = 10;

/// The digit-collection timeout marker a backend appends when the caller
/// stops pressing keys and `t` is one of the requested terminators.
pub const TIMEOUT_TERMINATOR: char = 't';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Closed,
    OnHook,
    OffHook,
    AcceptingCalls,
    Connected,
}

impl fmt::Display for LineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineStatus::Closed => write!(f, "closed"),
            LineStatus::OnHook => write!(f, "on_hook"),
            LineStatus::OffHook => write!(f, "off_hook"),
            LineStatus::AcceptingCalls => write!(f, "accepting_calls"),
            LineStatus::Connected => write!(f, "connected"),
        }
    }
}

/// Outcome of an outbound dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallAnalysis {
    Busy,
    NoAnswer,
    NoRingback,
    Connected,
    OperatorIntercept,
    /// The line was stopped while dialing.
    Stopped,
    NoDialTone,
    FaxTone,
    Error,
    /// Greeting was longer than the answering-machine threshold.
    AnsweringMachine,
    /// Fast busy: every outside line is taken.
    NoFreeLine,
}

impl CallAnalysis {
    /// A live party (person or machine) picked up.
    pub fn is_answered(&self) -> bool {
        matches!(self, CallAnalysis::Connected | CallAnalysis::AnsweringMachine)
    }
}

impl fmt::Display for CallAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallAnalysis::Busy => "busy",
            CallAnalysis::NoAnswer => "no_answer",
            CallAnalysis::NoRingback => "no_ringback",
            CallAnalysis::Connected => "connected",
            CallAnalysis::OperatorIntercept => "operator_intercept",
            CallAnalysis::Stopped => "stopped",
            CallAnalysis::NoDialTone => "no_dial_tone",
            CallAnalysis::FaxTone => "fax_tone",
            CallAnalysis::Error => "error",
            CallAnalysis::AnsweringMachine => "answering_machine",
            CallAnalysis::NoFreeLine => "no_free_line",
        };
        f.write_str(name)
    }
}

/// The cross-thread facet of a backend line.
///
/// Held by the [`LineManager`](crate::LineManager) while the owning thread
/// holds the line itself.
pub trait LineManagement: Send + Sync {
    /// Interrupt any wait the backend is blocked in. Must be idempotent.
    fn trigger_dispose(&self);
}

/// Backend-specific line: the device or protocol that actually plays,
/// records, and collects digits.
///
/// Implementations report a remote disconnect as
/// [`VoiceError::Hangup`](crate::VoiceError::Hangup) and a wait interrupted
/// by [`LineManagement::trigger_dispose`] as
/// [`VoiceError::Disposing`](crate::VoiceError::Disposing).
///
/// `get_digits` returns the collected keys including the terminator that
/// ended collection, if any. When the caller stops pressing keys and
/// [`TIMEOUT_TERMINATOR`] is among `terminators`, the marker is appended;
/// otherwise the backend fails with
/// [`VoiceError::GetDigitsTimeout`](crate::VoiceError::GetDigitsTimeout).
#[async_trait]
pub trait BaseLine: Send + Sync {
    fn line_number(&self) -> u32;

    fn management(&self) -> Arc<dyn LineManagement>;

    async fn wait_rings(&mut self, rings: u32) -> Result<()>;

    async fn hangup(&mut self) -> Result<()>;

    async fn take_off_hook(&mut self) -> Result<()>;

    async fn dial(&mut self, number: &str, answering_machine_threshold: Duration)
        -> Result<CallAnalysis>;

    async fn play_file(&mut self, filename: &str) -> Result<()>;

    /// Play audio held in memory, e.g. freshly synthesized speech.
    async fn play_audio(&mut self, audio: Bytes) -> Result<()>;

    async fn record_to_file(&mut self, filename: &str, timeout: Duration) -> Result<()>;

    async fn get_digits(
        &mut self,
        max_digits: usize,
        terminators: &str,
        timeout: Duration,
    ) -> Result<String>;

    /// Discard and return everything in the digit buffer.
    async fn flush_digit_buffer(&mut self) -> Result<String>;

    async fn set_volume(&mut self, volume: i32) -> Result<()>;

    /// Tear the device down and bring it back up.
    async fn reset(&mut self) -> Result<()>;

    /// Release every resource held by this line.
    async fn dispose(&mut self) -> Result<()>;
}
