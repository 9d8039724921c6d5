use super::{LineEvent, SimulatorMessage, SimulatorShared};
use crate::error::{Result, VoiceError};
use crate::line::{BaseLine, CallAnalysis, LineManagement, TIMEOUT_TERMINATOR};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const RECORD_SAMPLE_RATE: u32 = 8000;

struct SimulatorLineManagement {
    stop: CancellationToken,
}

impl LineManagement for SimulatorLineManagement {
    fn trigger_dispose(&self) {
        self.stop.cancel();
    }
}

/// One simulator line, fed by the phones it talks to.
pub struct SimulatorLine {
    line_number: u32,
    shared: Arc<SimulatorShared>,
    events_tx: UnboundedSender<LineEvent>,
    events: UnboundedReceiver<LineEvent>,
    digits: String,
    peer: Option<String>,
    /// Phone being dialed and not yet answered.
    dialing: Option<String>,
    volume: i32,
    management: Arc<SimulatorLineManagement>,
}

impl SimulatorLine {
    pub(crate) fn new(
        line_number: u32,
        shared: Arc<SimulatorShared>,
        events_tx: UnboundedSender<LineEvent>,
        events: UnboundedReceiver<LineEvent>,
    ) -> Self {
        Self {
            line_number,
            shared,
            events_tx,
            events,
            digits: String::new(),
            peer: None,
            dialing: None,
            volume: 0,
            management: Arc::new(SimulatorLineManagement {
                stop: CancellationToken::new(),
            }),
        }
    }

    /// Wait for the next event. `Ok(None)` when `timeout` runs out first.
    async fn next_event(&mut self, timeout: Option<Duration>) -> Result<Option<LineEvent>> {
        let stop = self.management.stop.clone();
        let recv = async {
            match timeout {
                Some(timeout) => tokio::time::timeout(timeout, self.events.recv()).await.ok(),
                None => Some(self.events.recv().await),
            }
        };
        select! {
            biased;
            _ = stop.cancelled() => Err(VoiceError::Disposing),
            event = recv => match event {
                Some(Some(event)) => Ok(Some(event)),
                Some(None) => Err(VoiceError::Voice("simulator line closed".to_string())),
                None => Ok(None),
            },
        }
    }

    /// Take in whatever already arrived without waiting.
    fn drain_pending(&mut self) -> Result<()> {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.apply(event)?,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
    }

    fn apply(&mut self, event: LineEvent) -> Result<()> {
        match event {
            LineEvent::Digits(keys) => self.digits.push_str(&keys),
            LineEvent::Hangup => return Err(self.remote_hangup()),
            LineEvent::Ring { .. } | LineEvent::DialResult(_) => {}
        }
        Ok(())
    }

    fn remote_hangup(&mut self) -> VoiceError {
        debug!(line = self.line_number, peer = ?self.peer, "remote hangup");
        self.peer = None;
        self.digits.clear();
        VoiceError::Hangup
    }

    /// Stop ringing a phone that never answered.
    fn abandon_dial(&mut self) {
        if let Some(number) = self.dialing.take() {
            self.shared.release_phone(&number, self.line_number, true);
        }
    }

    fn connected_peer(&mut self) -> Result<String> {
        self.drain_pending()?;
        self.peer.clone().ok_or(VoiceError::Hangup)
    }

    /// Split a complete answer off the front of the buffer, if there is one.
    fn take_answer(&mut self, max_digits: usize, terminators: &str) -> Option<String> {
        for (count, (index, c)) in self.digits.char_indices().enumerate() {
            if terminators.contains(c) {
                let end = index + c.len_utf8();
                return Some(self.digits.drain(..end).collect());
            }
            if count + 1 == max_digits {
                let end = index + c.len_utf8();
                return Some(self.digits.drain(..end).collect());
            }
        }
        None
    }

    async fn write_silence(filename: &str, elapsed: Duration) -> Result<()> {
        let path = Path::new(filename).to_path_buf();
        let samples = (elapsed.as_millis() as u64 * RECORD_SAMPLE_RATE as u64 / 1000) as usize;
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: RECORD_SAMPLE_RATE,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut writer = hound::WavWriter::create(&path, spec)?;
            for _ in 0..samples {
                writer.write_sample(0i16)?;
            }
            writer.finalize()?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("recording task failed: {}", e))??;
        Ok(())
    }
}

#[async_trait]
impl BaseLine for SimulatorLine {
    fn line_number(&self) -> u32 {
        self.line_number
    }

    fn management(&self) -> Arc<dyn LineManagement> {
        self.management.clone()
    }

    async fn wait_rings(&mut self, rings: u32) -> Result<()> {
        self.digits.clear();
        let mut count = 0;
        loop {
            match self.next_event(None).await? {
                Some(LineEvent::Ring { phone }) => {
                    count += 1;
                    debug!(line = self.line_number, phone = %phone, count, "ring");
                    self.peer = Some(phone);
                    if count >= rings {
                        self.digits.clear();
                        return Ok(());
                    }
                }
                Some(LineEvent::Hangup) => {
                    debug!(line = self.line_number, "caller gave up before answer");
                    count = 0;
                    self.peer = None;
                }
                Some(_) | None => {}
            }
        }
    }

    async fn hangup(&mut self) -> Result<()> {
        self.abandon_dial();
        if let Some(peer) = self.peer.take() {
            debug!(line = self.line_number, peer = %peer, "hanging up");
            self.shared.release_phone(&peer, self.line_number, true);
        }
        self.digits.clear();
        Ok(())
    }

    async fn take_off_hook(&mut self) -> Result<()> {
        Ok(())
    }

    async fn dial(&mut self, number: &str, _answering_machine_threshold: Duration) -> Result<CallAnalysis> {
        // a hangup still queued from the previous call no longer concerns this one
        if let Err(e) = self.drain_pending() {
            debug!(line = self.line_number, error = %e, "discarded stale event before dialing");
        }
        if let Some(result) = self.shared.dial_phone(number, self.line_number) {
            return Ok(result);
        }
        self.dialing = Some(number.to_string());

        let deadline = Instant::now() + self.shared.properties.dial_timeout();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = match self.next_event(Some(remaining)).await {
                Ok(event) => event,
                Err(VoiceError::Disposing) => {
                    self.abandon_dial();
                    return Ok(CallAnalysis::Stopped);
                }
                Err(e) => return Err(e),
            };
            match event {
                Some(LineEvent::DialResult(result)) => {
                    self.dialing = None;
                    if result.is_answered() {
                        self.peer = Some(number.to_string());
                        self.digits.clear();
                    }
                    return Ok(result);
                }
                Some(_) => {}
                None => {
                    debug!(line = self.line_number, number, "dial timed out");
                    self.abandon_dial();
                    return Ok(CallAnalysis::NoAnswer);
                }
            }
        }
    }

    async fn play_file(&mut self, filename: &str) -> Result<()> {
        let peer = self.connected_peer()?;
        if !self.digits.is_empty() {
            debug!(line = self.line_number, filename, "skipping playback, digits buffered");
            return Ok(());
        }
        self.shared
            .send_to_phone(&peer, SimulatorMessage::Play(filename.to_string()));
        Ok(())
    }

    async fn play_audio(&mut self, audio: Bytes) -> Result<()> {
        let peer = self.connected_peer()?;
        if !self.digits.is_empty() {
            return Ok(());
        }
        self.shared
            .send_to_phone(&peer, SimulatorMessage::Audio(audio.len()));
        Ok(())
    }

    async fn record_to_file(&mut self, filename: &str, timeout: Duration) -> Result<()> {
        let peer = self.connected_peer()?;
        self.digits.clear();
        self.shared
            .send_to_phone(&peer, SimulatorMessage::Record(filename.to_string()));

        let started = Instant::now();
        let deadline = started + timeout;
        let mut hung_up = false;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next_event(Some(remaining)).await? {
                Some(LineEvent::Digits(keys)) if keys.contains('#') => break,
                Some(LineEvent::Hangup) => {
                    hung_up = true;
                    break;
                }
                Some(_) => {}
                None => break,
            }
        }

        Self::write_silence(filename, started.elapsed()).await?;
        debug!(line = self.line_number, filename, "recording saved");
        if hung_up {
            return Err(self.remote_hangup());
        }
        Ok(())
    }

    async fn get_digits(&mut self, max_digits: usize, terminators: &str, timeout: Duration) -> Result<String> {
        self.connected_peer()?;
        loop {
            if let Some(answer) = self.take_answer(max_digits, terminators) {
                return Ok(answer);
            }
            match self.next_event(Some(timeout)).await? {
                Some(event) => self.apply(event)?,
                None if terminators.contains(TIMEOUT_TERMINATOR) => {
                    let mut answer = std::mem::take(&mut self.digits);
                    answer.push(TIMEOUT_TERMINATOR);
                    return Ok(answer);
                }
                None => {
                    self.digits.clear();
                    return Err(VoiceError::GetDigitsTimeout);
                }
            }
        }
    }

    async fn flush_digit_buffer(&mut self) -> Result<String> {
        self.drain_pending()?;
        Ok(std::mem::take(&mut self.digits))
    }

    async fn set_volume(&mut self, volume: i32) -> Result<()> {
        self.volume = volume;
        debug!(line = self.line_number, volume = self.volume, "volume set");
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        self.digits.clear();
        Ok(())
    }

    async fn dispose(&mut self) -> Result<()> {
        self.abandon_dial();
        if let Some(peer) = self.peer.take() {
            self.shared.release_phone(&peer, self.line_number, true);
        }
        self.shared.close_line(self.line_number, &self.events_tx);
        debug!(line = self.line_number, "simulator line closed");
        Ok(())
    }
}
