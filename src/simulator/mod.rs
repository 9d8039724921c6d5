//! In-process stand-in for telephony hardware.
//!
//! Lines opened through the [`Simulator`] plugin are driven by virtual
//! phones, attached either in process with [`Simulator::attach_phone`] or
//! over TCP with [`Simulator::listen`] using the text protocol in
//! [`protocol`].

use crate::config::VoiceProperties;
use crate::error::{Result, VoiceError};
use crate::line::{BaseLine, CallAnalysis};
use crate::manager::VoicePlugin;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod line;
pub mod protocol;

pub use line::SimulatorLine;
pub use protocol::{PhoneCommand, ProtocolError, SimulatorMessage};

/// What a phone did, as seen by the line it is talking to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LineEvent {
    Ring { phone: String },
    Digits(String),
    Hangup,
    DialResult(CallAnalysis),
}

struct PhoneSlot {
    tx: UnboundedSender<SimulatorMessage>,
    /// Line this phone is calling, talking to, or being dialed by.
    line: Option<u32>,
}

pub(crate) struct SimulatorShared {
    lines: Mutex<HashMap<u32, UnboundedSender<LineEvent>>>,
    phones: Mutex<HashMap<String, PhoneSlot>>,
    pub(crate) properties: VoiceProperties,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatorShared {
    fn send_to_line(&self, line_number: u32, event: LineEvent) -> bool {
        match lock(&self.lines).get(&line_number) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub(crate) fn send_to_phone(&self, number: &str, message: SimulatorMessage) -> bool {
        match lock(&self.phones).get(number) {
            Some(slot) => slot.tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Start a dial from `line_number` to `number`. `Some` is an immediate
    /// result; `None` means the phone is ringing and will reply.
    pub(crate) fn dial_phone(&self, number: &str, line_number: u32) -> Option<CallAnalysis> {
        let mut phones = lock(&self.phones);
        let Some(slot) = phones.get_mut(number) else {
            debug!(line = line_number, number, "dial: no such phone");
            return Some(CallAnalysis::NoAnswer);
        };
        if slot.line.is_some() {
            debug!(line = line_number, number, "dial: phone is busy");
            return Some(CallAnalysis::Busy);
        }
        if slot.tx.send(SimulatorMessage::Dial(line_number)).is_err() {
            return Some(CallAnalysis::NoAnswer);
        }
        slot.line = Some(line_number);
        None
    }

    /// Forget `line_number` as the peer of `number`, telling the phone if asked.
    pub(crate) fn release_phone(&self, number: &str, line_number: u32, notify: bool) {
        let mut phones = lock(&self.phones);
        if let Some(slot) = phones.get_mut(number) {
            if slot.line == Some(line_number) {
                slot.line = None;
                if notify {
                    let _ = slot.tx.send(SimulatorMessage::Hangup);
                }
            }
        }
    }

    pub(crate) fn close_line(&self, line_number: u32, events: &UnboundedSender<LineEvent>) {
        let mut lines = lock(&self.lines);
        if lines
            .get(&line_number)
            .is_some_and(|tx| tx.same_channel(events))
        {
            lines.remove(&line_number);
        }
    }

    fn detach_phone(&self, number: &str) {
        let slot = lock(&self.phones).remove(number);
        if let Some(PhoneSlot {
            line: Some(line_number),
            ..
        }) = slot
        {
            self.send_to_line(line_number, LineEvent::Hangup);
        }
        debug!(number, "phone detached");
    }

    /// Apply one command from phone `number` and build the reply.
    fn handle_phone_command(&self, number: &str, command: PhoneCommand) -> SimulatorMessage {
        let mut phones = lock(&self.phones);
        let Some(slot) = phones.get_mut(number) else {
            return SimulatorMessage::Error(format!("phone {number} is not connected"));
        };

        match command {
            PhoneCommand::Connect(_) => SimulatorMessage::Error("already connected".to_string()),
            PhoneCommand::Call(line_number) => {
                if slot.line.is_some() {
                    return SimulatorMessage::Error("already in a call".to_string());
                }
                let ring = LineEvent::Ring {
                    phone: number.to_string(),
                };
                if !self.send_to_line(line_number, ring) {
                    return SimulatorMessage::Error(format!("line {line_number} is not open"));
                }
                slot.line = Some(line_number);
                SimulatorMessage::Ok
            }
            PhoneCommand::Ring => match slot.line {
                Some(line_number) => {
                    let ring = LineEvent::Ring {
                        phone: number.to_string(),
                    };
                    self.send_to_line(line_number, ring);
                    SimulatorMessage::Ok
                }
                None => SimulatorMessage::Error("not in a call".to_string()),
            },
            PhoneCommand::Digits(keys) => match slot.line {
                Some(line_number) => {
                    self.send_to_line(line_number, LineEvent::Digits(keys));
                    SimulatorMessage::Ok
                }
                None => SimulatorMessage::Error("not in a call".to_string()),
            },
            PhoneCommand::Hangup => {
                if let Some(line_number) = slot.line.take() {
                    self.send_to_line(line_number, LineEvent::Hangup);
                }
                SimulatorMessage::Ok
            }
            PhoneCommand::Answer
            | PhoneCommand::Machine
            | PhoneCommand::Busy
            | PhoneCommand::NoAnswer => {
                let Some(line_number) = slot.line else {
                    return SimulatorMessage::Error("no call to answer".to_string());
                };
                let analysis = match command {
                    PhoneCommand::Answer => CallAnalysis::Connected,
                    PhoneCommand::Machine => CallAnalysis::AnsweringMachine,
                    PhoneCommand::Busy => CallAnalysis::Busy,
                    _ => CallAnalysis::NoAnswer,
                };
                if !analysis.is_answered() {
                    slot.line = None;
                }
                self.send_to_line(line_number, LineEvent::DialResult(analysis));
                if analysis.is_answered() {
                    SimulatorMessage::Connected(line_number)
                } else {
                    SimulatorMessage::Ok
                }
            }
        }
    }
}

/// Voice plugin backed by virtual phones.
pub struct Simulator {
    shared: Arc<SimulatorShared>,
    cancel: CancellationToken,
}

impl Simulator {
    pub fn new(properties: VoiceProperties) -> Self {
        Self {
            shared: Arc::new(SimulatorShared {
                lines: Mutex::new(HashMap::new()),
                phones: Mutex::new(HashMap::new()),
                properties,
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// Register a phone under `number` in this process.
    pub fn attach_phone(&self, number: &str) -> Result<VirtualPhone> {
        attach(&self.shared, number)
    }

    /// Accept phones over TCP until the simulator is disposed.
    ///
    /// Returns the bound address, which differs from `addr` when it asks
    /// for port 0.
    pub async fn listen(&self, addr: &str) -> anyhow::Result<SocketAddr> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind simulator to {}: {}", addr, e))?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "simulator listening");

        let shared = self.shared.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                select! {
                    _ = cancel.cancelled() => {
                        info!("simulator listener stopped");
                        break;
                    }
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "phone connection");
                            let shared = shared.clone();
                            let cancel = cancel.child_token();
                            tokio::spawn(async move {
                                if let Err(e) = serve_phone(stream, shared, cancel).await {
                                    warn!(%peer, "phone connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => warn!("simulator accept failed: {}", e),
                    }
                }
            }
        });
        Ok(local_addr)
    }
}

impl VoicePlugin for Simulator {
    fn get_line(&self, line_number: u32) -> Result<Box<dyn BaseLine>> {
        let (tx, rx) = unbounded_channel();
        {
            let mut lines = lock(&self.shared.lines);
            if lines.contains_key(&line_number) {
                return Err(VoiceError::Voice(format!(
                    "line {line_number} is already open"
                )));
            }
            lines.insert(line_number, tx.clone());
        }
        debug!(line = line_number, "simulator line opened");
        Ok(Box::new(SimulatorLine::new(
            line_number,
            self.shared.clone(),
            tx,
            rx,
        )))
    }

    fn voice_properties(&self) -> VoiceProperties {
        self.shared.properties.clone()
    }

    fn dispose(&self) -> Result<()> {
        info!("disposing simulator");
        self.cancel.cancel();
        lock(&self.shared.phones).clear();
        lock(&self.shared.lines).clear();
        Ok(())
    }
}

fn attach(shared: &Arc<SimulatorShared>, number: &str) -> Result<VirtualPhone> {
    let number = number.trim();
    if number.is_empty() {
        return Err(VoiceError::invalid_argument("number", "must not be empty"));
    }
    let (tx, rx) = unbounded_channel();
    {
        let mut phones = lock(&shared.phones);
        if phones.contains_key(number) {
            return Err(VoiceError::Voice(format!(
                "phone {number} is already connected"
            )));
        }
        phones.insert(number.to_string(), PhoneSlot { tx, line: None });
    }
    debug!(number, "phone attached");
    Ok(VirtualPhone {
        number: number.to_string(),
        shared: shared.clone(),
        rx,
    })
}

/// A phone attached to the simulator. Detaches when dropped, hanging up
/// any call it is in.
pub struct VirtualPhone {
    number: String,
    shared: Arc<SimulatorShared>,
    rx: UnboundedReceiver<SimulatorMessage>,
}

impl VirtualPhone {
    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn send(&self, command: PhoneCommand) -> SimulatorMessage {
        self.shared.handle_phone_command(&self.number, command)
    }

    pub fn call(&self, line_number: u32) -> SimulatorMessage {
        self.send(PhoneCommand::Call(line_number))
    }

    pub fn ring(&self) -> SimulatorMessage {
        self.send(PhoneCommand::Ring)
    }

    pub fn press(&self, keys: &str) -> SimulatorMessage {
        self.send(PhoneCommand::Digits(keys.to_string()))
    }

    pub fn hang_up(&self) -> SimulatorMessage {
        self.send(PhoneCommand::Hangup)
    }

    pub fn answer(&self) -> SimulatorMessage {
        self.send(PhoneCommand::Answer)
    }

    /// Next message from the simulator; `None` once the simulator is gone.
    pub async fn recv(&mut self) -> Option<SimulatorMessage> {
        self.rx.recv().await
    }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<SimulatorMessage> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }
}

impl Drop for VirtualPhone {
    fn drop(&mut self) {
        self.shared.detach_phone(&self.number);
    }
}

async fn write_message(
    writer: &mut (impl AsyncWrite + Unpin),
    message: &SimulatorMessage,
) -> std::io::Result<()> {
    writer.write_all(format!("{message}\n").as_bytes()).await
}

async fn serve_phone(
    stream: TcpStream,
    shared: Arc<SimulatorShared>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let first = select! {
        _ = cancel.cancelled() => return Ok(()),
        first = lines.next_line() => first?,
    };
    let Some(first) = first else {
        return Ok(());
    };
    let number = match first.parse::<PhoneCommand>() {
        Ok(PhoneCommand::Connect(number)) => number,
        Ok(other) => {
            let message = SimulatorMessage::Error(format!("expected CONNECT, got {other}"));
            write_message(&mut writer, &message).await?;
            return Ok(());
        }
        Err(e) => {
            write_message(&mut writer, &SimulatorMessage::Error(e.to_string())).await?;
            return Ok(());
        }
    };
    let mut phone = match attach(&shared, &number) {
        Ok(phone) => phone,
        Err(e) => {
            write_message(&mut writer, &SimulatorMessage::Error(e.to_string())).await?;
            return Ok(());
        }
    };
    write_message(&mut writer, &SimulatorMessage::Ok).await?;

    loop {
        select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = match line.parse::<PhoneCommand>() {
                    Ok(command) => phone.send(command),
                    Err(e) => SimulatorMessage::Error(e.to_string()),
                };
                write_message(&mut writer, &reply).await?;
            }
            message = phone.recv() => match message {
                Some(message) => write_message(&mut writer, &message).await?,
                None => break,
            }
        }
    }
    debug!(number = phone.number(), "phone connection closed");
    Ok(())
}
