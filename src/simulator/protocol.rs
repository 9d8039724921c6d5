//! Newline-delimited text protocol spoken between virtual phones and the
//! simulator.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
    #[error("invalid line number `{0}`")]
    InvalidLine(String),
}

/// Phone to simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhoneCommand {
    /// Register the phone under a number. First command on a connection.
    Connect(String),
    /// Start calling a line. Counts as the first ring.
    Call(u32),
    Ring,
    Digits(String),
    Hangup,
    /// Replies to `DIAL`.
    Answer,
    Machine,
    Busy,
    NoAnswer,
}

/// Simulator to phone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatorMessage {
    Ok,
    /// The line is calling this phone.
    Dial(u32),
    /// The phone answered the line's call.
    Connected(u32),
    Play(String),
    /// In-memory audio of this many bytes was played.
    Audio(usize),
    Record(String),
    Hangup,
    Error(String),
}

fn parse_line(value: Option<&str>) -> Result<u32, ProtocolError> {
    let value = value.ok_or(ProtocolError::MissingArgument("line"))?;
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ProtocolError::InvalidLine(value.to_string())),
    }
}

fn argument(name: &'static str, value: Option<&str>) -> Result<String, ProtocolError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ProtocolError::MissingArgument(name)),
    }
}

fn split(s: &str) -> Result<(String, Option<&str>), ProtocolError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ProtocolError::Empty);
    }
    let (verb, rest) = match s.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, Some(rest.trim())),
        None => (s, None),
    };
    Ok((verb.to_ascii_uppercase(), rest))
}

impl FromStr for PhoneCommand {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (verb, rest) = split(s)?;
        let command = match verb.as_str() {
            "CONNECT" => PhoneCommand::Connect(argument("CONNECT", rest)?),
            "CALL" => PhoneCommand::Call(parse_line(rest)?),
            "RING" => PhoneCommand::Ring,
            "DIGITS" => PhoneCommand::Digits(argument("DIGITS", rest)?),
            "HANGUP" => PhoneCommand::Hangup,
            "ANSWER" => PhoneCommand::Answer,
            "MACHINE" => PhoneCommand::Machine,
            "BUSY" => PhoneCommand::Busy,
            "NOANSWER" => PhoneCommand::NoAnswer,
            _ => return Err(ProtocolError::Unknown(verb)),
        };
        Ok(command)
    }
}

impl fmt::Display for PhoneCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhoneCommand::Connect(number) => write!(f, "CONNECT {number}"),
            PhoneCommand::Call(line) => write!(f, "CALL {line}"),
            PhoneCommand::Ring => f.write_str("RING"),
            PhoneCommand::Digits(keys) => write!(f, "DIGITS {keys}"),
            PhoneCommand::Hangup => f.write_str("HANGUP"),
            PhoneCommand::Answer => f.write_str("ANSWER"),
            PhoneCommand::Machine => f.write_str("MACHINE"),
            PhoneCommand::Busy => f.write_str("BUSY"),
            PhoneCommand::NoAnswer => f.write_str("NOANSWER"),
        }
    }
}

impl FromStr for SimulatorMessage {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (verb, rest) = split(s)?;
        let message = match verb.as_str() {
            "OK" => SimulatorMessage::Ok,
            "DIAL" => SimulatorMessage::Dial(parse_line(rest)?),
            "CONNECTED" => SimulatorMessage::Connected(parse_line(rest)?),
            "PLAY" => SimulatorMessage::Play(argument("PLAY", rest)?),
            "AUDIO" => {
                let bytes = argument("AUDIO", rest)?;
                SimulatorMessage::Audio(
                    bytes
                        .parse()
                        .map_err(|_| ProtocolError::MissingArgument("AUDIO"))?,
                )
            }
            "RECORD" => SimulatorMessage::Record(argument("RECORD", rest)?),
            "HANGUP" => SimulatorMessage::Hangup,
            "ERROR" => SimulatorMessage::Error(rest.unwrap_or_default().to_string()),
            _ => return Err(ProtocolError::Unknown(verb)),
        };
        Ok(message)
    }
}

impl fmt::Display for SimulatorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulatorMessage::Ok => f.write_str("OK"),
            SimulatorMessage::Dial(line) => write!(f, "DIAL {line}"),
            SimulatorMessage::Connected(line) => write!(f, "CONNECTED {line}"),
            SimulatorMessage::Play(file) => write!(f, "PLAY {file}"),
            SimulatorMessage::Audio(bytes) => write!(f, "AUDIO {bytes}"),
            SimulatorMessage::Record(file) => write!(f, "RECORD {file}"),
            SimulatorMessage::Hangup => f.write_str("HANGUP"),
            SimulatorMessage::Error(text) => write!(f, "ERROR {text}"),
        }
    }
}
