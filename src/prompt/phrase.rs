use crate::error::{Result, VoiceError};
use crate::line::Line;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// `F`: play the data as a file name.
    File,
    /// `C`: speak the data one character at a time.
    Characters,
}

#[derive(Debug, PartialEq, Eq)]
struct Part<'a> {
    data: &'a str,
    command: Command,
}

/// Split `data|command,data|command,...`. Nothing is played unless the
/// whole phrase parses.
fn parse_phrase(phrase: &str) -> Result<Vec<Part<'_>>> {
    phrase
        .split(',')
        .map(|part| {
            let (data, command) = part.split_once('|').ok_or_else(|| {
                VoiceError::invalid_argument("phrase", format!("`{part}` is not data|command"))
            })?;
            let command = match command {
                "F" => Command::File,
                "C" => Command::Characters,
                other => {
                    return Err(VoiceError::invalid_argument(
                        "phrase",
                        format!("unsupported command `{other}` in `{part}`"),
                    ))
                }
            };
            Ok(Part { data, command })
        })
        .collect()
}

impl Line {
    /// Play a file, or a phrase when the text contains `|`.
    pub async fn play_file_or_phrase(
        &mut self,
        file_or_phrase: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if file_or_phrase.contains('|') {
            self.play_string(file_or_phrase, cancel).await
        } else {
            self.play_file(file_or_phrase, cancel).await
        }
    }

    /// Play a comma separated list of `data|command` parts.
    ///
    /// `F` plays `data` as a file, `C` speaks it with
    /// [`play_characters`](Self::play_characters).
    pub async fn play_string(&mut self, phrase: &str, cancel: &CancellationToken) -> Result<()> {
        debug!(line = self.line_number(), phrase, "play string");
        for part in parse_phrase(phrase)? {
            match part.command {
                Command::File => self.play_file(part.data, cancel).await?,
                Command::Characters => self.play_characters(part.data, cancel).await?,
            }
        }
        Ok(())
    }

    /// Speak digits, letters, `*` and `#`; a space is a short pause.
    /// Anything else is skipped.
    pub async fn play_characters(&mut self, characters: &str, cancel: &CancellationToken) -> Result<()> {
        debug!(line = self.line_number(), characters, "play characters");
        for c in characters.chars() {
            let recording = match c {
                ' ' => {
                    let pause = self.properties.phrase_pause();
                    self.pause(pause, cancel).await?;
                    continue;
                }
                '*' => self.properties.system_recording("star"),
                '#' => self.properties.system_recording("pound"),
                c if c.is_ascii_alphanumeric() => {
                    self.properties
                        .system_recording(c.to_ascii_lowercase().encode_utf8(&mut [0; 4]))
                }
                _ => continue,
            };
            self.play_file(&recording, cancel).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_phrase() {
        let parts = parse_phrase("welcome.wav|F,123|C").unwrap();
        assert_eq!(
            parts,
            vec![
                Part {
                    data: "welcome.wav",
                    command: Command::File
                },
                Part {
                    data: "123",
                    command: Command::Characters
                },
            ]
        );
    }

    #[test]
    fn test_parse_phrase_rejects_unknown_command() {
        let err = parse_phrase("a.wav|F,12.50|M").unwrap_err();
        assert!(matches!(err, VoiceError::InvalidArgument { name: "phrase", .. }));
        assert!(parse_phrase("a.wav|F,plain").is_err());
    }
}
