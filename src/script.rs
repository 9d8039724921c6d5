//! Call flows as a chain of script units.
//!
//! Each [`Script`] does its line I/O and names the unit that runs next.

use crate::error::Result;
use crate::line::Line;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What runs after a script unit.
pub enum Next {
    Script(Box<dyn Script>),
    Done,
}

impl Next {
    pub fn script(script: impl Script + 'static) -> Self {
        Next::Script(Box::new(script))
    }
}

#[async_trait]
pub trait Script: Send {
    fn description(&self) -> &str;

    async fn execute(&mut self, line: &mut Line, cancel: &CancellationToken) -> Result<Next>;
}

/// Runs script units on one line until a unit returns [`Next::Done`].
pub struct ScriptManager<'a> {
    line: &'a mut Line,
    next: Option<Box<dyn Script>>,
    cancel: CancellationToken,
}

impl<'a> ScriptManager<'a> {
    pub fn new(line: &'a mut Line, start: Box<dyn Script>, cancel: CancellationToken) -> Self {
        Self {
            line,
            next: Some(start),
            cancel,
        }
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// Run the pending unit and queue whatever it returns.
    pub async fn execute(&mut self) -> Result<()> {
        let Some(mut script) = self.next.take() else {
            return Ok(());
        };
        debug!(
            line = self.line.line_number(),
            script = script.description(),
            "execute script"
        );
        self.next = match script.execute(self.line, &self.cancel).await? {
            Next::Script(next) => Some(next),
            Next::Done => None,
        };
        Ok(())
    }

    pub async fn run(mut self) -> Result<()> {
        while self.has_next() {
            self.execute().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::testing::fake_line;
    use crate::VoiceError;
    use std::sync::{Arc, Mutex};

    struct Say {
        file: &'static str,
        then: Option<&'static str>,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Script for Say {
        fn description(&self) -> &str {
            self.file
        }

        async fn execute(&mut self, line: &mut Line, cancel: &CancellationToken) -> Result<Next> {
            self.log.lock().unwrap().push(self.file.to_string());
            line.play_file(self.file, cancel).await?;
            Ok(match self.then {
                Some(file) => Next::script(Say {
                    file,
                    then: None,
                    log: self.log.clone(),
                }),
                None => Next::Done,
            })
        }
    }

    #[tokio::test]
    async fn test_runs_chain_until_done() {
        let (mut line, fake) = fake_line(1);
        let log = Arc::new(Mutex::new(Vec::new()));
        let start = Box::new(Say {
            file: "welcome.wav",
            then: Some("goodbye.wav"),
            log: log.clone(),
        });

        let mut manager = ScriptManager::new(&mut line, start, CancellationToken::new());
        assert!(manager.has_next());
        manager.execute().await.unwrap();
        assert!(manager.has_next());
        manager.execute().await.unwrap();
        assert!(!manager.has_next());
        manager.execute().await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["welcome.wav", "goodbye.wav"]);
        assert_eq!(fake.played(), vec!["welcome.wav", "goodbye.wav"]);
        line.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn test_error_stops_chain() {
        let (mut line, fake) = fake_line(1);
        fake.fail_next_play(VoiceError::Hangup);
        let log = Arc::new(Mutex::new(Vec::new()));
        let start = Box::new(Say {
            file: "welcome.wav",
            then: Some("goodbye.wav"),
            log: log.clone(),
        });

        let err = ScriptManager::new(&mut line, start, CancellationToken::new())
            .run()
            .await
            .unwrap_err();
        assert!(err.is_hangup());
        assert_eq!(*log.lock().unwrap(), vec!["welcome.wav"]);
        line.dispose().await.unwrap();
    }
}
