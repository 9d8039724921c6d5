use super::{CallAnalysis, Line, LineHandle, LineStatus};
use crate::error::Result;
use crate::prompt::{MultiTryPromptOptions, PromptOptions, PromptSource, Validator};
use crate::script::{Script, ScriptManager};
use crate::synthesis::TextToSpeechCache;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Synchronous facade over [`Line`] for plain owning OS threads.
///
/// Every call blocks the current thread on the given runtime, so it must not
/// be used from inside an async task.
pub struct BlockingLine {
    line: Line,
    runtime: Handle,
    cancel: CancellationToken,
}

impl BlockingLine {
    pub fn new(line: Line, runtime: Handle) -> Self {
        Self::with_cancel(line, runtime, CancellationToken::new())
    }

    /// `cancel` aborts whatever call is in flight, in addition to disposal.
    pub fn with_cancel(line: Line, runtime: Handle, cancel: CancellationToken) -> Self {
        Self {
            line,
            runtime,
            cancel,
        }
    }

    pub fn line_number(&self) -> u32 {
        self.line.line_number()
    }

    pub fn status(&self) -> LineStatus {
        self.line.status()
    }

    pub fn last_terminator(&self) -> &str {
        self.line.last_terminator()
    }

    pub fn handle(&self) -> LineHandle {
        self.line.handle()
    }

    pub fn is_disposed(&self) -> bool {
        self.line.is_disposed()
    }

    pub fn wait_rings(&mut self, rings: u32) -> Result<()> {
        self.runtime
            .block_on(self.line.wait_rings(rings, &self.cancel))
    }

    pub fn hangup(&mut self) -> Result<()> {
        self.runtime.block_on(self.line.hangup())
    }

    pub fn take_off_hook(&mut self) -> Result<()> {
        self.runtime.block_on(self.line.take_off_hook())
    }

    pub fn dial(&mut self, number: &str, answering_machine_threshold: Duration) -> Result<CallAnalysis> {
        self.runtime.block_on(
            self.line
                .dial(number, answering_machine_threshold, &self.cancel),
        )
    }

    pub fn dial_default(&mut self, number: &str) -> Result<CallAnalysis> {
        self.runtime
            .block_on(self.line.dial_default(number, &self.cancel))
    }

    pub fn play_file(&mut self, filename: &str) -> Result<()> {
        self.runtime
            .block_on(self.line.play_file(filename, &self.cancel))
    }

    pub fn play_text_to_speech(&mut self, cache: &TextToSpeechCache) -> Result<()> {
        self.runtime
            .block_on(self.line.play_text_to_speech(cache, &self.cancel))
    }

    pub fn record_to_file(&mut self, filename: &str) -> Result<()> {
        self.runtime
            .block_on(self.line.record_to_file(filename, &self.cancel))
    }

    pub fn record_to_file_with_timeout(&mut self, filename: &str, timeout: Duration) -> Result<()> {
        self.runtime.block_on(
            self.line
                .record_to_file_with_timeout(filename, timeout, &self.cancel),
        )
    }

    pub fn get_digits(&mut self, max_digits: usize, terminators: &str) -> Result<String> {
        self.runtime
            .block_on(self.line.get_digits(max_digits, terminators, &self.cancel))
    }

    pub fn flush_digit_buffer(&mut self) -> Result<String> {
        self.runtime.block_on(self.line.flush_digit_buffer())
    }

    pub fn volume(&self) -> Result<i32> {
        self.line.volume()
    }

    pub fn set_volume(&mut self, volume: i32) -> Result<()> {
        self.runtime.block_on(self.line.set_volume(volume))
    }

    pub fn reset(&mut self) -> Result<()> {
        self.runtime.block_on(self.line.reset())
    }

    pub fn prompt(&mut self, source: impl Into<PromptSource>, options: &PromptOptions) -> Result<String> {
        let source = source.into();
        self.runtime
            .block_on(self.line.prompt(source, options, &self.cancel))
    }

    pub fn multi_try_prompt(
        &mut self,
        source: impl Into<PromptSource>,
        validator: Option<&Validator>,
        options: &MultiTryPromptOptions,
    ) -> Result<String> {
        let source = source.into();
        self.runtime.block_on(
            self.line
                .multi_try_prompt(source, validator, options, &self.cancel),
        )
    }

    /// Run a script chain to completion on this line.
    pub fn run_script(&mut self, start: Box<dyn Script>) -> Result<()> {
        let manager = ScriptManager::new(&mut self.line, start, self.cancel.clone());
        self.runtime.block_on(manager.run())
    }

    pub fn dispose(&mut self) -> Result<()> {
        self.runtime.block_on(self.line.dispose())
    }

    pub fn as_line_mut(&mut self) -> &mut Line {
        &mut self.line
    }

    pub fn into_inner(self) -> Line {
        self.line
    }
}

impl std::fmt::Debug for BlockingLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingLine")
            .field("line", &self.line)
            .finish()
    }
}
