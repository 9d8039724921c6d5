use crate::config::VoiceProperties;
use crate::error::{Result, VoiceError};
use crate::line::{BaseLine, Line, LineHandle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Backend factory: hands out lines and owns backend-wide resources.
pub trait VoicePlugin: Send + Sync {
    fn get_line(&self, line_number: u32) -> Result<Box<dyn BaseLine>>;

    /// Settings for lines of this backend.
    fn voice_properties(&self) -> VoiceProperties;

    /// Release sockets, devices and the like. Called once all lines are released.
    fn dispose(&self) -> Result<()>;
}

/// Registry of the lines handed out by one plugin.
///
/// The registry lock only covers allocation and release; operations on a
/// line run without it.
pub struct LineManager {
    plugin: Arc<dyn VoicePlugin>,
    properties: VoiceProperties,
    lines: Mutex<HashMap<u32, LineHandle>>,
    disposed: AtomicBool,
}

impl LineManager {
    pub fn new(plugin: Arc<dyn VoicePlugin>) -> Self {
        let properties = plugin.voice_properties();
        Self::with_properties(plugin, properties)
    }

    pub fn with_properties(plugin: Arc<dyn VoicePlugin>, properties: VoiceProperties) -> Self {
        Self {
            plugin,
            properties,
            lines: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn voice_properties(&self) -> &VoiceProperties {
        &self.properties
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<u32, LineHandle>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open line `line_number` and register it.
    pub fn get_line(&self, line_number: u32) -> Result<Line> {
        if line_number == 0 {
            return Err(VoiceError::invalid_argument(
                "line_number",
                "must be a positive integer",
            ));
        }
        let mut lines = self.registry();
        self.open(&mut lines, line_number)
    }

    /// Open the lowest line number not currently registered.
    pub fn get_next_line(&self) -> Result<Line> {
        let mut lines = self.registry();
        let line_number = (1..=u32::MAX)
            .find(|n| !lines.contains_key(n))
            .ok_or_else(|| VoiceError::Voice("no free line number".to_string()))?;
        self.open(&mut lines, line_number)
    }

    fn open(&self, lines: &mut HashMap<u32, LineHandle>, line_number: u32) -> Result<Line> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(VoiceError::Voice("line manager has been disposed".to_string()));
        }
        debug!(line = line_number, "get line");
        let base = self.plugin.get_line(line_number)?;
        let line = Line::new(line_number, base, self.properties.clone());
        lines.insert(line_number, line.handle());
        Ok(line)
    }

    /// Unregister the line, then ask its owner to stop. Unknown numbers are ignored.
    pub fn release_line(&self, line_number: u32) {
        let handle = self.registry().remove(&line_number);
        match handle {
            Some(handle) => {
                debug!(line = line_number, "release line");
                handle.trigger_dispose();
            }
            None => debug!(line = line_number, "release line: not registered"),
        }
    }

    pub fn release_all(&self) {
        let numbers: Vec<u32> = self.registry().keys().copied().collect();
        info!(count = numbers.len(), "releasing all lines");
        for line_number in numbers {
            self.release_line(line_number);
        }
    }

    pub fn line_count(&self) -> usize {
        self.registry().len()
    }

    pub fn is_registered(&self, line_number: u32) -> bool {
        self.registry().contains_key(&line_number)
    }

    /// Release every line, then the plugin. A second call does nothing.
    pub fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            debug!("line manager already disposed");
            return Ok(());
        }
        self.release_all();
        info!("disposing voice plugin");
        self.plugin.dispose()
    }
}
