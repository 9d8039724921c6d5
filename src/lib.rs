pub mod config;
pub mod demo;
pub mod error;
pub mod line;
pub mod manager;
pub mod prompt;
pub mod script;
pub mod simulator;
pub mod synthesis;
pub mod version;

pub use config::{Config, VoiceProperties};
pub use error::{Result, VoiceError};
pub use line::{BaseLine, BlockingLine, CallAnalysis, Line, LineHandle, LineManagement, LineStatus};
pub use manager::{LineManager, VoicePlugin};
pub use prompt::{MultiTryPromptOptions, PromptOptions, PromptSource};
pub use script::{Next, Script, ScriptManager};
pub use simulator::{Simulator, VirtualPhone};
pub use synthesis::{HttpTextToSpeech, TextToSpeech, TextToSpeechCache};
