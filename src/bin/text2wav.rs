use anyhow::Result;
use clap::Parser;
use ivrkit::synthesis::{SynthesisConfig, TextToSpeechCache};
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};

/// Render text to a wav file with the configured speech service, the
/// way a script would before playing it.
#[derive(Parser, Debug)]
#[command(author, version = ivrkit::version::get_short_version(), about, long_about = None)]
struct Args {
    /// Text to speak
    #[arg(value_name = "TEXT")]
    input_text: String,

    /// Path to output WAV file
    #[arg(value_name = "OUTPUT")]
    output_file: PathBuf,

    /// Speech service endpoint
    #[arg(short, long)]
    url: String,

    #[arg(short, long)]
    voice: Option<String>,

    /// Speech rate (0.5-2.0)
    #[arg(short, long)]
    rate: Option<f32>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = SynthesisConfig {
        url: Some(args.url),
        voice: args.voice,
        rate: args.rate,
        cache_dir: None,
    };
    let cache = TextToSpeechCache::new(
        Some(config.create_client()?),
        args.input_text,
        Some(args.output_file.clone()),
    );
    let audio = cache.get_or_generate().await?;
    info!(
        output = %args.output_file.display(),
        bytes = audio.len(),
        "speech written"
    );
    Ok(())
}
