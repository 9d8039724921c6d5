use anyhow::Result;
use clap::Parser;
use ivrkit::config::{Cli, Config};
use ivrkit::demo::{self, DemoContext};
use ivrkit::{BlockingLine, LineManager, Simulator, VoiceError};
use std::fs::File;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{error, info, level_filters::LevelFilter, warn};

/// Answer calls on one line until it is released.
fn serve_line(mut line: BlockingLine, context: DemoContext) {
    let line_number = line.line_number();
    loop {
        let result = match line.wait_rings(1) {
            Ok(()) => line.run_script(demo::welcome(context.clone())),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => info!(line = line_number, "call finished"),
            Err(VoiceError::Hangup) => info!(line = line_number, "caller hung up"),
            Err(e) if e.is_terminal() => {
                info!(line = line_number, "line released");
                break;
            }
            Err(e) => {
                warn!(line = line_number, "call failed: {}", e);
                break;
            }
        }
        if let Err(e) = line.hangup() {
            if e.is_terminal() {
                break;
            }
            warn!(line = line_number, "hangup failed: {}", e);
        }
    }
    if let Err(e) = line.dispose() {
        warn!(line = line_number, "dispose failed: {}", e);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::resolve(cli.conf.as_deref())?;

    let mut log_fmt = tracing_subscriber::fmt();
    if let Some(ref level) = config.log_level {
        if let Ok(lv) = level.as_str().parse::<LevelFilter>() {
            log_fmt = log_fmt.with_max_level(lv);
        }
    }

    let _log_guard = if let Some(ref log_file) = config.log_file {
        let file = File::create(log_file)
            .map_err(|e| anyhow::anyhow!("Failed to create log file {}: {}", log_file, e))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        log_fmt.with_writer(non_blocking).try_init().ok();
        Some(guard)
    } else {
        log_fmt.try_init().ok();
        None
    };
    info!("{}", ivrkit::version::get_version_info());

    let simulator = Arc::new(Simulator::new(config.voice.clone()));
    let addr = simulator.listen(&config.simulator.addr).await?;
    let manager = Arc::new(LineManager::new(simulator.clone()));

    let mut context = DemoContext::default();
    if let Some(tts) = &config.tts {
        if tts.url.is_some() {
            context.tts = Some(tts.create_client()?);
        }
        context.tts_cache_dir = tts.cache_dir();
    }

    let mut workers = Vec::new();
    for _ in 0..config.lines {
        let line = manager.get_next_line()?;
        let line_number = line.line_number();
        let line = BlockingLine::new(line, Handle::current());
        let context = context.clone();
        let worker = std::thread::Builder::new()
            .name(format!("line-{line_number}"))
            .spawn(move || serve_line(line, context))?;
        workers.push(worker);
    }

    info!(%addr, lines = config.lines, "Starting ivrkit");
    tokio::signal::ctrl_c().await?;
    info!("Received CTRL+C, shutting down");

    manager.release_all();
    tokio::task::spawn_blocking(move || {
        for worker in workers {
            if worker.join().is_err() {
                error!("line worker panicked");
            }
        }
    })
    .await?;
    manager.dispose()?;
    Ok(())
}
