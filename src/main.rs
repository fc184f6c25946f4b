//! Application entry point: karaoke session engine.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime.
//! 4. Build the external-tool collaborators and the preparation pipeline.
//! 5. Spawn the session controller (restores the saved queue).
//! 6. Start the TCP remote when enabled.
//! 7. Spawn the event logger.
//! 8. Read control commands from stdin until `quit` or EOF.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;

use karaoke_session::{
    cache::CacheStore,
    collab::{
        CommandDownloader, CommandResolver, CommandSeparator, CommandTranscriber,
        CommandVideoFetcher, ProcessTransportFactory, Resolver, TransportFactory, VideoFetcher,
    },
    config::AppConfig,
    pipeline::{Collaborators, PreparationPipeline},
    remote::{self, ControlCommand, ParseError},
    session::{SessionController, SessionEvent, SessionHandle, SessionOptions},
};

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn build_pipeline(config: &AppConfig) -> PreparationPipeline {
    let pipeline = &config.pipeline;
    let video: Option<Arc<dyn VideoFetcher>> = if pipeline.fetch_video {
        Some(Arc::new(CommandVideoFetcher::new(pipeline.video.clone())))
    } else {
        None
    };
    let collab = Collaborators {
        downloader: Arc::new(CommandDownloader::new(pipeline.download.clone())),
        separator: Arc::new(CommandSeparator::new(
            pipeline.separate.clone(),
            pipeline.separation_model.clone(),
        )),
        transcriber: Arc::new(CommandTranscriber::new(pipeline.transcribe.clone())),
        video,
    };

    let root = config.cache.resolved_root();
    log::info!("Song cache: {}", root.display());
    PreparationPipeline::new(CacheStore::new(root), collab)
}

fn session_options(config: &AppConfig) -> SessionOptions {
    let resolver: Arc<dyn Resolver> =
        Arc::new(CommandResolver::new(config.pipeline.search.clone()));
    SessionOptions {
        state_file: config.session.resolved_state_file(),
        tick: config.playback.tick_interval(),
        vocals_enabled: config.playback.vocals_enabled,
        resolver: Some(resolver),
        search_limit: config.pipeline.search_limit,
    }
}

// ---------------------------------------------------------------------------
// Event logger
// ---------------------------------------------------------------------------

async fn log_events(session: SessionHandle) {
    let mut events = session.subscribe();
    loop {
        match events.recv().await {
            Ok(SessionEvent::Lyric(display)) => {
                log::info!("♪ {}", display.now_showing.text);
            }
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => log::info!("event: {json}"),
                Err(e) => log::warn!("event: cannot encode {event:?}: {e}"),
            },
            Err(RecvError::Lagged(n)) => log::warn!("event: logger skipped {n} events"),
            Err(RecvError::Closed) => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

async fn run_console(session: SessionHandle, submitter: String) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("karaoke-session ready. Type 'state', 'enqueue <artist> | <title> | <source>', or 'quit'.");

    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let reply = match remote::parse_command(&line, &submitter) {
            Ok(ControlCommand::Quit) => break,
            Ok(command) => remote::execute(&session, command).await,
            Err(ParseError::Empty) => continue,
            Err(e) => remote::parse_error_reply(&e),
        };
        println!("{reply}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Karaoke session starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(async move {
        // 4. Pipeline and transports
        let pipeline = Arc::new(build_pipeline(&config));
        let factory: Arc<dyn TransportFactory> = Arc::new(ProcessTransportFactory::new(
            config.playback.audio_player.clone(),
            config.playback.video_player.clone(),
        ));

        // 5. Session controller
        let (controller, session) =
            SessionController::new(pipeline, factory, session_options(&config));
        let controller = tokio::spawn(controller.run());

        // 6. Remote control
        if config.remote.enabled {
            let listener = TcpListener::bind(&config.remote.bind_addr)
                .await
                .with_context(|| format!("binding remote control to {}", config.remote.bind_addr))?;
            tokio::spawn(remote::serve(listener, session.clone()));
        }

        // 7. Event logger
        tokio::spawn(log_events(session.clone()));

        // 8. Console (blocks until quit)
        let console = run_console(session.clone(), config.session.default_submitter.clone()).await;

        if let Err(e) = session.shutdown().await {
            log::warn!("Shutdown request failed: {e}");
        }
        if let Err(e) = controller.await {
            log::error!("Session controller panicked: {e}");
        }
        console
    })?;

    log::info!("Karaoke session stopped");
    Ok(())
}
