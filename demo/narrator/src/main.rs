mod config;
use config::NarratorAppConfig;
use narrate_audio::{CliSynthesisBackend, TextLipSync};
use narrate_core::telemetry::init_tracing;
use narrate_core::{NarrationEvent, Narrator};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = init_tracing("info,narrate_core=info,narrate_audio=info,narrator=info") {
        eprintln!("tracing init failed: {e}");
    }

    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = NarratorAppConfig::load();

    let text = read_input().await?;
    if text.trim().is_empty() {
        warn!(target: "narrator", "Nothing to narrate; pass text as arguments or on stdin");
        return Ok(());
    }

    let backend = Arc::new(CliSynthesisBackend::new(cfg.tts.clone()));
    let animator = Arc::new(TextLipSync::new(cfg.lipsync.clone()));
    let narrator = Narrator::new(backend, animator, cfg.narrator.clone());

    info!(
        target: "narrator",
        chars = text.chars().count(),
        "Starting narration: text → units → TTS"
    );

    // Narration events → log (and optionally JSON lines on stdout)
    let mut events = narrator.subscribe();
    let print_events = cfg.print_events;
    let event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ev) => {
                    if print_events {
                        match serde_json::to_string(&ev) {
                            Ok(line) => println!("{line}"),
                            Err(e) => warn!(target: "narrator", error = %e, "Failed to encode event"),
                        }
                    }
                    log_event(&ev);
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(target: "narrator", skipped = n, "Event subscriber lagged")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Mouth openness sampled at animation frame rate
    let sampler = narrator.clone();
    let sampler_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(50));
        loop {
            interval.tick().await;
            if sampler.is_animating() {
                debug!(target: "lipsync", openness = sampler.current_openness(), "frame");
            }
        }
    });

    tokio::select! {
        _ = narrator.narrate(&text) => {}
        res = signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(target: "narrator", error = %e, "Ctrl+C handler failed");
            }
            info!(target: "narrator", "Stopping narration...");
            narrator.stop();
        }
    }

    sampler_task.abort();
    // Let the final events drain before reporting
    tokio::time::sleep(Duration::from_millis(50)).await;
    event_task.abort();

    narrator.stats().log();
    if narrator.is_disabled() {
        warn!(
            target: "narrator",
            retry_in = ?narrator.remaining_cooldown(),
            "Speech synthesis left disabled after repeated failures"
        );
    }
    Ok(())
}

/// Text from the command line, or stdin when no arguments are given.
async fn read_input() -> std::io::Result<String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        return Ok(args.join(" "));
    }
    let mut buf = String::new();
    tokio::io::stdin().read_to_string(&mut buf).await?;
    Ok(buf)
}

fn log_event(ev: &NarrationEvent) {
    match ev {
        NarrationEvent::Started {
            session,
            units,
            chunked,
            ..
        } => info!(target: "narrator", session, units, chunked, "▶️  Narration started"),
        NarrationEvent::UnitFailed {
            session,
            index,
            kind,
            detail,
        } => warn!(target: "narrator", session, index, %kind, %detail, "Unit failed"),
        NarrationEvent::UnitTimedOut {
            session,
            index,
            deadline_ms,
        } => warn!(target: "narrator", session, index, deadline_ms, "Unit timed out"),
        NarrationEvent::Finished {
            session,
            outcome,
            failed_units,
        } => info!(target: "narrator", session, %outcome, failed_units, "⏹️  Narration finished"),
        NarrationEvent::Rejected { reason } => {
            warn!(target: "narrator", %reason, "Narration rejected")
        }
        NarrationEvent::BreakerOpened { cooldown_ms } => {
            warn!(target: "narrator", cooldown_ms, "Speech synthesis disabled")
        }
        NarrationEvent::BreakerClosed => {
            info!(target: "narrator", "Speech synthesis re-enabled")
        }
        other => debug!(target: "narrator", event = ?other, "event"),
    }
}
