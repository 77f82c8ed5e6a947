use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::keyboard::stdin_keys;
use crate::session::Session;
use crate::sound::{ClipPlayer, LogPlayer, SoundBoard, SoundRegistry, KEY_BINDINGS};

fn player(config: &ClientConfig) -> Box<dyn ClipPlayer> {
    if !config.audio_output {
        return Box::new(LogPlayer);
    }

    #[cfg(feature = "playback")]
    {
        match crate::playback::RodioPlayer::new() {
            Ok(player) => return Box::new(player),
            Err(e) => warn!("No audio output, falling back to log playback: {}", e),
        }
    }
    #[cfg(not(feature = "playback"))]
    warn!("Built without the `playback` feature, clips will only be logged");

    Box::new(LogPlayer)
}

pub fn load_sound_board(config: &ClientConfig) -> Result<Arc<SoundBoard>> {
    let registry = SoundRegistry::load(&config.asset_dir)
        .with_context(|| format!("loading sounds from {}", config.asset_dir.display()))?;
    let ready = registry.clips().map(|clip| clip.key()).collect::<Vec<_>>();
    debug!("Clips ready: {}", ready.join(", "));
    Ok(Arc::new(SoundBoard::with_player(registry, player(config))))
}

fn key_help() -> String {
    KEY_BINDINGS
        .iter()
        .map(|(key, clip)| format!("{key}={clip}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Join the configured session and route key presses from stdin until the
/// user interrupts, input ends or the session is closed remotely.
pub async fn run_client(config: ClientConfig) -> Result<()> {
    let sounds = load_sound_board(&config)?;

    let mut session = Session::join(&config, sounds, stdin_keys())
        .await
        .with_context(|| {
            format!(
                "There was an error connecting to session {}",
                config.session_id
            )
        })?;

    let router = session.router();
    info!(
        "Playing as {} with {:?} feedback",
        router.user_name(),
        router.feedback()
    );
    info!("Type keys and press Enter to play: {}", key_help());
    info!("Ctrl-C leaves the session");

    let closed = session.closed();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = closed => warn!("Session was closed by the server"),
        _ = session.keys_exhausted() => info!("Input closed"),
    }

    let participants = session.participants();
    if !participants.is_empty() {
        info!("{} participants were still connected", participants.len());
    }
    session.leave().await;
    Ok(())
}
