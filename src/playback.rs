use std::io::Cursor;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use rodio::{Decoder, OutputStream, Source};
use tracing::{debug, error};

use crate::error::{ClientError, Result};
use crate::sound::{AudioHandle, ClipPlayer};

/// Plays clips on the default output device.
///
/// The output stream is not `Send`, so it lives on its own thread and clips
/// are queued to it. Each clip is mixed in independently, so rapid presses
/// overlap instead of cutting each other off.
pub struct RodioPlayer {
    tx: mpsc::Sender<AudioHandle>,
}

impl RodioPlayer {
    pub fn new() -> Result<Self> {
        let (tx, rx) = mpsc::channel::<AudioHandle>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        thread::Builder::new()
            .name("drumcall-audio".into())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(output) => output,
                    Err(e) => {
                        let _ = ready_tx.send(Err(ClientError::Playback(e.to_string())));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                for clip in rx {
                    let bytes: Arc<[u8]> = clip.bytes.clone();
                    let source = match Decoder::new(Cursor::new(bytes)) {
                        Ok(source) => source,
                        Err(e) => {
                            error!("Cannot decode {}: {}", clip.path.display(), e);
                            continue;
                        }
                    };
                    if let Err(e) = handle.play_raw(source.convert_samples()) {
                        error!("Cannot play {}: {}", clip.clip, e);
                    }
                }
                debug!("Audio thread stopped");
            })?;

        ready_rx
            .recv()
            .map_err(|_| ClientError::Playback("audio thread exited during startup".into()))??;
        Ok(RodioPlayer { tx })
    }
}

impl ClipPlayer for RodioPlayer {
    fn play(&self, handle: &AudioHandle) -> Result<()> {
        self.tx
            .send(handle.clone())
            .map_err(|_| ClientError::Playback("audio thread is gone".into()))
    }
}
