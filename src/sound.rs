//! Percussion clips, the key bindings that trigger them and the registry of
//! loaded audio.
//!
//! The set of clips and the key table are fixed at build time. Only the audio
//! bytes come from disk, once, when the registry is loaded.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use crate::error::{ClientError, Result};

pub const CLIP_EXTENSION: &str = "mp3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Clip {
    Drum1,
    Drum2,
    Drum3,
    Drum4,
    Drum5,
    Snare,
}

impl Clip {
    pub const ALL: [Clip; 6] = [
        Clip::Drum1,
        Clip::Drum2,
        Clip::Drum3,
        Clip::Drum4,
        Clip::Drum5,
        Clip::Snare,
    ];

    /// Clip key, also the asset file stem.
    pub fn key(self) -> &'static str {
        match self {
            Clip::Drum1 => "drum_1",
            Clip::Drum2 => "drum_2",
            Clip::Drum3 => "drum_3",
            Clip::Drum4 => "drum_4",
            Clip::Drum5 => "drum_5",
            Clip::Snare => "snare",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.{}", self.key(), CLIP_EXTENSION)
    }
}

impl fmt::Display for Clip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Clip {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        Clip::ALL
            .into_iter()
            .find(|clip| clip.key() == s)
            .ok_or_else(|| ClientError::UnknownClip(s.to_string()))
    }
}

/// Keyboard layout of the drum kit. Matching ignores case.
pub const KEY_BINDINGS: [(char, Clip); 6] = [
    ('q', Clip::Drum1),
    ('w', Clip::Drum2),
    ('e', Clip::Drum3),
    ('a', Clip::Drum4),
    ('s', Clip::Drum5),
    ('d', Clip::Snare),
];

/// Clip bound to a key name, if the key is a single bound character.
pub fn clip_for_key(key: &str) -> Option<Clip> {
    let mut chars = key.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let c = c.to_ascii_lowercase();
    KEY_BINDINGS
        .iter()
        .find(|(bound, _)| *bound == c)
        .map(|(_, clip)| *clip)
}

/// Key that triggers a clip.
pub fn key_for_clip(clip: Clip) -> Option<char> {
    KEY_BINDINGS
        .iter()
        .find(|(_, bound)| *bound == clip)
        .map(|(key, _)| *key)
}

/// Loaded audio for one clip.
#[derive(Debug, Clone)]
pub struct AudioHandle {
    pub clip: Clip,
    pub path: PathBuf,
    pub bytes: Arc<[u8]>,
}

impl AudioHandle {
    pub fn new(clip: Clip, path: impl Into<PathBuf>, bytes: impl Into<Arc<[u8]>>) -> Self {
        AudioHandle {
            clip,
            path: path.into(),
            bytes: bytes.into(),
        }
    }
}

/// Clip registry. Read-only once loaded.
#[derive(Debug, Clone, Default)]
pub struct SoundRegistry {
    clips: IndexMap<Clip, AudioHandle>,
}

impl SoundRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `<clip>.mp3` found in `dir`. Files that are not a known
    /// clip are skipped.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut entries = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(CLIP_EXTENSION)
            })
            .collect::<Vec<_>>();
        entries.sort();

        let mut registry = SoundRegistry::new();
        for path in entries {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match stem.parse::<Clip>() {
                Ok(clip) => {
                    let bytes = std::fs::read(&path)?;
                    debug!("Loaded clip {} ({} bytes)", clip, bytes.len());
                    registry.insert(AudioHandle::new(clip, path.clone(), bytes));
                }
                Err(_) => warn!("Skipping unrecognised sound file {}", path.display()),
            }
        }

        info!("Loaded {} sound clips from {}", registry.len(), dir.display());
        Ok(registry)
    }

    pub fn insert(&mut self, handle: AudioHandle) -> Option<AudioHandle> {
        self.clips.insert(handle.clip, handle)
    }

    pub fn get(&self, clip: Clip) -> Option<&AudioHandle> {
        self.clips.get(&clip)
    }

    pub fn contains(&self, clip: Clip) -> bool {
        self.clips.contains_key(&clip)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn clips(&self) -> impl Iterator<Item = Clip> + '_ {
        self.clips.keys().copied()
    }

    /// Bound clips that have no audio loaded.
    pub fn missing(&self) -> Vec<Clip> {
        KEY_BINDINGS
            .iter()
            .map(|(_, clip)| *clip)
            .filter(|clip| !self.contains(*clip))
            .collect()
    }
}

/// Audio output.
pub trait ClipPlayer: Send + Sync {
    fn play(&self, handle: &AudioHandle) -> Result<()>;
}

/// Player that only records playback in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPlayer;

impl ClipPlayer for LogPlayer {
    fn play(&self, handle: &AudioHandle) -> Result<()> {
        info!("♪ {} ({})", handle.clip, handle.path.display());
        Ok(())
    }
}

/// Registry plus the player that renders it.
pub struct SoundBoard {
    registry: SoundRegistry,
    player: Box<dyn ClipPlayer>,
}

impl SoundBoard {
    pub fn new(registry: SoundRegistry, player: impl ClipPlayer + 'static) -> Self {
        Self::with_player(registry, Box::new(player))
    }

    pub fn with_player(registry: SoundRegistry, player: Box<dyn ClipPlayer>) -> Self {
        let missing = registry.missing();
        if !missing.is_empty() {
            let names = missing.iter().map(|c| c.key()).collect::<Vec<_>>();
            warn!("No audio loaded for bound clips: {}", names.join(", "));
        }
        SoundBoard { registry, player }
    }

    pub fn registry(&self) -> &SoundRegistry {
        &self.registry
    }

    /// Play a clip. Misses and player failures are logged, never raised.
    pub fn play(&self, clip: Clip) -> bool {
        let Some(handle) = self.registry.get(clip) else {
            error!("{}", ClientError::UnknownClip(clip.key().to_string()));
            return false;
        };
        match self.player.play(handle) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to play {}: {}", clip, e);
                false
            }
        }
    }
}
