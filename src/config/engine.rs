//! Engine-wide configuration: the knobs a host application tunes once at
//! startup, persisted as YAML via [`super::load_config`]/[`super::save_config`].

use serde::{Deserialize, Serialize};

use crate::cue::DEFAULT_BUFFER_FRAMES;
use crate::curves::{PanCurve, VolumeCurve};
use crate::mixer::DEFAULT_MIXER_BUFFER_FRAMES;

/// Platform-relative thread priority request, `0` (lowest) to `99`
/// (highest/realtime). Clamped by [`crate::cue::MAX_THREAD_PRIORITY`] at the
/// point it's actually applied; stored here unvalidated so a config file
/// from a future version doesn't fail to parse.
pub type ThreadPriority = u8;

/// Engine-wide defaults, loaded once at startup and handed to each cue/mixer
/// as it's constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default instance pool size for a cue when the caller doesn't specify
    /// one explicitly.
    pub polyphony: usize,

    /// Frames per mixing iteration for a standalone (unmixed) cue's own
    /// playback thread.
    pub buffer_frames: usize,

    /// Requested OS thread priority for audio threads (standalone cue
    /// players and the mixer's thread). `99` requests the platform maximum.
    pub thread_priority: ThreadPriority,

    /// Default pan curve for newly constructed cues.
    pub pan_type: PanCurve,

    /// Default volume curve for newly constructed cues.
    pub vol_type: VolumeCurve,

    /// Frames per mixing iteration for a [`crate::mixer::Mixer`]'s audio
    /// thread.
    pub mixer_buffer_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            polyphony: 8,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            thread_priority: 99,
            pan_type: PanCurve::default(),
            vol_type: VolumeCurve::default(),
            mixer_buffer_frames: DEFAULT_MIXER_BUFFER_FRAMES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.polyphony, 8);
        assert_eq!(config.buffer_frames, 1024);
        assert_eq!(config.thread_priority, 99);
        assert_eq!(config.pan_type, PanCurve::SineLaw);
        assert_eq!(config.vol_type, VolumeCurve::ExpX4);
        assert_eq!(config.mixer_buffer_frames, 8192);
    }

    #[test]
    fn test_roundtrip_through_yaml() {
        let config = EngineConfig {
            polyphony: 16,
            pan_type: PanCurve::FullLinear,
            ..EngineConfig::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        let loaded: EngineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_yaml_fills_in_defaults() {
        let loaded: EngineConfig = serde_yaml::from_str("polyphony: 4\n").unwrap();
        assert_eq!(loaded.polyphony, 4);
        assert_eq!(loaded.buffer_frames, EngineConfig::default().buffer_frames);
    }
}
