//! Cue: an immutable PCM asset with a fixed pool of concurrent playback
//! instances, and the mixing loop that sums them into one buffer.
//!
//! This is the core of the engine (component C3 of the design). Everything
//! else — the mixer, the sink, the standalone player thread — exists to get
//! bytes out of [`Cue::fill_buffer`] and onto an output device.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::cursor::{CursorState, InstanceShared};
use crate::curves::{PanCurve, VolumeCurve};
use crate::error::{EngineError, EngineResult};
use crate::events::{wall_clock_ms, CueId, EngineEvent, EventDispatcher, EventListener};
use crate::mixer::{Mixer, Track};
use crate::packer::pack_pcm_to_bytes;
use crate::sink::{open_default_sink, NullSink, SinkGuard};
use crate::types::SAMPLE_RATE;

/// Default iteration size for a cue's own mixing loop (§6 `buffer_frames`).
pub const DEFAULT_BUFFER_FRAMES: usize = 1024;

/// Crossplatform thread-priority range this engine accepts. Mirrors the
/// `thread_priority` crate's `ThreadPriorityValue` domain (0-99); `open()`
/// rejects anything outside it rather than silently clamping, since a
/// caller-supplied priority that falls outside the platform range usually
/// indicates a unit mix-up (e.g. passing an OS-native nice value).
pub const MIN_THREAD_PRIORITY: i32 = 0;
pub const MAX_THREAD_PRIORITY: i32 = 99;

static NEXT_CUE_ID: AtomicUsize = AtomicUsize::new(1);

fn next_cue_id() -> CueId {
    CueId(NEXT_CUE_ID.fetch_add(1, Ordering::Relaxed) as u64)
}

/// Background-player state for an opened cue: either it owns its own audio
/// thread, or it has been registered as a track with a [`Mixer`].
enum PlayerState {
    Standalone {
        run: Arc<AtomicBool>,
        handle: JoinHandle<()>,
    },
    Mixed {
        mixer: Arc<Mixer>,
        track: Arc<dyn Track>,
    },
}

/// An in-memory stereo PCM asset with a fixed-size pool of playback
/// instances ("cursors"). Immutable after construction except for its
/// instance pool, listener list, and standalone-player run state.
pub struct Cue {
    id: CueId,
    name: String,
    pcm: Vec<f32>,
    frame_count: usize,
    polyphony: usize,
    pan_curve: PanCurve,
    vol_curve: VolumeCurve,
    buffer_frames: usize,

    shared: Vec<InstanceShared>,
    cursors: Mutex<Vec<CursorState>>,
    pool: Mutex<VecDeque<usize>>,

    listeners: EventDispatcher,
    player: Mutex<Option<PlayerState>>,
}

impl Cue {
    /// Construct a cue from a normalized interleaved stereo float buffer.
    /// `pcm.len()` must be even (stereo) and `polyphony` must be at least 1;
    /// both conditions are reported as `InvalidPcm` since the contract table
    /// names only that error for this constructor.
    pub fn make_stereo_cue(
        pcm: Vec<f32>,
        name: impl Into<String>,
        polyphony: usize,
    ) -> EngineResult<Arc<Cue>> {
        Self::make_stereo_cue_with_curves(
            pcm,
            name,
            polyphony,
            PanCurve::default(),
            VolumeCurve::default(),
        )
    }

    /// Same as [`Cue::make_stereo_cue`], with the pan/volume curves (§4.1)
    /// selected explicitly instead of defaulting to `SineLaw`/`ExpX4`.
    /// Curves are immutable for the cue's lifetime — §3 lists them among
    /// the construction-time fields, resolved once per [`fill_buffer`] call
    /// rather than per instance.
    pub fn make_stereo_cue_with_curves(
        pcm: Vec<f32>,
        name: impl Into<String>,
        polyphony: usize,
        pan_curve: PanCurve,
        vol_curve: VolumeCurve,
    ) -> EngineResult<Arc<Cue>> {
        if pcm.len() % 2 != 0 {
            return Err(EngineError::InvalidPcm(format!(
                "pcm length {} is not a multiple of 2 (stereo)",
                pcm.len()
            )));
        }
        if polyphony < 1 {
            return Err(EngineError::InvalidPcm(
                "polyphony must be at least 1".to_string(),
            ));
        }
        let frame_count = pcm.len() / 2;
        let name = name.into();
        let id = next_cue_id();
        log::info!(
            "cue {:?} {:?}: {} frames, polyphony {}",
            id,
            name,
            frame_count,
            polyphony
        );
        Ok(Arc::new(Cue {
            id,
            name,
            pcm,
            frame_count,
            polyphony,
            pan_curve,
            vol_curve,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            shared: (0..polyphony).map(|_| InstanceShared::new()).collect(),
            cursors: Mutex::new(vec![CursorState::new(); polyphony]),
            pool: Mutex::new((0..polyphony).rev().collect()),
            listeners: EventDispatcher::new(),
            player: Mutex::new(None),
        }))
    }

    pub fn id(&self) -> CueId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn polyphony(&self) -> usize {
        self.polyphony
    }

    pub fn get_frame_length(&self) -> usize {
        self.frame_count
    }

    pub fn get_microsecond_length(&self) -> u64 {
        (self.frame_count as u64 * 1_000_000) / SAMPLE_RATE as u64
    }

    pub fn get_pcm_copy(&self) -> Vec<f32> {
        self.pcm.clone()
    }

    pub fn register_listener(&self, listener: Arc<dyn EventListener>) {
        self.listeners.register(listener);
    }

    pub fn unregister_listener(&self, listener: &Arc<dyn EventListener>) {
        self.listeners.unregister(listener);
    }

    fn dispatch(&self, event: EngineEvent) {
        self.listeners.dispatch(event);
    }

    fn check_active(&self, id: usize) -> EngineResult<()> {
        if id >= self.polyphony || !self.shared[id].active() {
            return Err(EngineError::InactiveInstance(id));
        }
        Ok(())
    }

    /// Reset one slot's shared and audio-thread-owned state to pool
    /// defaults (§4.3.2).
    fn reset_instance_locked(&self, id: usize, cursors: &mut [CursorState]) {
        self.shared[id].reset();
        cursors[id].reset();
    }

    /// Take the next free instance from the pool. Returns `None` once every
    /// slot is in use.
    pub fn obtain_instance(&self) -> Option<usize> {
        let id = self.pool.lock().unwrap().pop_back()?;
        self.shared[id].set_active(true);
        self.shared[id].set_recycle_when_done(false);
        self.dispatch(EngineEvent::ObtainInstance {
            cue: self.id,
            instance_id: id,
            wall_ms: wall_clock_ms(),
            frame_at_event: self.cursors.lock().unwrap()[id].cursor,
        });
        Some(id)
    }

    /// Return an instance to the availability pool, resetting its state.
    pub fn release_instance(&self, id: usize) -> EngineResult<()> {
        self.check_active(id)?;
        {
            let mut cursors = self.cursors.lock().unwrap();
            self.reset_instance_locked(id, &mut cursors);
        }
        // New releases go to the head so that a freshly-drained pool keeps
        // handing out the lowest free index first (§9 instance pool note).
        self.pool.lock().unwrap().push_front(id);
        self.dispatch(EngineEvent::ReleaseInstance {
            cue: self.id,
            instance_id: id,
            wall_ms: wall_clock_ms(),
            frame_at_event: 0.0,
        });
        Ok(())
    }

    /// Obtain an instance and start it with default parameters (full
    /// volume, centered pan, unit speed, no extra loops), returning its id
    /// or `-1` if the pool was exhausted.
    pub fn play(self: &Arc<Self>) -> i64 {
        self.play_with(1.0, 0.0, 1.0, 0)
    }

    /// Obtain an instance, set volume/pan/speed/loop count, mark it to
    /// recycle on natural end, and start it. Returns the instance id or
    /// `-1` if the pool was exhausted.
    pub fn play_with(self: &Arc<Self>, volume: f32, pan: f32, speed: f32, loops: i32) -> i64 {
        let Some(id) = self.obtain_instance() else {
            return -1;
        };
        self.shared[id].set_new_target_volume(volume);
        self.shared[id].set_new_target_pan(pan);
        self.shared[id].set_new_target_speed(speed);
        self.shared[id].set_loop_remaining(loops.max(-1));
        self.shared[id].set_recycle_when_done(true);
        // obtain_instance() just made this slot active and non-playing, so
        // start() cannot fail here.
        self.start(id).expect("freshly-obtained instance is startable");
        id as i64
    }

    /// Latch the instance's smoothed parameters (zero ramp) and begin
    /// playback.
    pub fn start(&self, id: usize) -> EngineResult<()> {
        self.check_active(id)?;
        if self.shared[id].playing() {
            return Err(EngineError::InstancePlaying(id));
        }
        let frame = {
            let mut cursors = self.cursors.lock().unwrap();
            cursors[id].latch_from_shared(&self.shared[id]);
            cursors[id].cursor
        };
        self.shared[id].set_playing(true);
        self.dispatch(EngineEvent::StartInstance {
            cue: self.id,
            instance_id: id,
            wall_ms: wall_clock_ms(),
            frame_at_event: frame,
        });
        Ok(())
    }

    /// Stop playback without releasing the instance; the cursor position is
    /// left unchanged.
    pub fn stop(&self, id: usize) -> EngineResult<()> {
        self.check_active(id)?;
        self.shared[id].set_playing(false);
        let frame = self.cursors.lock().unwrap()[id].cursor;
        self.dispatch(EngineEvent::StopInstance {
            cue: self.id,
            instance_id: id,
            wall_ms: wall_clock_ms(),
            frame_at_event: frame,
        });
        Ok(())
    }

    pub fn set_volume(&self, id: usize, volume: f32) -> EngineResult<()> {
        self.check_active(id)?;
        self.shared[id].set_new_target_volume(volume);
        Ok(())
    }

    pub fn set_pan(&self, id: usize, pan: f32) -> EngineResult<()> {
        self.check_active(id)?;
        self.shared[id].set_new_target_pan(pan);
        Ok(())
    }

    pub fn set_speed(&self, id: usize, speed: f32) -> EngineResult<()> {
        self.check_active(id)?;
        self.shared[id].set_new_target_speed(speed);
        Ok(())
    }

    /// While playing, returns the currently-ramping sampled value; while
    /// stopped, returns the last value written by a setter (`new_target`).
    pub fn get_volume(&self, id: usize) -> EngineResult<f32> {
        self.check_active(id)?;
        Ok(if self.shared[id].playing() {
            self.cursors.lock().unwrap()[id].volume.current
        } else {
            self.shared[id].new_target_volume()
        })
    }

    pub fn get_pan(&self, id: usize) -> EngineResult<f32> {
        self.check_active(id)?;
        Ok(if self.shared[id].playing() {
            self.cursors.lock().unwrap()[id].pan.current
        } else {
            self.shared[id].new_target_pan()
        })
    }

    pub fn get_speed(&self, id: usize) -> EngineResult<f32> {
        self.check_active(id)?;
        Ok(if self.shared[id].playing() {
            self.cursors.lock().unwrap()[id].speed.current
        } else {
            self.shared[id].new_target_speed()
        })
    }

    fn check_settable_position(&self, id: usize) -> EngineResult<()> {
        self.check_active(id)?;
        if self.shared[id].playing() {
            return Err(EngineError::InstancePlaying(id));
        }
        Ok(())
    }

    pub fn set_frame_position(&self, id: usize, frame: f64) -> EngineResult<()> {
        self.check_settable_position(id)?;
        let max = (self.frame_count.saturating_sub(1)) as f64;
        self.cursors.lock().unwrap()[id].cursor = frame.clamp(0.0, max);
        Ok(())
    }

    pub fn set_microsecond_position(&self, id: usize, micros: u64) -> EngineResult<()> {
        let frame = (SAMPLE_RATE as u128 * micros as u128) as f64 / 1_000_000.0;
        self.set_frame_position(id, frame)
    }

    pub fn set_fractional_position(&self, id: usize, fraction: f64) -> EngineResult<()> {
        let fraction = fraction.clamp(0.0, 1.0);
        self.check_settable_position(id)?;
        self.cursors.lock().unwrap()[id].cursor = fraction * self.frame_count as f64;
        Ok(())
    }

    pub fn get_frame_position(&self, id: usize) -> EngineResult<f64> {
        self.check_active(id)?;
        Ok(self.cursors.lock().unwrap()[id].cursor)
    }

    /// `-1` = loop forever, `0` = stop at the next natural end, `n > 0` =
    /// loop `n` more times.
    pub fn set_looping(&self, id: usize, loops: i32) -> EngineResult<()> {
        self.check_active(id)?;
        self.shared[id].set_loop_remaining(loops.max(-1));
        Ok(())
    }

    pub fn set_recycle_when_done(&self, id: usize, recycle: bool) -> EngineResult<()> {
        self.check_active(id)?;
        self.shared[id].set_recycle_when_done(recycle);
        Ok(())
    }

    /// Read one stereo frame at a (possibly fractional) cursor position,
    /// linearly interpolating between the floor and ceiling frames. Reading
    /// at or past `frame_count` (the one valid cursor position with no
    /// corresponding sample) returns silence rather than panicking.
    #[inline]
    fn read_frame(&self, cursor: f64) -> (f32, f32) {
        let floor = cursor.floor();
        let idx = floor as usize;
        if idx >= self.frame_count {
            return (0.0, 0.0);
        }
        let t = (cursor - floor) as f32;
        let a_l = self.pcm[2 * idx];
        let a_r = self.pcm[2 * idx + 1];
        if t == 0.0 || idx + 1 >= self.frame_count {
            (a_l, a_r)
        } else {
            let b_l = self.pcm[2 * (idx + 1)];
            let b_r = self.pcm[2 * (idx + 1) + 1];
            (a_l + (b_l - a_l) * t, a_r + (b_r - a_r) * t)
        }
    }

    /// The heart of the engine (§4.3.1). Zeros `out`, then sums every
    /// playing instance's contribution into it sample by sample, advancing
    /// each cursor, applying the smoothing protocol, and handling loop /
    /// natural-end transitions. `out.len()` must be even (interleaved
    /// stereo); the caller picks the buffer length.
    pub fn fill_buffer(&self, out: &mut [f32]) {
        out.fill(0.0);
        let frame_count_f = self.frame_count as f64;
        let n_frames = out.len() / 2;
        let mut cursors = self.cursors.lock().unwrap();

        for i in 0..self.polyphony {
            if !self.shared[i].playing() {
                continue;
            }
            let shared = &self.shared[i];
            let cstate = &mut cursors[i];

            let mut vol_gain = self.vol_curve.gain(cstate.volume.current);
            let (mut pan_l, mut pan_r) = self.pan_curve.gains(cstate.pan.current);

            for k in 0..n_frames {
                let (vol_changed, pan_changed, _speed_changed) = cstate.advance_one_sample(shared);
                if vol_changed {
                    vol_gain = self.vol_curve.gain(cstate.volume.current);
                }
                if pan_changed {
                    let gains = self.pan_curve.gains(cstate.pan.current);
                    pan_l = gains.0;
                    pan_r = gains.1;
                }

                let (sl, sr) = self.read_frame(cstate.cursor);
                out[2 * k] += sl * vol_gain * pan_l;
                out[2 * k + 1] += sr * vol_gain * pan_r;

                cstate.cursor += cstate.speed.current as f64;

                if cstate.cursor > frame_count_f - 1.0 {
                    let loop_remaining = shared.loop_remaining();
                    if loop_remaining == -1 {
                        cstate.cursor = 0.0;
                        self.dispatch(EngineEvent::Loop {
                            cue: self.id,
                            instance_id: i,
                            wall_ms: wall_clock_ms(),
                            frame_at_event: 0.0,
                        });
                    } else if loop_remaining > 0 {
                        shared.decrement_loop_remaining();
                        cstate.cursor = 0.0;
                        self.dispatch(EngineEvent::Loop {
                            cue: self.id,
                            instance_id: i,
                            wall_ms: wall_clock_ms(),
                            frame_at_event: 0.0,
                        });
                    } else {
                        // Natural end, no more loops. Leave the cursor
                        // pinned at `frame_count` (invariant 1: cursor <=
                        // frame_count) rather than at its last
                        // pre-overflow value.
                        cstate.cursor = frame_count_f;
                        shared.set_playing(false);
                        self.dispatch(EngineEvent::StopInstance {
                            cue: self.id,
                            instance_id: i,
                            wall_ms: wall_clock_ms(),
                            frame_at_event: cstate.cursor,
                        });
                        if shared.recycle_when_done() {
                            self.reset_instance_locked(i, &mut cursors);
                            self.pool.lock().unwrap().push_front(i);
                            self.dispatch(EngineEvent::ReleaseInstance {
                                cue: self.id,
                                instance_id: i,
                                wall_ms: wall_clock_ms(),
                                frame_at_event: 0.0,
                            });
                        }
                        break;
                    }
                }
            }
        }
    }

    /// Convenience wrapper around [`fill_buffer`] sized to this cue's
    /// configured `buffer_frames`; allocates a fresh buffer each call. The
    /// zero-allocation path used by [`Mixer`] is [`Track::read_track_into`].
    pub fn read_track(&self) -> Vec<f32> {
        let mut out = vec![0.0f32; 2 * self.buffer_frames];
        self.fill_buffer(&mut out);
        out
    }

    fn any_instance_playing(&self) -> bool {
        self.shared.iter().any(|s| s.playing())
    }

    /// Start this cue's own audio thread (`mixer = None`), or register it
    /// as a track with `mixer` instead of spawning one. Fails `AlreadyOpen`
    /// if already open, `InvalidParameter` if `thread_priority` is outside
    /// the platform range.
    pub fn open(
        self: &Arc<Self>,
        mixer: Option<&Arc<Mixer>>,
        buffer_frames: usize,
        thread_priority: i32,
    ) -> EngineResult<()> {
        let mut player = self.player.lock().unwrap();
        if player.is_some() {
            return Err(EngineError::AlreadyOpen);
        }
        if !(MIN_THREAD_PRIORITY..=MAX_THREAD_PRIORITY).contains(&thread_priority) {
            return Err(EngineError::InvalidParameter(format!(
                "thread priority {} outside platform range [{}, {}]",
                thread_priority, MIN_THREAD_PRIORITY, MAX_THREAD_PRIORITY
            )));
        }

        *player = Some(match mixer {
            Some(mixer) => {
                let track: Arc<dyn Track> = self.clone();
                mixer.add_track(track.clone());
                mixer.update_tracks();
                PlayerState::Mixed {
                    mixer: Arc::clone(mixer),
                    track,
                }
            }
            None => {
                let run = Arc::new(AtomicBool::new(true));
                let handle = spawn_standalone_player(
                    Arc::clone(self),
                    Arc::clone(&run),
                    buffer_frames,
                    thread_priority,
                );
                PlayerState::Standalone { run, handle }
            }
        });

        log::info!(
            "cue {:?} {:?}: opened (priority {}, buffer_frames {})",
            self.id,
            self.name,
            thread_priority,
            buffer_frames
        );
        self.dispatch(EngineEvent::AudioCueOpened {
            cue: self.id,
            wall_ms: wall_clock_ms(),
            thread_priority,
            buffer_frames: buffer_frames as u32,
        });
        Ok(())
    }

    /// Stop the standalone thread (or deregister from the mixer) opened by
    /// [`Cue::open`]. Fails `AlreadyClosed` if not currently open.
    pub fn close(&self) -> EngineResult<()> {
        let taken = self.player.lock().unwrap().take();
        match taken {
            None => Err(EngineError::AlreadyClosed),
            Some(PlayerState::Standalone { run, handle }) => {
                run.store(false, Ordering::Relaxed);
                let _ = handle.join();
                self.dispatch(EngineEvent::AudioCueClosed {
                    cue: self.id,
                    wall_ms: wall_clock_ms(),
                });
                Ok(())
            }
            Some(PlayerState::Mixed { mixer, track }) => {
                mixer.remove_track(&track);
                mixer.update_tracks();
                self.dispatch(EngineEvent::AudioCueClosed {
                    cue: self.id,
                    wall_ms: wall_clock_ms(),
                });
                Ok(())
            }
        }
    }
}

impl Track for Cue {
    fn read_track_into(&self, out: &mut [f32]) {
        self.fill_buffer(out);
    }

    fn is_running(&self) -> bool {
        self.any_instance_playing()
    }
}

/// Body of a cue's own audio thread (§4.4). Runs until `run` is cleared,
/// draining and closing the sink on every exit path.
fn spawn_standalone_player(
    cue: Arc<Cue>,
    run: Arc<AtomicBool>,
    buffer_frames: usize,
    thread_priority: i32,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("cue-{}-player", cue.id.0))
        .spawn(move || {
            if let Err(e) = thread_priority::set_current_thread_priority(
                thread_priority::ThreadPriority::Crossplatform(
                    (thread_priority as u8)
                        .try_into()
                        .expect("validated in Cue::open"),
                ),
            ) {
                log::warn!(
                    "cue {:?}: failed to set audio thread priority to {}: {:?}",
                    cue.id,
                    thread_priority,
                    e
                );
            }

            let mut sink = SinkGuard::new(match open_default_sink(buffer_frames * 4) {
                Ok(sink) => sink,
                Err(e) => {
                    log::error!("cue {:?}: no sink available, using NullSink: {}", cue.id, e);
                    Box::new(NullSink::new())
                }
            });
            if let Err(e) = sink.start() {
                log::error!("cue {:?}: failed to start sink: {}", cue.id, e);
                return;
            }

            let mut read_buf = vec![0.0f32; 2 * buffer_frames];
            let mut byte_buf = vec![0u8; 4 * buffer_frames];

            while run.load(Ordering::Relaxed) {
                cue.fill_buffer(&mut read_buf);
                if let Err(e) = pack_pcm_to_bytes(&mut byte_buf, &read_buf) {
                    log::error!("cue {:?}: pack error: {}", cue.id, e);
                    break;
                }
                if let Err(e) = sink.write(&byte_buf) {
                    log::error!("cue {:?}: sink write error: {}", cue.id, e);
                    break;
                }
            }
            // SinkGuard's Drop runs drain()/close() here, on every exit path.
        })
        .expect("failed to spawn cue audio thread")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_pcm(value: f32, frames: usize) -> Vec<f32> {
        (0..frames * 2).map(|_| value).collect()
    }

    fn ramp_pcm(frames: usize) -> Vec<f32> {
        (0..frames).flat_map(|i| [i as f32, i as f32]).collect()
    }

    #[test]
    fn test_obtain_returns_distinct_ids_then_sentinel() {
        let cue = Cue::make_stereo_cue(vec![0.0; 44100 * 2], "s1", 2).unwrap();
        assert_eq!(cue.obtain_instance(), Some(0));
        assert_eq!(cue.obtain_instance(), Some(1));
        assert_eq!(cue.obtain_instance(), None);
    }

    #[test]
    fn test_fractional_position_roundtrip() {
        let cue = Cue::make_stereo_cue(vec![0.0; 44100 * 2], "s2", 1).unwrap();
        let id = cue.obtain_instance().unwrap();
        cue.set_fractional_position(id, 0.5).unwrap();
        assert_eq!(cue.get_frame_position(id).unwrap(), 22050.0);
    }

    #[test]
    fn test_read_track_without_start_is_silent() {
        let cue = Cue::make_stereo_cue(vec![0.5; 2048], "s3", 2).unwrap();
        cue.obtain_instance().unwrap();
        let out = cue.read_track();
        assert_eq!(out.len(), 2 * DEFAULT_BUFFER_FRAMES);
        assert!(out.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_release_then_control_ops_fail_inactive() {
        let cue = Cue::make_stereo_cue(vec![0.0; 2048], "s4", 1).unwrap();
        let id = cue.obtain_instance().unwrap();
        cue.release_instance(id).unwrap();
        assert!(matches!(
            cue.start(id),
            Err(EngineError::InactiveInstance(_))
        ));
        assert!(matches!(cue.stop(id), Err(EngineError::InactiveInstance(_))));
        assert!(matches!(
            cue.set_volume(id, 0.5),
            Err(EngineError::InactiveInstance(_))
        ));
    }

    #[test]
    fn test_stationary_cue_constant_gain() {
        let cue = Cue::make_stereo_cue(constant_pcm(0.6, crate::cursor::VOLUME_STEPS as usize + 8), "s5", 1)
            .unwrap();
        let id = cue.play_with(1.0, 0.0, 1.0, 0);
        assert!(id >= 0);
        // play_with()'s parameters are latched with zero ramp at start(),
        // so gain is 1.0 for the whole buffer; pan curve resolves to its
        // center gain on both channels.
        let mut out = vec![0.0f32; 2 * (crate::cursor::VOLUME_STEPS as usize + 8)];
        cue.fill_buffer(&mut out);
        let (pl, pr) = PanCurve::default().gains(0.0);
        let last = out.len() - 2;
        assert!((out[last] - 0.6 * pl).abs() < 1e-5);
        assert!((out[last + 1] - 0.6 * pr).abs() < 1e-5);
    }

    #[test]
    fn test_full_linear_pan_center_splits_evenly() {
        let frames = 16;
        let cue = Cue::make_stereo_cue_with_curves(
            constant_pcm(0.8, frames),
            "s6",
            1,
            PanCurve::FullLinear,
            VolumeCurve::default(),
        )
        .unwrap();
        let id = cue.play_with(1.0, 0.0, 1.0, 0);
        assert!(id >= 0);
        let mut out = vec![0.0f32; 2 * frames];
        cue.fill_buffer(&mut out);
        assert!((out[0] - 0.4).abs() < 1e-5);
        assert!((out[1] - 0.4).abs() < 1e-5);
    }

    #[test]
    fn test_sine_law_pan_center_default_curve() {
        let frames = 16;
        let cue = Cue::make_stereo_cue(constant_pcm(0.8, frames), "s6b", 1).unwrap();
        let id = cue.play_with(1.0, 0.0, 1.0, 0);
        assert!(id >= 0);
        let mut out = vec![0.0f32; 2 * frames];
        cue.fill_buffer(&mut out);
        let expected = (std::f32::consts::FRAC_PI_4).sin() * 0.8;
        assert!((out[0] - expected).abs() < 1e-5);
        assert!((out[1] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_speed_ramp_and_ramp_buffer_advance() {
        let frames = 4096 + 16;
        let cue = Cue::make_stereo_cue(ramp_pcm(frames), "s7", 1).unwrap();
        let id = cue.play_with(1.0, 0.0, 0.75, 0);
        assert!(id >= 0);
        let buf_frames = frames;
        let mut out = vec![0.0f32; 2 * buf_frames];
        cue.fill_buffer(&mut out);
        // Speed was requested at play() time and latched with zero ramp at
        // start(), so it is already 0.75 for the whole buffer: cursor after
        // one full buffer of `buf_frames` samples is `0.75 * buf_frames`.
        let cursor = cue.get_frame_position(id).unwrap();
        assert!((cursor - 0.75 * buf_frames as f64).abs() < 1e-6);
    }

    #[test]
    fn test_loop_count_then_stop_and_recycle() {
        let frames = 8;
        let cue = Cue::make_stereo_cue(constant_pcm(0.1, frames), "s8", 1).unwrap();
        let id = cue.obtain_instance().unwrap();
        cue.set_looping(id, 2).unwrap();
        cue.set_recycle_when_done(id, true).unwrap();
        cue.set_speed(id, 1.0).unwrap();
        cue.start(id).unwrap();

        let loops = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        struct Counter(Arc<std::sync::atomic::AtomicUsize>);
        impl EventListener for Counter {
            fn on_event(&self, event: EngineEvent) {
                if matches!(event, EngineEvent::Loop { .. }) {
                    self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
            }
        }
        let listener: Arc<dyn EventListener> = Arc::new(Counter(loops.clone()));
        cue.register_listener(listener);

        // Four passes through an 8-frame cue at speed 1.0: 8 samples each.
        let mut out = vec![0.0f32; 2 * frames * 4];
        cue.fill_buffer(&mut out);

        assert_eq!(loops.load(std::sync::atomic::Ordering::Relaxed), 2);
        // Having recycled, the instance is back in the pool.
        assert!(matches!(
            cue.stop(id),
            Err(EngineError::InactiveInstance(_))
        ));
    }
}
