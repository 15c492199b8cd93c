//! Mixer: aggregates multiple cue tracks, clamps the sum, and writes to an
//! output sink on its own thread (§4.5).
//!
//! Tracks are staged and activated in two phases so the audio thread never
//! blocks behind a control-thread registration: `add_track`/`remove_track`
//! only touch a `Mutex`-guarded staging list, and `update_tracks` publishes
//! a fresh `Arc` snapshot behind an `ArcSwap` plus a dirty flag. The audio
//! thread adopts the new snapshot at the top of its next iteration.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwap;

use crate::error::{EngineError, EngineResult};
use crate::packer::pack_pcm_to_bytes;
use crate::sink::{open_default_sink, AudioSink, NullSink, SinkGuard};

/// Default iteration size for a mixer's own mixing loop (§6
/// `mixer_buffer_frames`).
pub const DEFAULT_MIXER_BUFFER_FRAMES: usize = 8192;

/// A mixer's view of something it can sum into its output: a buffer source
/// plus a running flag. [`crate::cue::Cue`] is the only implementation in
/// this crate, but the trait keeps the mixer decoupled from the concrete
/// cue type.
pub trait Track: Send + Sync {
    /// Fill `out` (length `2 * mixer_buffer_frames`) with this track's next
    /// buffer. Never allocates on the hot path.
    fn read_track_into(&self, out: &mut [f32]);

    /// Whether the mixer should bother reading from this track this
    /// iteration. For a cue, true iff at least one instance is playing.
    fn is_running(&self) -> bool;
}

struct AudioThread {
    run: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Aggregates cue tracks into one output stream.
pub struct Mixer {
    buffer_frames: usize,
    staging: Mutex<Vec<Arc<dyn Track>>>,
    snapshot: ArcSwap<Vec<Arc<dyn Track>>>,
    dirty: AtomicBool,
    thread: Mutex<Option<AudioThread>>,
}

impl Mixer {
    pub fn new(buffer_frames: usize) -> Arc<Mixer> {
        Arc::new(Mixer {
            buffer_frames,
            staging: Mutex::new(Vec::new()),
            snapshot: ArcSwap::from_pointee(Vec::new()),
            dirty: AtomicBool::new(false),
            thread: Mutex::new(None),
        })
    }

    pub fn buffer_frames(&self) -> usize {
        self.buffer_frames
    }

    pub fn is_running(&self) -> bool {
        self.thread.lock().unwrap().is_some()
    }

    /// Stage a track for inclusion. Takes effect on the next
    /// [`Mixer::update_tracks`] call.
    pub fn add_track(&self, track: Arc<dyn Track>) {
        self.staging.lock().unwrap().push(track);
    }

    /// Remove a staged track by pointer identity. Takes effect on the next
    /// [`Mixer::update_tracks`] call.
    pub fn remove_track(&self, track: &Arc<dyn Track>) {
        self.staging
            .lock()
            .unwrap()
            .retain(|t| !Arc::ptr_eq(t, track));
    }

    /// Atomically publish the staging list as the new snapshot and mark it
    /// dirty. A late or duplicate adoption by the audio thread is
    /// acceptable; a missed one is not, so this always sets the flag even
    /// if the staging list is unchanged.
    pub fn update_tracks(&self) {
        let staged = self.staging.lock().unwrap().clone();
        self.snapshot.store(Arc::new(staged));
        self.dirty.store(true, Ordering::Release);
    }

    /// Start the mixer's audio thread. Seeds the snapshot from the current
    /// staging list, acquires the output sink, and begins the mix loop.
    /// Fails `AlreadyRunning` if already started.
    pub fn start(self: &Arc<Self>) -> EngineResult<()> {
        let mut thread_guard = self.thread.lock().unwrap();
        if thread_guard.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        self.update_tracks();

        let sink: Box<dyn AudioSink> = match open_default_sink(self.buffer_frames * 4) {
            Ok(sink) => sink,
            Err(e) => {
                log::warn!("mixer: no output device available ({}), using NullSink", e);
                Box::new(NullSink::new())
            }
        };

        let run = Arc::new(AtomicBool::new(true));
        let handle = spawn_mixer_thread(Arc::clone(self), Arc::clone(&run), sink);
        *thread_guard = Some(AudioThread { run, handle });
        log::info!("mixer: started (buffer_frames {})", self.buffer_frames);
        Ok(())
    }

    /// Stop the mixer's audio thread; it drains and closes the sink before
    /// exiting. Fails `AlreadyStopped` if not running.
    pub fn stop(&self) -> EngineResult<()> {
        let taken = self.thread.lock().unwrap().take();
        match taken {
            None => Err(EngineError::AlreadyStopped),
            Some(audio_thread) => {
                audio_thread.run.store(false, Ordering::Relaxed);
                let _ = audio_thread.handle.join();
                log::info!("mixer: stopped");
                Ok(())
            }
        }
    }
}

fn spawn_mixer_thread(
    mixer: Arc<Mixer>,
    run: Arc<AtomicBool>,
    sink: Box<dyn AudioSink>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("mixer-audio".to_string())
        .spawn(move || {
            let mut sink = SinkGuard::new(sink);
            if let Err(e) = sink.start() {
                log::error!("mixer: failed to start sink: {}", e);
                return;
            }

            let buffer_frames = mixer.buffer_frames;
            let mut snapshot = mixer.snapshot.load_full();
            let mut mix_buf = vec![0.0f32; 2 * buffer_frames];
            let mut scratch = vec![0.0f32; 2 * buffer_frames];
            let mut byte_buf = vec![0u8; 4 * buffer_frames];

            while run.load(Ordering::Relaxed) {
                if mixer.dirty.swap(false, Ordering::Acquire) {
                    snapshot = mixer.snapshot.load_full();
                }

                mix_buf.fill(0.0);
                for track in snapshot.iter() {
                    if !track.is_running() {
                        continue;
                    }
                    let track = track.as_ref();
                    let result = catch_unwind(AssertUnwindSafe(|| {
                        track.read_track_into(&mut scratch);
                    }));
                    match result {
                        Ok(()) => {
                            for (dst, src) in mix_buf.iter_mut().zip(scratch.iter()) {
                                *dst += *src;
                            }
                        }
                        Err(_) => {
                            log::error!("mixer: a track's read_track panicked; skipping it this iteration");
                        }
                    }
                }

                for sample in mix_buf.iter_mut() {
                    *sample = sample.clamp(-1.0, 1.0);
                }

                if let Err(e) = pack_pcm_to_bytes(&mut byte_buf, &mix_buf) {
                    log::error!("mixer: pack error: {}", e);
                    break;
                }
                if let Err(e) = sink.write(&byte_buf) {
                    log::error!("mixer: sink write error: {}", e);
                    break;
                }
            }
            // SinkGuard's Drop runs drain()/close() here, on every exit path.
        })
        .expect("failed to spawn mixer audio thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct ConstantTrack {
        value: f32,
        running: bool,
    }

    impl Track for ConstantTrack {
        fn read_track_into(&self, out: &mut [f32]) {
            out.fill(self.value);
        }

        fn is_running(&self) -> bool {
            self.running
        }
    }

    struct PanickingTrack;

    impl Track for PanickingTrack {
        fn read_track_into(&self, _out: &mut [f32]) {
            panic!("synthetic track failure");
        }

        fn is_running(&self) -> bool {
            true
        }
    }

    fn sum_once(tracks: Vec<Arc<dyn Track>>, buffer_frames: usize) -> Vec<f32> {
        let mut mix_buf = vec![0.0f32; 2 * buffer_frames];
        let mut scratch = vec![0.0f32; 2 * buffer_frames];
        for track in &tracks {
            if !track.is_running() {
                continue;
            }
            let result = catch_unwind(AssertUnwindSafe(|| track.read_track_into(&mut scratch)));
            if result.is_ok() {
                for (dst, src) in mix_buf.iter_mut().zip(scratch.iter()) {
                    *dst += *src;
                }
            }
        }
        for sample in mix_buf.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
        mix_buf
    }

    #[test]
    fn test_sum_of_k_copies_clamps() {
        let track: Arc<dyn Track> = Arc::new(ConstantTrack {
            value: 0.5,
            running: true,
        });
        let tracks: Vec<Arc<dyn Track>> = (0..4).map(|_| track.clone()).collect();
        let out = sum_once(tracks, 4);
        // 4 * 0.5 = 2.0, clamped to 1.0.
        assert!(out.iter().all(|&x| (x - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_non_running_track_contributes_nothing() {
        let tracks: Vec<Arc<dyn Track>> = vec![Arc::new(ConstantTrack {
            value: 0.9,
            running: false,
        })];
        let out = sum_once(tracks, 4);
        assert!(out.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_panicking_track_contributes_zero_others_unaffected() {
        let good: Arc<dyn Track> = Arc::new(ConstantTrack {
            value: 0.3,
            running: true,
        });
        let bad: Arc<dyn Track> = Arc::new(PanickingTrack);
        let out = sum_once(vec![bad, good], 4);
        assert!(out.iter().all(|&x| (x - 0.3).abs() < 1e-6));
    }

    #[test]
    fn test_add_then_remove_track_empties_staging() {
        let mixer = Mixer::new(8);
        let track: Arc<dyn Track> = Arc::new(ConstantTrack {
            value: 0.1,
            running: true,
        });
        mixer.add_track(track.clone());
        assert_eq!(mixer.staging.lock().unwrap().len(), 1);
        mixer.remove_track(&track);
        assert_eq!(mixer.staging.lock().unwrap().len(), 0);
    }

    #[test]
    fn test_stop_without_start_is_already_stopped() {
        let mixer = Mixer::new(8);
        assert!(matches!(mixer.stop(), Err(EngineError::AlreadyStopped)));
    }

    #[test]
    fn test_update_tracks_sets_dirty_flag() {
        let mixer = Mixer::new(8);
        assert!(!mixer.dirty.load(Ordering::Relaxed));
        mixer.update_tracks();
        assert!(mixer.dirty.load(Ordering::Relaxed));
    }

    #[test]
    fn test_running_flag_tracks_atomic_counter() {
        // Sanity check that is_running reflects a Track impl's own state
        // rather than anything the mixer infers.
        let counter = Arc::new(AtomicUsize::new(0));
        struct Flagged(Arc<AtomicUsize>);
        impl Track for Flagged {
            fn read_track_into(&self, out: &mut [f32]) {
                self.0.fetch_add(1, Ordering::Relaxed);
                out.fill(0.0);
            }
            fn is_running(&self) -> bool {
                true
            }
        }
        let track: Arc<dyn Track> = Arc::new(Flagged(counter.clone()));
        let mut scratch = vec![0.0f32; 4];
        track.read_track_into(&mut scratch);
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }
}
