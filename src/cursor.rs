//! Per-instance cursor and smoothed-parameter state.
//!
//! Each instance slot splits into two halves with different ownership:
//!
//! - [`InstanceShared`]: single-word fields written by the control thread and
//!   read by the audio thread (`active`, `playing`, loop count, recycle
//!   flag, and the three `new_target_*` registers). These are plain atomics
//!   with `Relaxed` ordering — the smoothing protocol detects a change via
//!   `new_target != target` inside the audio thread, so no ordering is
//!   needed between unrelated fields.
//! - [`CursorState`]: `cursor`, `current`/`target`/`increment`/
//!   `steps_remaining` for volume, pan and speed. These are touched only
//!   from inside a cue's mixing loop, one buffer at a time.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

/// Number of per-sample steps a volume ramp takes to complete.
pub const VOLUME_STEPS: u32 = 1024;
/// Number of per-sample steps a pan ramp takes to complete.
pub const PAN_STEPS: u32 = 1024;
/// Number of per-sample steps a speed ramp takes to complete.
pub const SPEED_STEPS: u32 = 4096;

pub const VOLUME_MIN: f32 = 0.0;
pub const VOLUME_MAX: f32 = 1.0;
pub const PAN_MIN: f32 = -1.0;
pub const PAN_MAX: f32 = 1.0;
pub const SPEED_MIN: f32 = 1.0 / 8.0;
pub const SPEED_MAX: f32 = 8.0;

/// The part of an instance's state that the control thread touches directly.
pub struct InstanceShared {
    active: AtomicBool,
    playing: AtomicBool,
    recycle_when_done: AtomicBool,
    /// `-1` = infinite, `0` = no more loops, `n` = n more loops.
    loop_remaining: AtomicI32,
    new_target_volume_bits: AtomicU32,
    new_target_pan_bits: AtomicU32,
    new_target_speed_bits: AtomicU32,
}

impl InstanceShared {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            recycle_when_done: AtomicBool::new(false),
            loop_remaining: AtomicI32::new(0),
            new_target_volume_bits: AtomicU32::new(0f32.to_bits()),
            new_target_pan_bits: AtomicU32::new(0f32.to_bits()),
            new_target_speed_bits: AtomicU32::new(1f32.to_bits()),
        }
    }

    #[inline]
    pub fn active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_active(&self, value: bool) {
        self.active.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_playing(&self, value: bool) {
        self.playing.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn recycle_when_done(&self) -> bool {
        self.recycle_when_done.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_recycle_when_done(&self, value: bool) {
        self.recycle_when_done.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn loop_remaining(&self) -> i32 {
        self.loop_remaining.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_loop_remaining(&self, value: i32) {
        self.loop_remaining.store(value, Ordering::Relaxed);
    }

    /// Decrement the loop counter by one. No-op if already at `0` or `-1`
    /// (infinite).
    #[inline]
    pub fn decrement_loop_remaining(&self) {
        let current = self.loop_remaining.load(Ordering::Relaxed);
        if current > 0 {
            self.loop_remaining.store(current - 1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn new_target_volume(&self) -> f32 {
        f32::from_bits(self.new_target_volume_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_new_target_volume(&self, value: f32) {
        let clamped = value.clamp(VOLUME_MIN, VOLUME_MAX);
        self.new_target_volume_bits
            .store(clamped.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn new_target_pan(&self) -> f32 {
        f32::from_bits(self.new_target_pan_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_new_target_pan(&self, value: f32) {
        let clamped = value.clamp(PAN_MIN, PAN_MAX);
        self.new_target_pan_bits
            .store(clamped.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn new_target_speed(&self) -> f32 {
        f32::from_bits(self.new_target_speed_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_new_target_speed(&self, value: f32) {
        let clamped = value.clamp(SPEED_MIN, SPEED_MAX);
        self.new_target_speed_bits
            .store(clamped.to_bits(), Ordering::Relaxed);
    }

    /// Reset every field to the defaults an instance has while sitting in
    /// the availability pool.
    pub fn reset(&self) {
        self.active.store(false, Ordering::Relaxed);
        self.playing.store(false, Ordering::Relaxed);
        self.recycle_when_done.store(false, Ordering::Relaxed);
        self.loop_remaining.store(0, Ordering::Relaxed);
        self.new_target_volume_bits
            .store(0f32.to_bits(), Ordering::Relaxed);
        self.new_target_pan_bits
            .store(0f32.to_bits(), Ordering::Relaxed);
        self.new_target_speed_bits
            .store(1f32.to_bits(), Ordering::Relaxed);
    }
}

impl Default for InstanceShared {
    fn default() -> Self {
        Self::new()
    }
}

/// One smoothed parameter register: `current` ramps toward `target` over
/// `steps_remaining` samples at `increment` per sample.
#[derive(Debug, Clone, Copy)]
pub struct Smoothed {
    pub current: f32,
    pub target: f32,
    pub increment: f32,
    pub steps_remaining: u32,
}

impl Smoothed {
    fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
            increment: 0.0,
            steps_remaining: 0,
        }
    }

    /// Snap immediately to `value` with no ramp (used at `start()`).
    fn latch(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.increment = 0.0;
        self.steps_remaining = 0;
    }

    /// Advance one sample. If `new_target` differs from the last-seen
    /// `target`, begin a fresh ramp toward it over `steps` samples.
    /// Returns `true` if `current` changed this step (so callers can skip
    /// recomputing derived factors when it didn't).
    #[inline]
    fn step(&mut self, new_target: f32, steps: u32) -> bool {
        if new_target != self.target {
            self.target = new_target;
            self.steps_remaining = steps;
            self.increment = (self.target - self.current) / steps as f32;
        }
        if self.steps_remaining > 0 {
            self.steps_remaining -= 1;
            self.current += self.increment;
            if self.steps_remaining == 0 {
                self.current = self.target;
            }
            true
        } else {
            false
        }
    }
}

/// Audio-thread-owned playback state for one instance: the fractional
/// read cursor plus the three smoothed parameters.
#[derive(Debug, Clone, Copy)]
pub struct CursorState {
    pub cursor: f64,
    pub volume: Smoothed,
    pub pan: Smoothed,
    pub speed: Smoothed,
}

impl CursorState {
    pub fn new() -> Self {
        Self {
            cursor: 0.0,
            volume: Smoothed::new(0.0),
            pan: Smoothed::new(0.0),
            speed: Smoothed::new(1.0),
        }
    }

    /// Reset to the defaults an instance has while sitting in the pool.
    pub fn reset(&mut self) {
        self.cursor = 0.0;
        self.volume = Smoothed::new(0.0);
        self.pan = Smoothed::new(0.0);
        self.speed = Smoothed::new(1.0);
    }

    /// Latch all three parameters from `shared`'s `new_target_*` registers,
    /// with zero ramp. Called at `start()`.
    pub fn latch_from_shared(&mut self, shared: &InstanceShared) {
        self.volume.latch(shared.new_target_volume());
        self.pan.latch(shared.new_target_pan());
        self.speed.latch(shared.new_target_speed());
    }

    /// Advance the smoothing protocol by one sample. Returns `(volume
    /// changed, pan changed, speed changed)` so the mixing loop can skip
    /// recomputing derived gain factors when nothing moved.
    #[inline]
    pub fn advance_one_sample(&mut self, shared: &InstanceShared) -> (bool, bool, bool) {
        let v = self.volume.step(shared.new_target_volume(), VOLUME_STEPS);
        let p = self.pan.step(shared.new_target_pan(), PAN_STEPS);
        let s = self.speed.step(shared.new_target_speed(), SPEED_STEPS);
        (v, p, s)
    }
}

impl Default for CursorState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latch_has_no_ramp() {
        let shared = InstanceShared::new();
        shared.set_new_target_volume(0.75);
        let mut state = CursorState::new();
        state.latch_from_shared(&shared);
        assert!((state.volume.current - 0.75).abs() < 1e-6);
        assert_eq!(state.volume.steps_remaining, 0);
    }

    #[test]
    fn test_smoothing_reaches_target_after_steps() {
        let shared = InstanceShared::new();
        shared.set_new_target_volume(1.0);
        let mut state = CursorState::new();
        // volume starts at 0.0, target set to 1.0: ramps over VOLUME_STEPS.
        for _ in 0..VOLUME_STEPS {
            state.advance_one_sample(&shared);
        }
        assert!((state.volume.current - 1.0).abs() < 1e-5);
        assert_eq!(state.volume.steps_remaining, 0);
    }

    #[test]
    fn test_smoothing_monotonic_decrease_in_delta() {
        let shared = InstanceShared::new();
        shared.set_new_target_volume(1.0);
        let mut state = CursorState::new();
        let mut prev_delta = (1.0f32 - state.volume.current).abs();
        for _ in 0..VOLUME_STEPS {
            state.advance_one_sample(&shared);
            let delta = (1.0f32 - state.volume.current).abs();
            assert!(delta <= prev_delta + 1e-6);
            prev_delta = delta;
        }
    }

    #[test]
    fn test_new_target_write_during_ramp_restarts_ramp() {
        let shared = InstanceShared::new();
        shared.set_new_target_volume(1.0);
        let mut state = CursorState::new();
        for _ in 0..100 {
            state.advance_one_sample(&shared);
        }
        // a fresh write mid-ramp should be picked up on the next step.
        shared.set_new_target_volume(0.5);
        state.advance_one_sample(&shared);
        assert_eq!(state.volume.target, 0.5);
    }

    #[test]
    fn test_shared_reset_restores_pool_defaults() {
        let shared = InstanceShared::new();
        shared.set_active(true);
        shared.set_playing(true);
        shared.set_new_target_volume(0.9);
        shared.reset();
        assert!(!shared.active());
        assert!(!shared.playing());
        assert_eq!(shared.new_target_volume(), 0.0);
        assert_eq!(shared.new_target_speed(), 1.0);
    }

    #[test]
    fn test_loop_remaining_decrement_saturates_at_zero() {
        let shared = InstanceShared::new();
        shared.set_loop_remaining(1);
        shared.decrement_loop_remaining();
        assert_eq!(shared.loop_remaining(), 0);
        shared.decrement_loop_remaining();
        assert_eq!(shared.loop_remaining(), 0);
    }

    #[test]
    fn test_loop_remaining_infinite_not_decremented() {
        let shared = InstanceShared::new();
        shared.set_loop_remaining(-1);
        shared.decrement_loop_remaining();
        assert_eq!(shared.loop_remaining(), -1);
    }
}
