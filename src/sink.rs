//! Output sink adapter (§6 collaborator, concretely implemented per C6):
//! a thin wrapper over a blocking byte-write audio line. [`NullSink`]
//! accepts writes and returns immediately, for offline/headless use;
//! [`CpalDeviceSink`] (feature `cpal-backend`, on by default) drives a real
//! cross-platform output device.

use crate::error::{AudioSinkError, AudioSinkResult, EngineError, EngineResult};

/// A blocking byte-write audio line. `write` is bounded by the hardware
/// buffer (or returns immediately for [`NullSink`]); the mixing loop's
/// cadence is set entirely by how fast the sink drains.
pub trait AudioSink: Send {
    /// Begin accepting writes. Idempotent sinks may treat a second call as
    /// a no-op; [`NullSink`] and [`CpalDeviceSink`] both do.
    fn start(&mut self) -> EngineResult<()>;

    /// Write packed PCM bytes, blocking until accepted. Returns the number
    /// of bytes written (always `bytes.len()` for the sinks in this
    /// crate — partial writes aren't modeled since neither backend can
    /// produce one).
    fn write(&mut self, bytes: &[u8]) -> EngineResult<usize>;

    /// Block until any buffered audio has been played out.
    fn drain(&mut self);

    /// Release the underlying device or resource. Called on every exit
    /// path of the thread that owns the sink (normal termination, a
    /// propagating write error, or an explicit `close()`/`stop()` signal).
    fn close(&mut self);
}

/// A sink that discards everything. Used for offline testing and as the
/// fallback when no real output device can be acquired.
pub struct NullSink {
    started: bool,
}

impl NullSink {
    pub fn new() -> Self {
        Self { started: false }
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for NullSink {
    fn start(&mut self) -> EngineResult<()> {
        self.started = true;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> EngineResult<usize> {
        Ok(bytes.len())
    }

    fn drain(&mut self) {}

    fn close(&mut self) {
        self.started = false;
    }
}

/// Open the platform's default output device, sized to hold at least
/// `byte_buffer_size` bytes of headroom. Falls back to the caller logging
/// and substituting [`NullSink`] is left to the caller — this function
/// reports `SinkUnavailable` rather than silently degrading, since whether
/// a missing device should be fatal is a policy decision for the cue/mixer
/// that's opening it.
pub fn open_default_sink(byte_buffer_size: usize) -> EngineResult<Box<dyn AudioSink>> {
    #[cfg(feature = "cpal-backend")]
    {
        match cpal_backend::CpalDeviceSink::open(byte_buffer_size) {
            Ok(sink) => Ok(Box::new(sink)),
            Err(e) => Err(EngineError::SinkUnavailable(e.to_string())),
        }
    }
    #[cfg(not(feature = "cpal-backend"))]
    {
        let _ = byte_buffer_size;
        Err(EngineError::SinkUnavailable(
            "built without the cpal-backend feature".to_string(),
        ))
    }
}

#[cfg(feature = "cpal-backend")]
mod cpal_backend {
    use super::*;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, Stream, StreamConfig};
    use rtrb::{Consumer, Producer, RingBuffer};
    use std::time::Duration;

    use crate::types::SAMPLE_RATE;

    /// Byte-queue-backed CPAL output sink. `write()` pushes packed 16-bit
    /// LE PCM bytes into an `rtrb` SPSC ring buffer; the CPAL callback
    /// (running on its own realtime thread) drains the ring buffer and
    /// converts to whatever sample format the device actually wants.
    /// Mirrors the lock-free producer/consumer split used elsewhere in
    /// this codebase's audio backends, just with one shared ring instead
    /// of a command queue.
    pub struct CpalDeviceSink {
        stream: Option<Stream>,
        producer: Producer<u8>,
    }

    impl CpalDeviceSink {
        pub fn open(byte_buffer_size: usize) -> AudioSinkResult<Self> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or(AudioSinkError::NoDevices)?;
            let supported = device
                .default_output_config()
                .map_err(|e| AudioSinkError::NoDefaultDevice(e.to_string()))?;
            let sample_format = supported.sample_format();

            let config = StreamConfig {
                channels: 2,
                sample_rate: cpal::SampleRate(SAMPLE_RATE),
                buffer_size: cpal::BufferSize::Default,
            };

            // Headroom so producer writes don't spin excessively against a
            // callback draining in lockstep.
            let ring_capacity = byte_buffer_size.max(4096) * 4;
            let (producer, consumer) = RingBuffer::<u8>::new(ring_capacity);

            let stream = build_stream(&device, &config, sample_format, consumer)?;

            Ok(Self {
                stream: Some(stream),
                producer,
            })
        }
    }

    fn build_stream(
        device: &cpal::Device,
        config: &StreamConfig,
        sample_format: SampleFormat,
        mut consumer: Consumer<u8>,
    ) -> AudioSinkResult<Stream> {
        let err_fn = |err: cpal::StreamError| log::error!("cpal stream error: {}", err);

        let stream = match sample_format {
            SampleFormat::F32 => device.build_output_stream(
                config,
                move |data: &mut [f32], _| fill_f32(data, &mut consumer),
                err_fn,
                None,
            ),
            SampleFormat::I16 => device.build_output_stream(
                config,
                move |data: &mut [i16], _| fill_i16(data, &mut consumer),
                err_fn,
                None,
            ),
            other => {
                return Err(AudioSinkError::ConfigError(format!(
                    "unsupported device sample format: {:?}",
                    other
                )))
            }
        }
        .map_err(|e| AudioSinkError::StreamBuildError(e.to_string()))?;

        Ok(stream)
    }

    /// Pop one little-endian i16 sample's worth of bytes (zero-filled on
    /// underrun, which is logged upstream by the mixer/cue's own warn-level
    /// xrun handling rather than here on every callback).
    #[inline]
    fn pop_i16(consumer: &mut Consumer<u8>) -> i16 {
        let lo = consumer.pop().unwrap_or(0);
        let hi = consumer.pop().unwrap_or(0);
        i16::from_le_bytes([lo, hi])
    }

    fn fill_f32(data: &mut [f32], consumer: &mut Consumer<u8>) {
        for sample in data.iter_mut() {
            *sample = pop_i16(consumer) as f32 / 32768.0;
        }
    }

    fn fill_i16(data: &mut [i16], consumer: &mut Consumer<u8>) {
        for sample in data.iter_mut() {
            *sample = pop_i16(consumer);
        }
    }

    impl AudioSink for CpalDeviceSink {
        fn start(&mut self) -> EngineResult<()> {
            if let Some(stream) = &self.stream {
                stream
                    .play()
                    .map_err(|e| EngineError::SinkUnavailable(e.to_string()))?;
            }
            Ok(())
        }

        fn write(&mut self, bytes: &[u8]) -> EngineResult<usize> {
            let mut written = 0;
            while written < bytes.len() {
                match self.producer.push(bytes[written]) {
                    Ok(()) => written += 1,
                    Err(_) => std::thread::sleep(Duration::from_micros(200)),
                }
            }
            Ok(written)
        }

        fn drain(&mut self) {
            while !self.producer.is_empty() {
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        fn close(&mut self) {
            self.stream.take();
        }
    }
}

/// RAII wrapper guaranteeing [`AudioSink::close`] runs on every exit path of
/// the thread that owns a sink — normal loop exit, an early `return` on a
/// write/pack error, or (in test code) an early panic — without requiring
/// every call site to remember to call it explicitly.
pub struct SinkGuard {
    sink: Box<dyn AudioSink>,
}

impl SinkGuard {
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        Self { sink }
    }
}

impl std::ops::Deref for SinkGuard {
    type Target = dyn AudioSink;

    fn deref(&self) -> &Self::Target {
        self.sink.as_ref()
    }
}

impl std::ops::DerefMut for SinkGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.sink.as_mut()
    }
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        self.sink.drain();
        self.sink.close();
    }
}
