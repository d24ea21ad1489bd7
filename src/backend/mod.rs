//! Transport backends and the policy client.
//!
//! A stream never talks to hardware or a sound server directly. It is handed
//! a [`RenderSink`] or [`CaptureSource`] at construction and drives it from
//! its I/O worker; all calls are blocking and synchronous. Device routing
//! and volume policy come from a [`PolicyClient`].
//!
//! Bundled implementations:
//!
//! - [`MockSink`] / [`MockSource`]: in-memory, with failure injection
//! - [`FileSink`] / [`FileSource`]: raw PCM files

mod file;
mod mock;
mod policy;

pub use file::{FileSink, FileSource};
pub use mock::{MockSink, MockSinkHandle, MockSource, MockSourceHandle};
pub use policy::{PolicyClient, StaticPolicy};

use crate::error::AudioStreamResult;
use crate::info::{AudioStreamParams, RenderRate};
use std::time::Duration;

/// Playback transport driven by the render worker.
pub trait RenderSink: Send {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Open the device port for `params` on `device`.
    fn open_port(&mut self, params: &AudioStreamParams, device: &str) -> AudioStreamResult<()>;

    /// Begin accepting frames.
    fn start(&mut self) -> AudioStreamResult<()>;

    /// Stop the device. Frames written afterwards may be discarded.
    fn stop(&mut self) -> AudioStreamResult<()>;

    /// Suspend output, keeping device-side state.
    fn pause(&mut self) -> AudioStreamResult<()> {
        Ok(())
    }

    /// Resume after [`RenderSink::pause`].
    fn resume(&mut self) -> AudioStreamResult<()> {
        self.start()
    }

    /// Write PCM bytes, returning how many were accepted.
    fn write_frame(&mut self, data: &[u8]) -> AudioStreamResult<usize>;

    /// Device latency in microseconds.
    fn latency(&self) -> AudioStreamResult<u64>;

    /// Apply an effective volume in `0.0..=1.0`.
    fn set_volume(&mut self, volume: f32) -> AudioStreamResult<()>;

    /// Playback speed hint.
    fn set_render_rate(&mut self, _rate: RenderRate) -> AudioStreamResult<()> {
        Ok(())
    }

    /// Block until everything written has been played.
    fn drain(&mut self) -> AudioStreamResult<()> {
        Ok(())
    }

    /// Release the port.
    fn close(&mut self) {}
}

/// Recording transport driven by the capture worker.
pub trait CaptureSource: Send {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Open the device port for `params` on `device`.
    fn open_port(&mut self, params: &AudioStreamParams, device: &str) -> AudioStreamResult<()>;

    /// Begin producing frames.
    fn start(&mut self) -> AudioStreamResult<()>;

    /// Stop producing frames.
    fn stop(&mut self) -> AudioStreamResult<()>;

    /// Suspend capture.
    fn pause(&mut self) -> AudioStreamResult<()> {
        Ok(())
    }

    /// Resume after [`CaptureSource::pause`].
    fn resume(&mut self) -> AudioStreamResult<()> {
        self.start()
    }

    /// Fill `buf` with captured bytes, returning how many were written.
    fn read_frame(&mut self, buf: &mut [u8]) -> AudioStreamResult<usize>;

    /// Device latency in microseconds.
    fn latency(&self) -> AudioStreamResult<u64>;

    /// Apply an input gain in `0.0..=1.0`.
    fn set_volume(&mut self, _volume: f32) -> AudioStreamResult<()> {
        Ok(())
    }

    /// Release the port.
    fn close(&mut self) {}
}

/// Real-time duration of `bytes` of audio in `params`.
pub(crate) fn audio_duration(params: &AudioStreamParams, bytes: usize) -> Duration {
    let frames = (bytes / params.frame_size().max(1)) as u64;
    params.frames_to_duration(frames)
}
