//! In-memory backends for tests and simulations.

use super::{CaptureSource, RenderSink, audio_duration};
use crate::error::{AudioStreamError, AudioStreamResult};
use crate::info::{AudioStreamParams, RenderRate};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

#[derive(Debug, Default)]
struct MockSinkState {
    written: Mutex<Vec<u8>>,
    calls: Mutex<Vec<&'static str>>,
    volume: Mutex<Option<f32>>,
    render_rate: Mutex<RenderRate>,
    device: Mutex<Option<String>>,
    fail_writes: AtomicBool,
    fail_controls: AtomicBool,
}

/// Render sink that records every byte written to it.
#[derive(Debug)]
pub struct MockSink {
    state: Arc<MockSinkState>,
    params: Option<AudioStreamParams>,
    realtime: bool,
    max_chunk: Option<usize>,
    latency_us: u64,
    started: bool,
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSink {
    /// Create a sink that accepts writes instantly
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockSinkState::default()),
            params: None,
            realtime: false,
            max_chunk: None,
            latency_us: 0,
            started: false,
        }
    }

    /// Sleep for the real-time duration of each write
    pub fn with_realtime(mut self) -> Self {
        self.realtime = true;
        self
    }

    /// Accept at most `bytes` per `write_frame` call
    pub fn with_max_chunk(mut self, bytes: usize) -> Self {
        self.max_chunk = Some(bytes.max(1));
        self
    }

    /// Report a fixed device latency
    pub fn with_latency(mut self, micros: u64) -> Self {
        self.latency_us = micros;
        self
    }

    /// Inspection handle that outlives moving the sink into a stream
    pub fn handle(&self) -> MockSinkHandle {
        MockSinkHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn record(&self, call: &'static str) {
        self.state.calls.lock().push(call);
    }

    fn control(&self, call: &'static str) -> AudioStreamResult<()> {
        self.record(call);
        if self.state.fail_controls.load(Ordering::Acquire) {
            return Err(AudioStreamError::backend("mock-sink", format!("{call} refused")));
        }
        Ok(())
    }
}

impl RenderSink for MockSink {
    fn name(&self) -> &str {
        "mock-sink"
    }

    fn open_port(&mut self, params: &AudioStreamParams, device: &str) -> AudioStreamResult<()> {
        self.record("open_port");
        self.params = Some(*params);
        *self.state.device.lock() = Some(device.to_string());
        Ok(())
    }

    fn start(&mut self) -> AudioStreamResult<()> {
        self.control("start")?;
        if self.params.is_none() {
            return Err(AudioStreamError::backend("mock-sink", "port not open"));
        }
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> AudioStreamResult<()> {
        self.control("stop")?;
        self.started = false;
        Ok(())
    }

    fn pause(&mut self) -> AudioStreamResult<()> {
        self.control("pause")?;
        self.started = false;
        Ok(())
    }

    fn resume(&mut self) -> AudioStreamResult<()> {
        self.control("resume")?;
        self.started = true;
        Ok(())
    }

    fn write_frame(&mut self, data: &[u8]) -> AudioStreamResult<usize> {
        if self.state.fail_writes.load(Ordering::Acquire) {
            return Err(AudioStreamError::backend("mock-sink", "device disconnected"));
        }
        if !self.started {
            return Err(AudioStreamError::backend("mock-sink", "write while stopped"));
        }
        let n = self.max_chunk.map_or(data.len(), |max| data.len().min(max));
        self.state.written.lock().extend_from_slice(&data[..n]);
        if self.realtime {
            if let Some(params) = &self.params {
                thread::sleep(audio_duration(params, n));
            }
        }
        Ok(n)
    }

    fn latency(&self) -> AudioStreamResult<u64> {
        Ok(self.latency_us)
    }

    fn set_volume(&mut self, volume: f32) -> AudioStreamResult<()> {
        *self.state.volume.lock() = Some(volume);
        Ok(())
    }

    fn set_render_rate(&mut self, rate: RenderRate) -> AudioStreamResult<()> {
        *self.state.render_rate.lock() = rate;
        Ok(())
    }

    fn drain(&mut self) -> AudioStreamResult<()> {
        self.record("drain");
        Ok(())
    }

    fn close(&mut self) {
        self.record("close");
        self.started = false;
    }
}

/// Shared view of a [`MockSink`].
#[derive(Debug, Clone)]
pub struct MockSinkHandle {
    state: Arc<MockSinkState>,
}

impl MockSinkHandle {
    /// Copy of every byte written so far
    pub fn written(&self) -> Vec<u8> {
        self.state.written.lock().clone()
    }

    /// Number of bytes written so far
    pub fn written_len(&self) -> usize {
        self.state.written.lock().len()
    }

    /// Backend calls in order, excluding writes
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.calls.lock().clone()
    }

    /// Last volume applied by the stream
    pub fn volume(&self) -> Option<f32> {
        *self.state.volume.lock()
    }

    /// Last render rate applied by the stream
    pub fn render_rate(&self) -> RenderRate {
        *self.state.render_rate.lock()
    }

    /// Device the port was opened on
    pub fn device(&self) -> Option<String> {
        self.state.device.lock().clone()
    }

    /// Make subsequent writes fail
    pub fn fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::Release);
    }

    /// Make subsequent start, stop, pause and resume calls fail
    pub fn fail_controls(&self, fail: bool) {
        self.state.fail_controls.store(fail, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct MockSourceState {
    bytes_read: AtomicU64,
    fail_reads: AtomicBool,
    calls: Mutex<Vec<&'static str>>,
}

/// Capture source producing a repeating `0, 1, .. 255` byte ramp.
#[derive(Debug)]
pub struct MockSource {
    state: Arc<MockSourceState>,
    params: Option<AudioStreamParams>,
    realtime: bool,
    next: u8,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSource {
    /// Create a source paced at the stream's real-time rate
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockSourceState::default()),
            params: None,
            realtime: true,
            next: 0,
        }
    }

    /// Produce data as fast as the worker asks for it
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self
    }

    /// Inspection handle that outlives moving the source into a stream
    pub fn handle(&self) -> MockSourceHandle {
        MockSourceHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl CaptureSource for MockSource {
    fn name(&self) -> &str {
        "mock-source"
    }

    fn open_port(&mut self, params: &AudioStreamParams, _device: &str) -> AudioStreamResult<()> {
        self.state.calls.lock().push("open_port");
        self.params = Some(*params);
        Ok(())
    }

    fn start(&mut self) -> AudioStreamResult<()> {
        self.state.calls.lock().push("start");
        Ok(())
    }

    fn stop(&mut self) -> AudioStreamResult<()> {
        self.state.calls.lock().push("stop");
        Ok(())
    }

    fn read_frame(&mut self, buf: &mut [u8]) -> AudioStreamResult<usize> {
        if self.state.fail_reads.load(Ordering::Acquire) {
            return Err(AudioStreamError::backend("mock-source", "device disconnected"));
        }
        for byte in buf.iter_mut() {
            *byte = self.next;
            self.next = self.next.wrapping_add(1);
        }
        self.state
            .bytes_read
            .fetch_add(buf.len() as u64, Ordering::AcqRel);
        if self.realtime {
            if let Some(params) = &self.params {
                thread::sleep(audio_duration(params, buf.len()));
            }
        }
        Ok(buf.len())
    }

    fn latency(&self) -> AudioStreamResult<u64> {
        Ok(0)
    }

    fn close(&mut self) {
        self.state.calls.lock().push("close");
    }
}

/// Shared view of a [`MockSource`].
#[derive(Debug, Clone)]
pub struct MockSourceHandle {
    state: Arc<MockSourceState>,
}

impl MockSourceHandle {
    /// Bytes produced so far
    pub fn bytes_read(&self) -> u64 {
        self.state.bytes_read.load(Ordering::Acquire)
    }

    /// Backend calls in order, excluding reads
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.calls.lock().clone()
    }

    /// Make subsequent reads fail
    pub fn fail_reads(&self, fail: bool) {
        self.state.fail_reads.store(fail, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_records_writes() {
        let mut sink = MockSink::new().with_max_chunk(3);
        let handle = sink.handle();
        sink.open_port(&AudioStreamParams::cd_quality(), "speaker")
            .unwrap();
        sink.start().unwrap();

        assert_eq!(sink.write_frame(&[1, 2, 3, 4]).unwrap(), 3);
        assert_eq!(handle.written(), vec![1, 2, 3]);
        assert_eq!(handle.device().as_deref(), Some("speaker"));

        handle.fail_writes(true);
        assert!(sink.write_frame(&[5]).is_err());
    }

    #[test]
    fn test_sink_rejects_start_before_open() {
        let mut sink = MockSink::new();
        assert!(sink.start().is_err());
    }

    #[test]
    fn test_source_ramp() {
        let mut source = MockSource::new().unpaced();
        source
            .open_port(&AudioStreamParams::voice(), "mic")
            .unwrap();
        let mut buf = [0u8; 4];
        source.read_frame(&mut buf).unwrap();
        source.read_frame(&mut buf).unwrap();
        assert_eq!(buf, [4, 5, 6, 7]);
        assert_eq!(source.handle().bytes_read(), 8);
    }
}
