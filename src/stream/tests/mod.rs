//! Scenario tests for renderer and capturer streams.

use crate::backend::{MockSink, MockSinkHandle, MockSource, MockSourceHandle};
use crate::capturer::AudioCapturer;
use crate::config::StreamConfig;
use crate::info::{AudioChannel, AudioStreamParams, EncodingType, SampleFormat, SamplingRate};
use crate::renderer::AudioRenderer;
use std::time::{Duration, Instant};

mod callback_mode_tests;
mod position_tests;

/// 8 kHz mono S16LE: 5 ms slots are 40 frames, 80 bytes.
pub(crate) fn voice_params() -> AudioStreamParams {
    AudioStreamParams::new(
        SamplingRate::Hz8000,
        EncodingType::Pcm,
        SampleFormat::S16Le,
        AudioChannel::Mono,
    )
}

pub(crate) fn small_config() -> StreamConfig {
    StreamConfig::default()
        .with_buffer_duration(Duration::from_millis(5))
        .with_worker_poll_interval(Duration::from_millis(2))
}

/// Unconfigured renderer over a fresh mock sink
pub(crate) fn new_renderer(sink: MockSink) -> (AudioRenderer, MockSinkHandle) {
    let handle = sink.handle();
    let renderer = AudioRenderer::new(sink, small_config()).unwrap();
    (renderer, handle)
}

/// Prepared renderer with voice params
pub(crate) fn prepared_renderer() -> (AudioRenderer, MockSinkHandle) {
    let (renderer, handle) = new_renderer(MockSink::new());
    renderer.set_params(voice_params()).unwrap();
    (renderer, handle)
}

/// Prepared capturer with voice params over a paced ramp source
pub(crate) fn prepared_capturer(source: MockSource) -> (AudioCapturer, MockSourceHandle) {
    let handle = source.handle();
    let capturer = AudioCapturer::new(source, small_config()).unwrap();
    capturer.set_params(voice_params()).unwrap();
    (capturer, handle)
}

/// Poll `cond` until it holds or `timeout` elapses.
pub(crate) fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}
