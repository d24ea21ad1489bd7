//! Descriptor exchange in callback mode.

use super::*;
use crate::buffer::BufferDesc;
use crate::capturer::CapturerReadCallback;
use crate::error::{ERR_INCORRECT_MODE, ERR_INVALID_PARAM, ERR_OPERATION_FAILED};
use crate::info::StreamMode;
use crate::renderer::RendererWriteCallback;
use crate::state::StreamState;
use crate::stream::BufferHandle;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fills `limit` slots with the slot's sequence number, then goes quiet.
struct Feeder {
    handle: BufferHandle,
    filled: AtomicUsize,
    limit: usize,
}

impl RendererWriteCallback for Feeder {
    fn on_write_data(&self, length: usize) {
        let seq = self.filled.load(Ordering::Acquire);
        if seq >= self.limit {
            return;
        }
        let Ok(mut desc) = self.handle.get_buffer_desc() else {
            return;
        };
        assert_eq!(desc.buf_length(), length);
        desc.fill(&vec![seq as u8 + 1; length]);
        self.handle.enqueue(desc).unwrap();
        self.filled.store(seq + 1, Ordering::Release);
    }
}

/// Copies every captured slot out and hands it straight back.
struct Collector {
    handle: BufferHandle,
    data: Mutex<Vec<u8>>,
}

impl CapturerReadCallback for Collector {
    fn on_read_data(&self, length: usize) {
        let Ok(desc) = self.handle.get_buffer_desc() else {
            return;
        };
        assert_eq!(desc.data_length(), length);
        self.data.lock().extend_from_slice(desc.data());
        self.handle.enqueue(desc).unwrap();
    }
}

fn callback_renderer() -> (AudioRenderer, MockSinkHandle) {
    let (renderer, sink) = new_renderer(MockSink::new());
    renderer.set_render_mode(StreamMode::Callback).unwrap();
    renderer.set_params(voice_params()).unwrap();
    (renderer, sink)
}

#[test]
fn test_write_rejected_in_callback_mode() {
    let (renderer, _) = callback_renderer();
    renderer.start().unwrap();
    assert_eq!(renderer.write(&[0u8; 80]).unwrap_err().code(), ERR_INCORRECT_MODE);
}

#[test]
fn test_descriptors_rejected_in_normal_mode() {
    let (renderer, _) = prepared_renderer();
    assert_eq!(renderer.get_buffer_desc().unwrap_err().code(), ERR_INCORRECT_MODE);
    assert_eq!(
        renderer.enqueue(BufferDesc::default()).unwrap_err().code(),
        ERR_INCORRECT_MODE
    );
    assert_eq!(renderer.clear().unwrap_err().code(), ERR_INCORRECT_MODE);
}

#[test]
fn test_null_descriptor_is_invalid() {
    let (renderer, _) = callback_renderer();
    assert_eq!(
        renderer.enqueue(BufferDesc::default()).unwrap_err().code(),
        ERR_INVALID_PARAM
    );
}

#[test]
fn test_write_callback_registration() {
    let (renderer, _) = prepared_renderer();
    assert_eq!(
        renderer.set_renderer_write_callback(None).unwrap_err().code(),
        ERR_INVALID_PARAM
    );

    let feeder = Arc::new(Feeder {
        handle: renderer.buffer_handle(),
        filled: AtomicUsize::new(0),
        limit: 1,
    });
    assert_eq!(
        renderer
            .set_renderer_write_callback(Some(feeder.clone()))
            .unwrap_err()
            .code(),
        ERR_INCORRECT_MODE
    );

    renderer.set_render_mode(StreamMode::Callback).unwrap();
    renderer.set_renderer_write_callback(Some(feeder)).unwrap();
}

#[test]
fn test_mode_locked_while_running() {
    let (renderer, _) = callback_renderer();
    renderer.start().unwrap();
    assert!(renderer.set_render_mode(StreamMode::Normal).is_err());
    renderer.stop().unwrap();
    renderer.set_render_mode(StreamMode::Normal).unwrap();
    assert_eq!(renderer.render_mode().unwrap(), StreamMode::Normal);
}

#[test]
fn test_manual_exchange_before_start() {
    let (renderer, _) = callback_renderer();

    let mut descs = Vec::new();
    for _ in 0..3 {
        descs.push(renderer.get_buffer_desc().unwrap());
    }
    assert_eq!(
        renderer.get_buffer_desc().unwrap_err().code(),
        ERR_OPERATION_FAILED
    );
    let accounting = renderer.slot_accounting().unwrap();
    assert_eq!(accounting.checked_out, 3);
    assert!(accounting.is_conserved());

    for (i, mut desc) in descs.into_iter().enumerate() {
        assert!(!desc.is_null());
        assert_eq!(desc.buf_length(), 80);
        if i < 2 {
            desc.fill(&[i as u8; 80]);
        }
        renderer.enqueue(desc).unwrap();
    }

    // The unfilled descriptor goes back to the free queue
    let state = renderer.buf_queue_state().unwrap();
    assert_eq!(state.current_index, 2);
    assert_eq!(renderer.frames_submitted().unwrap(), 80);

    renderer.clear().unwrap();
    assert_eq!(renderer.buf_queue_state().unwrap().current_index, 0);
    assert_eq!(renderer.slot_accounting().unwrap().free, 3);
}

#[test]
fn test_clear_reclaims_dropped_descriptor() {
    let (renderer, _) = callback_renderer();
    let desc = renderer.get_buffer_desc().unwrap();
    drop(desc);
    assert_eq!(renderer.slot_accounting().unwrap().checked_out, 1);

    renderer.clear().unwrap();
    let accounting = renderer.slot_accounting().unwrap();
    assert_eq!(accounting.free, 3);
    assert_eq!(accounting.checked_out, 0);
    assert!(accounting.is_conserved());

    // Nothing left checked out, so the pool can be resized
    renderer.set_buffer_duration(10).unwrap();
    assert_eq!(renderer.buffer_size().unwrap(), 160);
    let mut descs = Vec::new();
    for _ in 0..3 {
        descs.push(renderer.get_buffer_desc().unwrap());
    }
    assert!(descs.iter().all(|d| d.buf_length() == 160));
}

#[test]
fn test_oversized_data_length_is_rejected() {
    let (renderer, _) = callback_renderer();
    let mut desc = renderer.get_buffer_desc().unwrap();
    assert_eq!(
        desc.set_data_length(81).unwrap_err().code(),
        ERR_INVALID_PARAM
    );
    desc.set_data_length(40).unwrap();
    renderer.enqueue(desc).unwrap();
    assert_eq!(renderer.buf_queue_state().unwrap().current_index, 1);
}

#[test]
fn test_write_callback_drives_playback() {
    let (renderer, sink) = callback_renderer();
    let feeder = Arc::new(Feeder {
        handle: renderer.buffer_handle(),
        filled: AtomicUsize::new(0),
        limit: 5,
    });
    renderer
        .set_renderer_write_callback(Some(feeder.clone()))
        .unwrap();
    renderer.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || sink.written_len() == 400));
    renderer.drain().unwrap();

    let expected: Vec<u8> = (1..=5u8).flat_map(|seq| [seq; 80]).collect();
    assert_eq!(sink.written(), expected);
    assert_eq!(feeder.filled.load(Ordering::Acquire), 5);
    assert_eq!(renderer.frames_submitted().unwrap(), 200);

    renderer.stop().unwrap();
    renderer.release().unwrap();
}

#[test]
fn test_read_callback_delivers_capture() {
    let source = MockSource::new().unpaced();
    let handle = source.handle();
    let capturer = AudioCapturer::new(source, small_config()).unwrap();
    capturer.set_capture_mode(StreamMode::Callback).unwrap();
    capturer.set_params(voice_params()).unwrap();

    let collector = Arc::new(Collector {
        handle: capturer.buffer_handle(),
        data: Mutex::new(Vec::new()),
    });
    capturer
        .set_capturer_read_callback(Some(collector.clone()))
        .unwrap();
    capturer.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        collector.data.lock().len() >= 800
    }));
    capturer.stop().unwrap();

    let data = collector.data.lock().clone();
    let expected: Vec<u8> = (0..data.len()).map(|i| i as u8).collect();
    assert_eq!(data, expected);
    assert!(handle.bytes_read() >= 800);
    assert_eq!(capturer.error_metrics().overruns, 0);
    assert_eq!(capturer.status(), StreamState::Stopped);
}

#[test]
fn test_handle_outlived_stream() {
    let handle = {
        let (renderer, _) = callback_renderer();
        renderer.buffer_handle()
    };
    assert_eq!(
        handle.get_buffer_desc().unwrap_err().code(),
        ERR_OPERATION_FAILED
    );
}
