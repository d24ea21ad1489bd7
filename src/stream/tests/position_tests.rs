//! Mark and period notifications driven by the I/O worker.

use super::*;
use crate::error::{ERR_ILLEGAL_STATE, ERR_INVALID_PARAM};
use crate::event::StreamEvent;
use crate::position::{PeriodPositionCallback, PositionCallback};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct Recorder {
    marks: Mutex<Vec<u64>>,
    periods: Mutex<Vec<u64>>,
}

impl PositionCallback for Recorder {
    fn on_mark_reached(&self, frame: u64) {
        self.marks.lock().push(frame);
    }
}

impl PeriodPositionCallback for Recorder {
    fn on_period_reached(&self, frame: u64) {
        self.periods.lock().push(frame);
    }
}

/// Play `frames` of silence through a running renderer and wait for them.
fn play_frames(renderer: &AudioRenderer, frames: usize) {
    renderer.write_all(&vec![0u8; frames * 2]).unwrap();
    renderer.drain().unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        renderer.frames_written().unwrap() >= frames as u64
    }));
}

#[test]
fn test_invalid_registration() {
    let (renderer, _) = prepared_renderer();
    let recorder = Arc::new(Recorder::default());

    for mark in [0, -5] {
        let err = renderer
            .set_renderer_position_callback(mark, Some(recorder.clone()))
            .unwrap_err();
        assert_eq!(err.code(), ERR_INVALID_PARAM);
    }
    assert_eq!(
        renderer
            .set_renderer_position_callback(100, None)
            .unwrap_err()
            .code(),
        ERR_INVALID_PARAM
    );
    assert_eq!(
        renderer
            .set_renderer_period_position_callback(0, Some(recorder.clone()))
            .unwrap_err()
            .code(),
        ERR_INVALID_PARAM
    );
    assert_eq!(
        renderer
            .set_renderer_period_position_callback(100, None)
            .unwrap_err()
            .code(),
        ERR_INVALID_PARAM
    );
}

#[test]
fn test_mark_fires_exactly_once() {
    let (renderer, _) = prepared_renderer();
    let recorder = Arc::new(Recorder::default());
    renderer
        .set_renderer_position_callback(1000, Some(recorder.clone()))
        .unwrap();
    let events = renderer.subscribe_events();
    renderer.start().unwrap();

    play_frames(&renderer, 1200);
    assert!(wait_until(Duration::from_secs(2), || {
        !recorder.marks.lock().is_empty()
    }));
    play_frames(&renderer, 2400);

    assert_eq!(*recorder.marks.lock(), vec![1000]);
    let marks: Vec<_> = events
        .try_iter()
        .filter_map(|e| match e {
            StreamEvent::MarkReached { frame } => Some(frame),
            _ => None,
        })
        .collect();
    assert_eq!(marks, vec![1000]);
}

#[test]
fn test_period_fires_at_every_multiple() {
    let (renderer, _) = prepared_renderer();
    let recorder = Arc::new(Recorder::default());
    renderer
        .set_renderer_period_position_callback(100, Some(recorder.clone()))
        .unwrap();
    renderer.start().unwrap();

    play_frames(&renderer, 1200);
    assert!(wait_until(Duration::from_secs(2), || {
        recorder.periods.lock().len() == 12
    }));
    let expected: Vec<u64> = (1..=12).map(|n| n * 100).collect();
    assert_eq!(*recorder.periods.lock(), expected);
}

#[test]
fn test_unset_mark_suppresses_delivery() {
    let (renderer, _) = prepared_renderer();
    let recorder = Arc::new(Recorder::default());
    renderer
        .set_renderer_position_callback(40, Some(recorder.clone()))
        .unwrap();
    renderer.unset_renderer_position_callback();
    renderer
        .set_renderer_period_position_callback(40, Some(recorder.clone()))
        .unwrap();
    renderer.unset_renderer_period_position_callback();
    renderer.start().unwrap();

    play_frames(&renderer, 400);
    assert!(recorder.marks.lock().is_empty());
    assert!(recorder.periods.lock().is_empty());
}

#[test]
fn test_capture_mark() {
    let (capturer, _) = prepared_capturer(MockSource::new().unpaced());
    let recorder = Arc::new(Recorder::default());
    capturer
        .set_capturer_position_callback(200, Some(recorder.clone()))
        .unwrap();
    capturer
        .set_capturer_period_position_callback(80, Some(recorder.clone()))
        .unwrap();
    capturer.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        recorder.periods.lock().len() >= 3
    }));
    capturer.stop().unwrap();

    assert_eq!(*recorder.marks.lock(), vec![200]);
    assert_eq!(recorder.periods.lock()[..3], [80, 160, 240]);
}

#[test]
fn test_registration_rejected_after_release() {
    let (renderer, _) = prepared_renderer();
    renderer.release().unwrap();
    let recorder = Arc::new(Recorder::default());
    assert_eq!(
        renderer
            .set_renderer_position_callback(10, Some(recorder))
            .unwrap_err()
            .code(),
        ERR_ILLEGAL_STATE
    );
}
