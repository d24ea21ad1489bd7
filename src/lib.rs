// Correctness and logic
#![warn(clippy::unit_cmp)] // Detects comparing unit types
#![warn(clippy::match_same_arms)] // Duplicate match arms
// Performance-focused
#![warn(clippy::inefficient_to_string)] // `format!("{}", x)` vs `x.to_string()`
#![warn(clippy::map_clone)] // Cloning inside `map()` unnecessarily
#![warn(clippy::unnecessary_to_owned)] // Detects redundant `.to_owned()` or `.clone()`
#![warn(clippy::large_stack_arrays)] // Helps avoid stack overflows
#![warn(clippy::needless_collect)] // Avoids `.collect().iter()` chains
// Style and idiomatic Rust
#![warn(clippy::redundant_clone)] // Detects unnecessary `.clone()`
#![warn(clippy::needless_return)] // Avoids `return` at the end of functions
#![warn(clippy::let_unit_value)] // Avoids binding `()` to variables
#![warn(clippy::manual_map)] // Use `.map()` instead of manual `match`
#![warn(clippy::unwrap_used)] // Avoids using `unwrap()`
// Maintainability
#![warn(clippy::missing_panics_doc)] // Docs for functions that might panic
#![warn(clippy::missing_safety_doc)] // Docs for `unsafe` functions
#![warn(missing_docs)]
//! # audio_stream
//!
//! The stream core of a device-side audio framework: a fixed ring of PCM
//! buffers shared between an application thread and a dedicated I/O thread,
//! a lifecycle state machine gating every operation, and frame-accurate
//! position, timestamp and mark/period notifications.
//!
//! ## Overview
//!
//! - [`AudioRenderer`] plays audio through a [`RenderSink`].
//! - [`AudioCapturer`] records audio from a [`CaptureSource`].
//!
//! Both go through the same states:
//!
//! ```text
//! NEW -> PREPARED -> RUNNING <-> PAUSED
//!                    RUNNING/PAUSED -> STOPPED -> RUNNING
//!        any non-terminal state -> RELEASED
//! ```
//!
//! Data moves in one of two modes:
//!
//! - **Normal**: the application calls blocking [`AudioRenderer::write`] or
//!   [`AudioCapturer::read`].
//! - **Callback**: the I/O worker asks for data through
//!   [`RendererWriteCallback`] / [`CapturerReadCallback`], and the
//!   application exchanges [`BufferDesc`] tokens with `get_buffer_desc` and
//!   `enqueue`.
//!
//! ## Example
//!
//! ```
//! use audio_stream::{AudioRenderer, AudioStreamParams, MockSink, StreamConfig};
//!
//! # fn main() -> audio_stream::AudioStreamResult<()> {
//! let sink = MockSink::new();
//! let played = sink.handle();
//!
//! let renderer = AudioRenderer::new(sink, StreamConfig::default())?;
//! renderer.set_params(AudioStreamParams::cd_quality())?;
//! renderer.start()?;
//!
//! let pcm = vec![0u8; renderer.buffer_size()? * 2];
//! renderer.write_all(&pcm)?;
//! renderer.drain()?;
//! renderer.release()?;
//!
//! assert_eq!(played.written_len(), pcm.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `serialization`: `serde` support for configuration and parameter types

pub mod backend;
pub mod buffer;
pub mod capturer;
pub mod config;
pub mod error;
pub mod event;
pub mod info;
pub mod position;
pub mod renderer;
pub mod state;
pub mod stream;
pub mod timestamp;
mod worker;

pub use backend::{
    CaptureSource, FileSink, FileSource, MockSink, MockSinkHandle, MockSource, MockSourceHandle,
    PolicyClient, RenderSink, StaticPolicy,
};
pub use buffer::{BufQueueState, BufferDesc, SlotAccounting};
pub use capturer::{AudioCapturer, CapturerReadCallback};
pub use config::StreamConfig;
pub use error::{AudioStreamError, AudioStreamResult, ErrorMetrics};
pub use event::StreamEvent;
pub use info::{
    AudioCapturerOptions, AudioChannel, AudioRendererOptions, AudioStreamParams, AudioStreamType,
    CapturerInfo, ContentType, EncodingType, RenderRate, RendererInfo, SampleFormat, SamplingRate,
    SourceType, StreamMode, StreamUsage,
};
pub use position::{PeriodPositionCallback, PositionCallback};
pub use renderer::{AudioRenderer, RendererWriteCallback};
pub use state::{StreamState, StreamStateCallback};
pub use stream::{AudioStream, BufferHandle};
pub use timestamp::{Clock, ManualClock, SystemClock, Timestamp, TimestampBase};
