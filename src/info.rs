//! Stream parameter model: sample formats, rates, channel layouts and the
//! stream-type lookup tables shared by renderers and capturers.

use crate::error::{AudioStreamError, AudioStreamResult};
use std::fmt;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// PCM sample format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum SampleFormat {
    /// Unsigned 8-bit
    U8,
    /// Signed 16-bit little endian
    #[default]
    S16Le,
    /// Signed 24-bit little endian, packed
    S24Le,
    /// Signed 32-bit little endian
    S32Le,
}

impl SampleFormat {
    /// Get the size in bytes for this sample format
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16Le => 2,
            Self::S24Le => 3,
            Self::S32Le => 4,
        }
    }

    /// Bit width of one sample.
    pub const fn bits(self) -> u32 {
        self.bytes_per_sample() as u32 * 8
    }
}

/// Channel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum AudioChannel {
    /// One channel
    #[default]
    Mono = 1,
    /// Two interleaved channels
    Stereo = 2,
}

impl AudioChannel {
    /// Number of channels.
    pub const fn count(self) -> usize {
        self as usize
    }
}

/// Supported sampling rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum SamplingRate {
    /// 8 kHz
    Hz8000 = 8000,
    /// 11.025 kHz
    Hz11025 = 11025,
    /// 12 kHz
    Hz12000 = 12000,
    /// 16 kHz
    Hz16000 = 16000,
    /// 22.05 kHz
    Hz22050 = 22050,
    /// 24 kHz
    Hz24000 = 24000,
    /// 32 kHz
    Hz32000 = 32000,
    /// 44.1 kHz
    Hz44100 = 44100,
    /// 48 kHz
    Hz48000 = 48000,
    /// 64 kHz
    Hz64000 = 64000,
    /// 96 kHz
    Hz96000 = 96000,
}

impl SamplingRate {
    /// Rate in Hz.
    pub const fn hz(self) -> u32 {
        self as u32
    }

    /// Look up a supported rate by its value in Hz.
    pub fn from_hz(hz: u32) -> Option<Self> {
        SUPPORTED_SAMPLING_RATES.iter().copied().find(|r| r.hz() == hz)
    }
}

/// Stream encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum EncodingType {
    /// Raw PCM
    #[default]
    Pcm,
    /// AAC, declared by the platform but not supported by any backend
    Aac,
}

const SUPPORTED_FORMATS: [SampleFormat; 4] = [
    SampleFormat::U8,
    SampleFormat::S16Le,
    SampleFormat::S24Le,
    SampleFormat::S32Le,
];

const SUPPORTED_CHANNELS: [AudioChannel; 2] = [AudioChannel::Mono, AudioChannel::Stereo];

const SUPPORTED_ENCODING_TYPES: [EncodingType; 1] = [EncodingType::Pcm];

const SUPPORTED_SAMPLING_RATES: [SamplingRate; 11] = [
    SamplingRate::Hz8000,
    SamplingRate::Hz11025,
    SamplingRate::Hz12000,
    SamplingRate::Hz16000,
    SamplingRate::Hz22050,
    SamplingRate::Hz24000,
    SamplingRate::Hz32000,
    SamplingRate::Hz44100,
    SamplingRate::Hz48000,
    SamplingRate::Hz64000,
    SamplingRate::Hz96000,
];

/// Sample formats accepted by `set_params`.
pub fn supported_formats() -> &'static [SampleFormat] {
    &SUPPORTED_FORMATS
}

/// Channel layouts accepted by `set_params`.
pub fn supported_channels() -> &'static [AudioChannel] {
    &SUPPORTED_CHANNELS
}

/// Encodings accepted by `set_params`.
pub fn supported_encoding_types() -> &'static [EncodingType] {
    &SUPPORTED_ENCODING_TYPES
}

/// Sampling rates accepted by `set_params`.
pub fn supported_sampling_rates() -> &'static [SamplingRate] {
    &SUPPORTED_SAMPLING_RATES
}

/// Raw PCM layout of a stream, fixed from `set_params` until release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct AudioStreamParams {
    /// Frames per second
    pub sampling_rate: SamplingRate,
    /// Stream encoding; only PCM is accepted
    pub encoding: EncodingType,
    /// Sample layout
    pub format: SampleFormat,
    /// Interleaved channel count
    pub channels: AudioChannel,
}

impl Default for AudioStreamParams {
    fn default() -> Self {
        Self::cd_quality()
    }
}

impl AudioStreamParams {
    /// Create a new parameter set
    pub const fn new(
        sampling_rate: SamplingRate,
        encoding: EncodingType,
        format: SampleFormat,
        channels: AudioChannel,
    ) -> Self {
        Self {
            sampling_rate,
            encoding,
            format,
            channels,
        }
    }

    /// 44.1 kHz, stereo, S16LE PCM
    pub const fn cd_quality() -> Self {
        Self::new(
            SamplingRate::Hz44100,
            EncodingType::Pcm,
            SampleFormat::S16Le,
            AudioChannel::Stereo,
        )
    }

    /// 16 kHz mono S16LE PCM, the usual voice capture layout
    pub const fn voice() -> Self {
        Self::new(
            SamplingRate::Hz16000,
            EncodingType::Pcm,
            SampleFormat::S16Le,
            AudioChannel::Mono,
        )
    }

    /// Get the frame size (all channels for one sample) in bytes
    pub const fn frame_size(&self) -> usize {
        self.channels.count() * self.format.bytes_per_sample()
    }

    /// Reject parameter combinations no backend can open.
    pub fn validate(&self) -> AudioStreamResult<()> {
        if !SUPPORTED_ENCODING_TYPES.contains(&self.encoding) {
            return Err(AudioStreamError::not_supported(format!(
                "encoding {:?}",
                self.encoding
            )));
        }
        Ok(())
    }

    /// Convert a frame count to a duration at this stream's rate.
    pub fn frames_to_duration(&self, frames: u64) -> std::time::Duration {
        let rate = u64::from(self.sampling_rate.hz());
        let secs = frames / rate;
        let nanos = (frames % rate) * 1_000_000_000 / rate;
        std::time::Duration::new(secs, nanos as u32)
    }
}

/// Stream type used for volume grouping and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum AudioStreamType {
    /// No specific type
    Default,
    /// System sounds
    System,
    /// Music playback
    #[default]
    Music,
    /// Ringtones
    Ring,
    /// Generic media
    Media,
    /// Voice in calls
    VoiceCall,
    /// Voice assistant output
    VoiceAssistant,
    /// Alarms
    Alarm,
    /// Notifications
    Notification,
    /// Calls routed through a Bluetooth SCO link
    BluetoothSco,
    /// Sounds that must stay audible
    EnforcedAudible,
    /// DTMF tones
    Dtmf,
    /// Text to speech
    Tts,
    /// Accessibility prompts
    Accessibility,
}

/// Backend stream names. Types without an entry fall back to music.
const STREAM_TYPE_NAMES: [(AudioStreamType, &str); 8] = [
    (AudioStreamType::Music, "music"),
    (AudioStreamType::Ring, "ring"),
    (AudioStreamType::System, "system"),
    (AudioStreamType::Notification, "notification"),
    (AudioStreamType::Alarm, "alarm"),
    (AudioStreamType::Dtmf, "dtmf"),
    (AudioStreamType::VoiceCall, "voice_call"),
    (AudioStreamType::VoiceAssistant, "voice_assistant"),
];

/// What the stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum ContentType {
    /// Unknown content
    #[default]
    Unknown,
    /// Speech
    Speech,
    /// Music
    Music,
    /// Movie soundtrack
    Movie,
    /// UI and notification sounds
    Sonification,
    /// Ringtone
    Ringtone,
}

/// Why the stream plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum StreamUsage {
    /// Unknown usage
    #[default]
    Unknown,
    /// Media playback
    Media,
    /// Voice communication
    VoiceCommunication,
    /// Notification or ringtone
    NotificationRingtone,
    /// Voice assistant
    VoiceAssistant,
}

const CONTENT_STREAM_MAP: [((ContentType, StreamUsage), AudioStreamType); 20] = [
    ((ContentType::Unknown, StreamUsage::Unknown), AudioStreamType::Music),
    ((ContentType::Unknown, StreamUsage::Media), AudioStreamType::Music),
    ((ContentType::Unknown, StreamUsage::VoiceCommunication), AudioStreamType::VoiceCall),
    ((ContentType::Unknown, StreamUsage::VoiceAssistant), AudioStreamType::VoiceAssistant),
    ((ContentType::Unknown, StreamUsage::NotificationRingtone), AudioStreamType::Ring),
    ((ContentType::Speech, StreamUsage::Unknown), AudioStreamType::Music),
    ((ContentType::Speech, StreamUsage::Media), AudioStreamType::VoiceAssistant),
    ((ContentType::Speech, StreamUsage::VoiceCommunication), AudioStreamType::VoiceCall),
    ((ContentType::Speech, StreamUsage::VoiceAssistant), AudioStreamType::VoiceAssistant),
    ((ContentType::Speech, StreamUsage::NotificationRingtone), AudioStreamType::Music),
    ((ContentType::Music, StreamUsage::Unknown), AudioStreamType::Music),
    ((ContentType::Music, StreamUsage::Media), AudioStreamType::Music),
    ((ContentType::Music, StreamUsage::VoiceCommunication), AudioStreamType::Music),
    ((ContentType::Music, StreamUsage::VoiceAssistant), AudioStreamType::VoiceAssistant),
    ((ContentType::Music, StreamUsage::NotificationRingtone), AudioStreamType::Ring),
    ((ContentType::Movie, StreamUsage::Media), AudioStreamType::Music),
    ((ContentType::Sonification, StreamUsage::Unknown), AudioStreamType::Music),
    ((ContentType::Sonification, StreamUsage::Media), AudioStreamType::Music),
    ((ContentType::Sonification, StreamUsage::NotificationRingtone), AudioStreamType::Ring),
    ((ContentType::Ringtone, StreamUsage::NotificationRingtone), AudioStreamType::Ring),
];

impl AudioStreamType {
    /// Backend name of this stream type, if the backend defines one.
    pub fn name(self) -> Option<&'static str> {
        STREAM_TYPE_NAMES
            .iter()
            .find(|(ty, _)| *ty == self)
            .map(|(_, name)| *name)
    }

    /// Resolve a backend stream name. Unknown names map to [`AudioStreamType::Music`].
    pub fn from_name(name: &str) -> Self {
        STREAM_TYPE_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map_or(Self::Music, |(ty, _)| *ty)
    }

    /// Derive the stream type from what a renderer plays and why.
    ///
    /// Pairs without a table entry map to [`AudioStreamType::Music`].
    pub fn from_content(content: ContentType, usage: StreamUsage) -> Self {
        CONTENT_STREAM_MAP
            .iter()
            .find(|(key, _)| *key == (content, usage))
            .map_or(Self::Music, |(_, ty)| *ty)
    }
}

/// Capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum SourceType {
    /// Platform default
    Default,
    /// Microphone
    #[default]
    Mic,
    /// Uplink voice
    VoiceUplink,
    /// Downlink voice
    VoiceDownlink,
    /// Voice call
    VoiceCall,
    /// Camcorder
    Camcorder,
    /// Voice recognition
    VoiceRecognition,
    /// Voice communication
    VoiceCommunication,
}

/// Renderer metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct RendererInfo {
    /// What is being played
    pub content_type: ContentType,
    /// Why it is being played
    pub stream_usage: StreamUsage,
    /// Opaque flags passed through to the policy layer
    pub renderer_flags: i32,
}

/// Capturer metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct CapturerInfo {
    /// Input the capturer records from
    pub source_type: SourceType,
    /// Opaque flags passed through to the policy layer
    pub capturer_flags: i32,
}

/// Options for creating a renderer that is configured on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct AudioRendererOptions {
    /// Parameters applied with `set_params`
    pub stream_info: AudioStreamParams,
    /// Metadata used to pick the stream type
    pub renderer_info: RendererInfo,
}

/// Options for creating a capturer that is configured on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct AudioCapturerOptions {
    /// Parameters applied with `set_params`
    pub stream_info: AudioStreamParams,
    /// Capture metadata
    pub capturer_info: CapturerInfo,
}

/// Playback speed hint passed to the render backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum RenderRate {
    /// 1x
    #[default]
    Normal,
    /// 2x
    Double,
    /// 0.5x
    Half,
}

/// How the application exchanges data with the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum StreamMode {
    /// Blocking `write`/`read` calls
    #[default]
    Normal,
    /// Buffer descriptors exchanged from data callbacks
    Callback,
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Callback => f.write_str("callback"),
        }
    }
}

/// Direction data flows through a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Application to device
    Render,
    /// Device to application
    Capture,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Render => f.write_str("render"),
            Self::Capture => f.write_str("capture"),
        }
    }
}
