//! Routing and volume policy.

use crate::error::{AudioStreamError, AudioStreamResult};
use crate::info::{AudioStreamType, Direction};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Synchronous view of the platform's audio policy service.
///
/// Failures surface to stream callers as `OperationFailed`.
pub trait PolicyClient: Send + Sync {
    /// Device a stream of `stream_type` should open.
    fn resolve_device(
        &self,
        direction: Direction,
        stream_type: AudioStreamType,
    ) -> AudioStreamResult<String>;

    /// Map an application volume to the backend gain.
    fn volume_curve(&self, stream_type: AudioStreamType, volume: f32) -> AudioStreamResult<f32>;

    /// Check if `stream_type` is muted.
    fn is_muted(&self, stream_type: AudioStreamType) -> AudioStreamResult<bool>;
}

/// In-process policy: fixed devices, linear volume, per-type mute.
#[derive(Debug, Default)]
pub struct StaticPolicy {
    muted: RwLock<HashSet<AudioStreamType>>,
    unavailable: AtomicBool,
}

impl StaticPolicy {
    /// Create a policy with nothing muted
    pub fn new() -> Self {
        Self::default()
    }

    /// Mute or unmute a stream type
    pub fn set_muted(&self, stream_type: AudioStreamType, muted: bool) {
        let mut set = self.muted.write();
        if muted {
            set.insert(stream_type);
        } else {
            set.remove(&stream_type);
        }
    }

    /// Make every call fail, as if the policy service were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn check(&self) -> AudioStreamResult<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(AudioStreamError::operation_failed(
                "policy service unavailable",
            ));
        }
        Ok(())
    }
}

impl PolicyClient for StaticPolicy {
    fn resolve_device(
        &self,
        direction: Direction,
        _stream_type: AudioStreamType,
    ) -> AudioStreamResult<String> {
        self.check()?;
        Ok(match direction {
            Direction::Render => "speaker".to_string(),
            Direction::Capture => "mic".to_string(),
        })
    }

    fn volume_curve(&self, _stream_type: AudioStreamType, volume: f32) -> AudioStreamResult<f32> {
        self.check()?;
        Ok(volume.clamp(0.0, 1.0))
    }

    fn is_muted(&self, stream_type: AudioStreamType) -> AudioStreamResult<bool> {
        self.check()?;
        Ok(self.muted.read().contains(&stream_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_policy() {
        let policy = StaticPolicy::new();
        assert_eq!(
            policy
                .resolve_device(Direction::Capture, AudioStreamType::Music)
                .unwrap(),
            "mic"
        );
        assert!(!policy.is_muted(AudioStreamType::Ring).unwrap());

        policy.set_muted(AudioStreamType::Ring, true);
        assert!(policy.is_muted(AudioStreamType::Ring).unwrap());
        assert!(!policy.is_muted(AudioStreamType::Music).unwrap());
    }

    #[test]
    fn test_unavailable_policy_fails() {
        let policy = StaticPolicy::new();
        policy.set_unavailable(true);
        let err = policy
            .volume_curve(AudioStreamType::Music, 0.5)
            .unwrap_err();
        assert!(err.is_operation_failure());
    }
}
