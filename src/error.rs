//! Error types for the capture/playback pipeline.
//!
//! All errors implement `std::error::Error` and carry structured context.
//!
//! ## Error Categories
//!
//! - **Setup failures**: permission denied, device unavailable, codec session creation.
//!   These are fatal to starting a session and are reported synchronously to the caller.
//! - **Transient codec failures**: a single unit failed to decode or encode. The unit is
//!   dropped and the session continues.
//! - **Parse anomalies**: missing start codes, truncated NAL lengths, invalid Opus TOC
//!   bytes. Inside the pipeline these are skipped silently; the variant exists for callers
//!   that parse explicitly.
//! - **Control-plane misuse**: calling into a component before it was initialized, or
//!   stopping something that is not running.
//!
//! Timing anomalies (stale data, span overflow, gate stalls) are not errors. They are
//! handled by the playout queue policies and only logged.
//!
//! ```rust
//! use avsync::{Codec, MediaError};
//!
//! let error = MediaError::session_create(Codec::Hevc, -12903);
//! assert!(error.is_setup_failure());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use crate::types::Codec;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T, E = MediaError> = std::result::Result<T, E>;

/// Main error type for the pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MediaError {
    #[error("Permission denied for {device}")]
    PermissionDenied { device: String },

    #[error("No usable {device} was found")]
    DeviceUnavailable { device: String },

    #[error("Failed to create {codec} session (status {status})")]
    SessionCreate { codec: Codec, status: i32 },

    #[error("Capture setup failed: {reason}")]
    CaptureSetup {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Missing VPS/SPS/PPS parameter sets for decoder initialization")]
    MissingParameterSets,

    #[error("{component} is not initialized")]
    NotInitialized { component: String },

    #[error("{component} is not running")]
    NotRunning { component: String },

    #[error("{codec} decode failed: {details}")]
    Decode { codec: Codec, details: String },

    #[error("{codec} encode failed: {details}")]
    Encode { codec: Codec, details: String },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Invalid configuration: {details}")]
    Config { details: String },

    #[error("Unknown codec identifier {id}")]
    UnknownCodec { id: u8 },
}

impl MediaError {
    /// Returns whether this error belongs to the setup category.
    ///
    /// Setup failures are fatal to starting a session and are never retried internally.
    pub fn is_setup_failure(&self) -> bool {
        match self {
            MediaError::PermissionDenied { .. }
            | MediaError::DeviceUnavailable { .. }
            | MediaError::SessionCreate { .. }
            | MediaError::CaptureSetup { .. }
            | MediaError::MissingParameterSets
            | MediaError::NotInitialized { .. }
            | MediaError::NotRunning { .. }
            | MediaError::Config { .. } => true,
            MediaError::Decode { .. }
            | MediaError::Encode { .. }
            | MediaError::Parse { .. }
            | MediaError::UnknownCodec { .. } => false,
        }
    }

    /// Returns whether the failure only affects a single unit.
    ///
    /// Transient failures are logged, the unit is dropped and the session continues.
    pub fn is_transient(&self) -> bool {
        match self {
            MediaError::Decode { .. } | MediaError::Encode { .. } | MediaError::Parse { .. } => {
                true
            }
            // Bootstrap data arrives with the next keyframe.
            MediaError::MissingParameterSets => true,
            _ => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            MediaError::PermissionDenied { .. } => vec![
                "Grant camera and microphone access in system settings",
                "Restart the capture after permissions change",
            ],
            MediaError::DeviceUnavailable { .. } => vec![
                "Check that a camera or microphone is connected",
                "Close other applications holding the device",
            ],
            MediaError::SessionCreate { .. } => vec![
                "Verify hardware codec support on this device",
                "Check that the stream parameters are supported",
                "Retry after releasing other codec sessions",
            ],
            MediaError::CaptureSetup { .. } => vec![
                "Check capture device configuration",
                "Retry with video disabled",
            ],
            MediaError::MissingParameterSets => vec![
                "Wait for the next keyframe carrying VPS/SPS/PPS",
                "Request a keyframe from the sender",
            ],
            MediaError::NotInitialized { .. } => vec![
                "Initialize the component before sending data to it",
            ],
            MediaError::NotRunning { .. } => vec!["Start the component before stopping it"],
            MediaError::Decode { .. } => vec![
                "Ignore; the next unit is decoded independently",
                "Request a keyframe if failures persist",
            ],
            MediaError::Encode { .. } => vec![
                "Ignore; the next frame is encoded independently",
                "Lower the bitrate if failures persist",
            ],
            MediaError::Parse { .. } => vec![
                "Check the sender's bitstream framing",
                "Verify transport integrity",
            ],
            MediaError::Config { .. } => vec![
                "Check configuration values against documented ranges",
                "Fall back to default configuration",
            ],
            MediaError::UnknownCodec { .. } => vec![
                "Use codec id 1 (HEVC), 2 (AAC) or 3 (Opus)",
                "Check that sender and receiver versions match",
            ],
        }
    }

    /// Helper constructor for codec session creation failures.
    pub fn session_create(codec: Codec, status: i32) -> Self {
        MediaError::SessionCreate { codec, status }
    }

    /// Helper constructor for capture setup failures.
    pub fn capture_setup(reason: impl Into<String>) -> Self {
        MediaError::CaptureSetup { reason: reason.into(), source: None }
    }

    /// Helper constructor for capture setup failures with source.
    pub fn capture_setup_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        MediaError::CaptureSetup { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for use-before-initialization errors.
    pub fn not_initialized(component: impl Into<String>) -> Self {
        MediaError::NotInitialized { component: component.into() }
    }

    /// Helper constructor for stop-while-idle errors.
    pub fn not_running(component: impl Into<String>) -> Self {
        MediaError::NotRunning { component: component.into() }
    }

    /// Helper constructor for single-unit decode failures.
    pub fn decode(codec: Codec, details: impl Into<String>) -> Self {
        MediaError::Decode { codec, details: details.into() }
    }

    /// Helper constructor for single-unit encode failures.
    pub fn encode(codec: Codec, details: impl Into<String>) -> Self {
        MediaError::Encode { codec, details: details.into() }
    }

    /// Helper constructor for parse anomalies.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        MediaError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        MediaError::Config { details: details.into() }
    }
}

impl From<serde_yaml_ng::Error> for MediaError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        MediaError::Config { details: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_format_correctly_with_arbitrary_context(
            device in ".*",
            details in ".*",
            status in any::<i32>(),
            id in any::<u8>()
          ) {
            let permission = MediaError::PermissionDenied { device: device.clone() };
            let decode = MediaError::decode(Codec::Hevc, details.clone());
            let session = MediaError::session_create(Codec::Opus, status);
            let unknown = MediaError::UnknownCodec { id };

            prop_assert!(permission.to_string().contains(&device));
            prop_assert!(decode.to_string().contains(&details));
            prop_assert!(decode.to_string().contains("HEVC"));
            prop_assert!(session.to_string().contains(&status.to_string()));
            prop_assert!(unknown.to_string().contains(&id.to_string()));
          }

          #[test]
          fn setup_and_transient_categories_are_disjoint(
            reason in ".*",
            details in ".*",
            status in any::<i32>()
          ) {
            let errors = vec![
              MediaError::PermissionDenied { device: reason.clone() },
              MediaError::DeviceUnavailable { device: reason.clone() },
              MediaError::session_create(Codec::Hevc, status),
              MediaError::capture_setup(reason.clone()),
              MediaError::not_initialized(reason.clone()),
              MediaError::not_running(reason.clone()),
              MediaError::decode(Codec::Opus, details.clone()),
              MediaError::encode(Codec::Aac, details.clone()),
              MediaError::parse(reason.clone(), details.clone()),
              MediaError::config(details.clone()),
            ];

            for error in &errors {
              let both = error.is_transient() && error.is_setup_failure()
                && !matches!(error, MediaError::MissingParameterSets);
              prop_assert!(!both, "{error} classified as both setup and transient");
              prop_assert!(!error.recovery_suggestions().is_empty());
            }
          }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<MediaError>();

        let error = MediaError::not_initialized("HEVC player");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn classification_matches_taxonomy() {
        assert!(MediaError::PermissionDenied { device: "camera".into() }.is_setup_failure());
        assert!(MediaError::session_create(Codec::Hevc, -1).is_setup_failure());
        assert!(!MediaError::decode(Codec::Hevc, "bad slice").is_setup_failure());
        assert!(MediaError::decode(Codec::Hevc, "bad slice").is_transient());
        assert!(MediaError::parse("annex-b", "no start code").is_transient());
        assert!(!MediaError::not_running("capture").is_transient());
    }

    #[test]
    fn capture_setup_keeps_source_chain() {
        let io = std::io::Error::other("device busy");
        let error = MediaError::capture_setup_with_source("camera input", Box::new(io));

        let source = std::error::Error::source(&error).expect("source should be preserved");
        assert_eq!(source.to_string(), "device busy");
    }

    #[test]
    fn yaml_errors_convert_to_config() {
        let err = serde_yaml_ng::from_str::<u32>("not: [a number").unwrap_err();
        let converted: MediaError = err.into();
        assert!(matches!(converted, MediaError::Config { .. }));
    }
}
