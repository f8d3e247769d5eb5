//! TypeScript Generation Tests
//!
//! Validates that the boundary types can be exported to TypeScript when the
//! tauri feature is enabled.

#[cfg(feature = "tauri")]
#[test]
fn test_boundary_types_implement_specta_type() {
    use specta::Type;

    // If this compiles, all types are properly configured for TypeScript export.
    fn assert_type<T: Type>() {}

    assert_type::<avsync::Codec>();
    assert_type::<avsync::UpdateRate>();
    assert_type::<avsync::TextureHandle>();
    assert_type::<avsync::PlayoutConfig>();
    assert_type::<avsync::CaptureConfig>();
    assert_type::<avsync::playback::AudioStats>();
    assert_type::<avsync::playback::VideoStats>();
}

#[cfg(not(feature = "tauri"))]
#[test]
fn test_tauri_feature_disabled() {
    // Types still compile without specta::Type.
    let _ = avsync::UpdateRate::Native;
    let _ = avsync::TextureHandle(1);
}
