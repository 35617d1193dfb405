#![allow(clippy::items_after_test_module)]

pub mod builder;
mod common;

pub use builder::{Module, QRBuilder, QR, QUIET_ZONE_WIDTH};
pub use common::error::{QRError, QRResult};
pub use common::metadata::{Color, ECLevel, Version};

/// Encodes `payload` into a QR symbol at the requested error correction
/// level.
///
/// `overlay_scale` in `[0, 1]` scales the center area the caller intends to
/// cover with a decorative overlay; the reserved side length is reported by
/// [`QR::overlay_size`] and the compositing itself is left to the renderer.
/// Pass `0.0` for a plain symbol.
///
/// Empty payloads are rejected with [`QRError::InvalidParameter`].
pub fn encode(payload: &[u8], ec_level: ECLevel, overlay_scale: f64) -> QRResult<QR> {
    QRBuilder::new(payload).ec_level(ec_level).overlay_scale(overlay_scale).build()
}
