use crate::error::{Error, Result};
use image::DynamicImage;

/// What the external screenshot service should capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    /// The rendered page (browser viewport content, full height).
    Page,
    /// The whole main screen / desktop.
    MainScreen,
}

/// External screenshot-capture collaborator.
pub trait ScreenCapture: Send + Sync {
    fn capture(&self, target: CaptureTarget) -> Result<DynamicImage>;
}

/// Reject empty captures so callers can tell "couldn't even look" apart
/// from "looked and didn't find".
pub(crate) fn require_non_empty(image: DynamicImage, target: CaptureTarget) -> Result<DynamicImage> {
    if image.width() == 0 || image.height() == 0 {
        return Err(Error::ScreenshotFailed(format!(
            "capture of {:?} returned an empty image",
            target
        )));
    }
    Ok(image)
}
