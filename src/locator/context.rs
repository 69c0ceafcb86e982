//! Per-page detection caches, owned by the test session.
//!
//! The caches are keyed by page origin and populated lazily on first use;
//! they are never implicitly expired, only cleared by [`SessionContext::reset`]
//! between test runs. Concurrent first-population of the same origin is
//! allowed to happen more than once; the last write wins and repeated
//! detection yields equivalent contents.

use crate::capture::{require_non_empty, CaptureTarget, ScreenCapture};
use crate::config::DetectionSettings;
use crate::detection::ImageDetector;
use crate::error::Result;
use crate::page::{Field, FieldDetector, Label};
use image::DynamicImage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Height of the page strip matched against the main-screen capture to
/// locate the viewport on the physical screen.
const OFFSET_STRIP_HEIGHT: u32 = 50;

#[derive(Default)]
struct PageCaches {
    fields: HashMap<String, Vec<Field>>,
    labels: HashMap<String, Vec<Label>>,
    offsets: HashMap<String, (i32, i32)>,
}

/// Session-wide detection state shared by every [`crate::locator::UiElement`].
pub struct SessionContext {
    capture: Arc<dyn ScreenCapture>,
    detector: Arc<dyn FieldDetector>,
    settings: DetectionSettings,
    caches: Mutex<PageCaches>,
}

impl SessionContext {
    pub fn new(
        capture: Arc<dyn ScreenCapture>,
        detector: Arc<dyn FieldDetector>,
        settings: DetectionSettings,
    ) -> Self {
        Self {
            capture,
            detector,
            settings,
            caches: Mutex::new(PageCaches::default()),
        }
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    /// Drop every cached page. Used between test runs.
    pub fn reset(&self) {
        let mut caches = self.caches.lock().unwrap();
        caches.fields.clear();
        caches.labels.clear();
        caches.offsets.clear();
        info!("session caches reset");
    }

    /// Cached fields for a page, in absolute-screen coordinates.
    pub fn fields_for(&self, origin: &str) -> Option<Vec<Field>> {
        self.caches.lock().unwrap().fields.get(origin).cloned()
    }

    /// Cached labels for a page, in absolute-screen coordinates.
    pub fn labels_for(&self, origin: &str) -> Option<Vec<Label>> {
        self.caches.lock().unwrap().labels.get(origin).cloned()
    }

    /// Viewport-to-screen translation for a page.
    pub fn offset_for(&self, origin: &str) -> Option<(i32, i32)> {
        self.caches.lock().unwrap().offsets.get(origin).copied()
    }

    /// Install pre-computed geometry for a page, bypassing capture and
    /// detection. Used with stored references and in tests.
    pub fn seed_page(
        &self,
        origin: &str,
        fields: Vec<Field>,
        labels: Vec<Label>,
        offset: (i32, i32),
    ) {
        let mut caches = self.caches.lock().unwrap();
        caches.fields.insert(origin.to_string(), fields);
        caches.labels.insert(origin.to_string(), labels);
        caches.offsets.insert(origin.to_string(), offset);
    }

    /// Populate the caches for `origin` unless already present (always,
    /// when `force` is set).
    ///
    /// Capture and detection run outside the cache lock: concurrent
    /// callers may both detect, and the last write wins.
    pub(crate) fn ensure_page(&self, origin: &str, force: bool) -> Result<()> {
        if !force && self.caches.lock().unwrap().fields.contains_key(origin) {
            return Ok(());
        }

        let page = require_non_empty(
            self.capture.capture(CaptureTarget::Page)?,
            CaptureTarget::Page,
        )?;
        let screen = require_non_empty(
            self.capture.capture(CaptureTarget::MainScreen)?,
            CaptureTarget::MainScreen,
        )?;

        let offset = self.viewport_offset(&page, &screen)?;
        debug!(origin, offset_x = offset.0, offset_y = offset.1, "viewport offset");

        let (fields, labels) = self.detector.detect(&page)?.into_fields_and_labels();
        // express all cached geometry in absolute-screen coordinates
        let fields: Vec<Field> = fields.iter().map(|f| f.translate(offset.0, offset.1)).collect();
        let labels: Vec<Label> = labels.iter().map(|l| l.translate(offset.0, offset.1)).collect();

        info!(
            origin,
            fields = fields.len(),
            labels = labels.len(),
            "populated page cache"
        );
        let mut caches = self.caches.lock().unwrap();
        caches.fields.insert(origin.to_string(), fields);
        caches.labels.insert(origin.to_string(), labels);
        caches.offsets.insert(origin.to_string(), offset);
        Ok(())
    }

    /// Where the page viewport sits on the physical screen: template-match
    /// a thin strip from the top of the page capture inside the
    /// main-screen capture.
    fn viewport_offset(&self, page: &DynamicImage, screen: &DynamicImage) -> Result<(i32, i32)> {
        let strip_height = page.height().min(OFFSET_STRIP_HEIGHT);
        let strip = page.crop_imm(0, 0, page.width(), strip_height);

        let mut detector =
            ImageDetector::from_images(screen, &strip, self.settings.detection_threshold)
                .with_settings(self.settings.clone());
        let zone = detector.detect_exact_zone_without_scale()?;
        Ok((zone.rectangle.x, zone.rectangle.y))
    }
}
