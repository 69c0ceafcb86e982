//! `fieldctl` locates and drives UI elements by looking at the screen
//! instead of the DOM.
//!
//! A remote detector turns a page screenshot into typed field/label
//! bounding boxes; [`ImageDetector`] registers reference images inside
//! larger captures (locating the browser viewport on the physical screen,
//! or a known widget inside a page); [`UiElement`] resolves a [`ByUi`]
//! query against the detected geometry and issues synthetic input at the
//! resulting screen coordinates.
//!
//! # Core Components
//! - [`ImageDetector`]: feature-based and template-based image registration.
//! - [`UiElement`] / [`ByUi`]: element resolution and the action surface.
//! - [`SessionContext`]: per-page detection caches owned by the test session.
//! - [`StepReferenceComparator`]: similarity scoring for failure diagnosis.
//!
//! External collaborators (screenshot capture, the detection service, the
//! synthetic-input driver) are consumed through the [`ScreenCapture`],
//! [`FieldDetector`] and [`InputDriver`] traits.

pub mod capture;
pub mod comparator;
pub mod config;
pub mod detection;
mod error;
pub mod geometry;
pub mod input;
pub mod locator;
pub mod page;
pub mod replay;

pub use error::{Error, Result};

pub use capture::{CaptureTarget, ScreenCapture};
pub use comparator::{ComparisonResult, StepReferenceComparator};
pub use config::{Config, DetectionSettings, DetectorServiceSettings};
pub use detection::{DetectedZone, ImageDetector, Rotation};
pub use geometry::Rect;
pub use input::{InputDriver, MouseButton};
pub use locator::{ByUi, SessionContext, UiElement};
pub use page::{
    DetectionResponse, ElementType, Field, FieldDetector, HttpFieldDetector, Label,
};
pub use replay::with_retry;
