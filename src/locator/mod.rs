//! Resolving a `ByUi` query against a page's detected geometry and
//! driving synthetic input at the resolved rectangle.

pub mod context;

pub use context::SessionContext;

use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::input::{InputDriver, MouseButton};
use crate::page::{ElementType, Field, Label};
use crate::replay::{with_retry, REPLAY_DEADLINE, REPLAY_INTERVAL};
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// How a candidate field must sit relative to a matched label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    LeftOf,
    RightOf,
    Above,
    Below,
    Text,
}

impl Relation {
    fn holds(&self, label: &Label, field: &Field) -> bool {
        match self {
            Relation::LeftOf => label.is_field_left_of(field),
            Relation::RightOf => label.is_field_right_of(field),
            Relation::Above => label.is_field_above(field),
            Relation::Below => label.is_field_below(field),
            Relation::Text => label.is_inside(field),
        }
    }
}

/// Search criteria: a desired element type plus positional/text predicates
/// expressed as regex patterns over label text.
///
/// Patterns are compiled lazily at resolution time so building a query
/// never fails; an invalid pattern surfaces as a configuration error from
/// [`UiElement::find_element`].
#[derive(Debug, Clone, Default)]
pub struct ByUi {
    element_type: Option<ElementType>,
    left_of: Option<String>,
    right_of: Option<String>,
    above: Option<String>,
    below: Option<String>,
    text: Option<String>,
}

impl ByUi {
    pub fn new(element_type: ElementType) -> Self {
        Self {
            element_type: Some(element_type),
            ..Self::default()
        }
    }

    /// The element sits to the left of a label matching `pattern`.
    pub fn left_of(mut self, pattern: impl Into<String>) -> Self {
        self.left_of = Some(pattern.into());
        self
    }

    /// The element sits to the right of a label matching `pattern`.
    pub fn right_of(mut self, pattern: impl Into<String>) -> Self {
        self.right_of = Some(pattern.into());
        self
    }

    /// The element sits above a label matching `pattern`.
    pub fn above(mut self, pattern: impl Into<String>) -> Self {
        self.above = Some(pattern.into());
        self
    }

    /// The element sits below a label matching `pattern`.
    pub fn below(mut self, pattern: impl Into<String>) -> Self {
        self.below = Some(pattern.into());
        self
    }

    /// The element carries a label matching `pattern` (e.g. button text).
    pub fn text(mut self, pattern: impl Into<String>) -> Self {
        self.text = Some(pattern.into());
        self
    }

    fn compile(&self) -> Result<CompiledCriteria> {
        let element_type = self.element_type.ok_or_else(|| {
            Error::Configuration(format!("Search criteria [{}] have no element type", self))
        })?;

        let mut relations = Vec::new();
        for (relation, pattern) in [
            (Relation::LeftOf, &self.left_of),
            (Relation::RightOf, &self.right_of),
            (Relation::Above, &self.above),
            (Relation::Below, &self.below),
            (Relation::Text, &self.text),
        ] {
            if let Some(pattern) = pattern {
                let regex = Regex::new(pattern).map_err(|e| {
                    Error::Configuration(format!(
                        "Invalid pattern '{}' in search criteria [{}]: {}",
                        pattern, self, e
                    ))
                })?;
                relations.push((relation, regex));
            }
        }

        if relations.is_empty() {
            return Err(Error::Configuration(format!(
                "Search criteria [{}] have no positional or text predicate",
                self
            )));
        }

        Ok(CompiledCriteria {
            element_type,
            relations,
        })
    }
}

impl fmt::Display for ByUi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        match self.element_type {
            Some(ty) => parts.push(format!("type={}", ty)),
            None => parts.push("type=<unset>".to_string()),
        }
        for (name, pattern) in [
            ("left_of", &self.left_of),
            ("right_of", &self.right_of),
            ("above", &self.above),
            ("below", &self.below),
            ("text", &self.text),
        ] {
            if let Some(pattern) = pattern {
                parts.push(format!("{}={}", name, pattern));
            }
        }
        f.write_str(&parts.join(", "))
    }
}

#[derive(Debug)]
struct CompiledCriteria {
    element_type: ElementType,
    relations: Vec<(Relation, Regex)>,
}

/// One interaction site on a page, located by image detection instead of
/// the DOM.
///
/// The element resolves its rectangle lazily via [`UiElement::find_element`]
/// and re-resolves on every call when `reset_search` is set.
pub struct UiElement {
    criteria: ByUi,
    origin: String,
    reset_search: bool,
    context: Arc<SessionContext>,
    driver: Arc<dyn InputDriver>,
    detected_rectangle: Option<Rect>,
    action_duration: Option<Duration>,
}

impl UiElement {
    pub fn new(
        criteria: ByUi,
        origin: impl Into<String>,
        context: Arc<SessionContext>,
        driver: Arc<dyn InputDriver>,
    ) -> Self {
        Self {
            criteria,
            origin: origin.into(),
            reset_search: false,
            context,
            driver,
            detected_rectangle: None,
            action_duration: None,
        }
    }

    /// Re-capture and re-detect the page on every resolution.
    pub fn with_reset_search(mut self, reset_search: bool) -> Self {
        self.reset_search = reset_search;
        self
    }

    /// Rectangle resolved by the last successful [`UiElement::find_element`].
    pub fn detected_rectangle(&self) -> Option<Rect> {
        self.detected_rectangle
    }

    /// Wall-clock time spent by the last successful resolution.
    pub fn action_duration(&self) -> Option<Duration> {
        self.action_duration
    }

    /// Resolve the element's rectangle from the page's detected geometry.
    ///
    /// Populates the per-page caches on first use for this element's
    /// origin (always, when `reset_search` is set), then matches labels
    /// by pattern and fields by type and relative position. The returned
    /// rectangle is in absolute-screen coordinates.
    pub fn find_element(&mut self) -> Result<Rect> {
        let started = Instant::now();
        let compiled = self.criteria.compile()?;

        self.context.ensure_page(&self.origin, self.reset_search)?;
        let fields = self.context.fields_for(&self.origin).unwrap_or_default();
        let labels = self.context.labels_for(&self.origin).unwrap_or_default();

        let mut label_candidates: Vec<(Relation, Vec<&Label>)> = Vec::new();
        for (relation, regex) in &compiled.relations {
            let matching: Vec<&Label> = labels.iter().filter(|l| regex.is_match(&l.text)).collect();
            if matching.is_empty() {
                return Err(Error::Configuration(format!(
                    "No label could be found matching search criteria [{}]",
                    self.criteria
                )));
            }
            label_candidates.push((*relation, matching));
        }

        let field = fields
            .iter()
            .find(|field| {
                field.element_type() == compiled.element_type
                    && label_candidates.iter().all(|(relation, candidates)| {
                        candidates.iter().any(|label| relation.holds(label, field))
                    })
            })
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "No field could be found matching search criteria [{}]",
                    self.criteria
                ))
            })?;

        let rect = field.interaction_rect();
        debug!(criteria = %self.criteria, rect = %rect, "element resolved");
        self.detected_rectangle = Some(rect);
        self.action_duration = Some(started.elapsed());
        Ok(rect)
    }

    /// Left-click at the element's center plus `(dx, dy)`.
    pub fn click_at(&mut self, dx: i32, dy: i32) -> Result<()> {
        self.perform(dx, dy, |driver, x, y| driver.click_at(x, y, MouseButton::Left))
    }

    pub fn double_click_at(&mut self, dx: i32, dy: i32) -> Result<()> {
        self.perform(dx, dy, |driver, x, y| driver.double_click_at(x, y))
    }

    pub fn right_click_at(&mut self, dx: i32, dy: i32) -> Result<()> {
        self.perform(dx, dy, |driver, x, y| {
            driver.click_at(x, y, MouseButton::Right)
        })
    }

    /// Click the element to focus it, then type `text`.
    pub fn send_keys(&mut self, text: &str) -> Result<()> {
        self.perform(0, 0, |driver, x, y| {
            driver.click_at(x, y, MouseButton::Left)?;
            driver.send_text(text)
        })
    }

    /// Poll [`UiElement::find_element`] until it succeeds or `wait` has
    /// elapsed; `Duration::ZERO` means a single non-blocking attempt.
    ///
    /// "Not found" and image-search failures read as "not present yet";
    /// anything else (screenshot, transport) is re-thrown.
    pub fn is_element_present(&mut self, wait: Duration) -> Result<bool> {
        let deadline = Instant::now() + wait;
        let interval = Duration::from_millis(self.context.settings().poll_interval_ms);
        loop {
            match self.find_element() {
                Ok(_) => return Ok(true),
                Err(Error::Configuration(_)) | Err(Error::ImageSearch(_)) => {
                    if Instant::now() >= deadline {
                        return Ok(false);
                    }
                    std::thread::sleep(interval);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Resolve, scroll the target into view, then run the driver action
    /// at the scroll-adjusted absolute point.
    fn perform(
        &mut self,
        dx: i32,
        dy: i32,
        action: impl Fn(&dyn InputDriver, i32, i32) -> Result<()>,
    ) -> Result<()> {
        let rect = self.find_element()?;
        let target_x = rect.center_x() + dx;
        let target_y = rect.center_y() + dy;

        self.driver.scroll_to(target_x, target_y)?;
        let (scroll_x, scroll_y) = self.driver.scroll_position()?;

        let driver = Arc::clone(&self.driver);
        with_retry(REPLAY_DEADLINE, REPLAY_INTERVAL, || {
            action(driver.as_ref(), target_x - scroll_x, target_y - scroll_y)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criteria_display_lists_set_parts() {
        let by = ByUi::new(ElementType::TextField).right_of("Name");
        assert_eq!(by.to_string(), "type=TEXT_FIELD, right_of=Name");

        let by = ByUi::new(ElementType::Button).text("OK").below("Terms");
        assert_eq!(by.to_string(), "type=BUTTON, below=Terms, text=OK");
    }

    #[test]
    fn compile_rejects_missing_type() {
        let by = ByUi::default().right_of("Name");
        let err = by.compile().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("no element type"));
    }

    #[test]
    fn compile_rejects_missing_predicate() {
        let by = ByUi::new(ElementType::Button);
        let err = by.compile().unwrap_err();
        assert!(err.to_string().contains("no positional or text predicate"));
    }

    #[test]
    fn compile_rejects_invalid_pattern() {
        let by = ByUi::new(ElementType::Button).text("(unclosed");
        let err = by.compile().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
