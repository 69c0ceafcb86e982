//! Typed field/label bounding boxes returned by the detection service,
//! plus the geometric relation queries used to resolve elements.

pub mod service;

use crate::geometry::Rect;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use service::{DetectedBox, DetectionResponse, FieldDetector, HttpFieldDetector};

/// Closed vocabulary of interactive element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementType {
    TextField,
    Button,
    Radio,
    Checkbox,
    Unknown,
}

impl ElementType {
    /// Map a detector class name to an element type.
    ///
    /// Two-tier lookup: the canonical serialized name is matched first
    /// (case-sensitive), then the detector's human-authored class names
    /// (case-insensitive). Anything else is [`ElementType::Unknown`].
    pub fn from_class_name(name: &str) -> Self {
        match name {
            "TEXT_FIELD" => return ElementType::TextField,
            "BUTTON" => return ElementType::Button,
            "RADIO" => return ElementType::Radio,
            "CHECKBOX" => return ElementType::Checkbox,
            "UNKNOWN" => return ElementType::Unknown,
            _ => {}
        }

        let lower = name.to_ascii_lowercase();
        for (ty, aliases) in [
            (
                ElementType::TextField,
                &["field", "field_with_label", "field_line_with_label"][..],
            ),
            (ElementType::Button, &["button"][..]),
            (ElementType::Radio, &["radio", "radio_with_label"][..]),
            (
                ElementType::Checkbox,
                &["checkbox", "checkbox_with_label"][..],
            ),
        ] {
            if aliases.iter().any(|a| *a == lower) {
                return ty;
            }
        }
        ElementType::Unknown
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::TextField => "TEXT_FIELD",
            ElementType::Button => "BUTTON",
            ElementType::Radio => "RADIO",
            ElementType::Checkbox => "CHECKBOX",
            ElementType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected text region, typically describing a nearby field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub rect: Rect,
    pub text: String,
}

impl Label {
    pub fn new(rect: Rect, text: impl Into<String>) -> Self {
        Self {
            rect,
            text: text.into(),
        }
    }

    /// Label drawn inside the field (e.g. button text): both center
    /// coordinates lie strictly within the field's bounds.
    pub fn is_inside(&self, field: &Field) -> bool {
        let cx = self.rect.center_x();
        let cy = self.rect.center_y();
        let r = &field.rect;
        cx > r.left() && cx < r.right() && cy > r.top() && cy < r.bottom()
    }

    /// Label's vertical center falls within the field's vertical extent.
    ///
    /// Required before a left/right relation is meaningful; the detector
    /// only produces vertically aligned label/field pairs in practice.
    fn vertically_aligned(&self, field: &Field) -> bool {
        let cy = self.rect.center_y();
        cy >= field.rect.top() && cy < field.rect.bottom()
    }

    /// Label's horizontal center falls within the field's horizontal extent.
    fn horizontally_aligned(&self, field: &Field) -> bool {
        let cx = self.rect.center_x();
        cx >= field.rect.left() && cx < field.rect.right()
    }

    /// The field sits to the right of this label.
    pub fn is_field_right_of(&self, field: &Field) -> bool {
        self.vertically_aligned(field) && field.rect.left() >= self.rect.right()
    }

    /// The field sits to the left of this label.
    pub fn is_field_left_of(&self, field: &Field) -> bool {
        self.vertically_aligned(field) && field.rect.right() <= self.rect.left()
    }

    /// The field sits above this label.
    pub fn is_field_above(&self, field: &Field) -> bool {
        self.horizontally_aligned(field) && field.rect.bottom() <= self.rect.top()
    }

    /// The field sits below this label.
    pub fn is_field_below(&self, field: &Field) -> bool {
        self.horizontally_aligned(field) && field.rect.top() >= self.rect.bottom()
    }

    /// Same text and same position within `tolerance` pixels.
    pub fn matches(&self, other: &Label, tolerance: i32) -> bool {
        self.text == other.text && rects_match(&self.rect, &other.rect, tolerance)
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Label {
        Label {
            rect: self.rect.translate(dx, dy),
            text: self.text.clone(),
        }
    }
}

/// A detected interactive UI region.
///
/// When the detector reports a labeled composite (e.g. a bordered field
/// with its caption), `related_field` points at the inner input and
/// [`Field::interaction_rect`] targets it instead of the outer box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub rect: Rect,
    pub class_name: String,
    pub text: Option<String>,
    pub related_field: Option<Box<Field>>,
}

impl Field {
    pub fn new(rect: Rect, class_name: impl Into<String>) -> Self {
        Self {
            rect,
            class_name: class_name.into(),
            text: None,
            related_field: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_related_field(mut self, related: Field) -> Self {
        self.related_field = Some(Box::new(related));
        self
    }

    pub fn element_type(&self) -> ElementType {
        ElementType::from_class_name(&self.class_name)
    }

    /// The rectangle synthetic input should target.
    pub fn interaction_rect(&self) -> Rect {
        match &self.related_field {
            Some(related) => related.rect,
            None => self.rect,
        }
    }

    /// Same class name, same text and same position within `tolerance` pixels.
    pub fn matches(&self, other: &Field, tolerance: i32) -> bool {
        self.class_name == other.class_name
            && self.text == other.text
            && rects_match(&self.rect, &other.rect, tolerance)
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Field {
        Field {
            rect: self.rect.translate(dx, dy),
            class_name: self.class_name.clone(),
            text: self.text.clone(),
            related_field: self
                .related_field
                .as_ref()
                .map(|f| Box::new(f.translate(dx, dy))),
        }
    }
}

fn rects_match(a: &Rect, b: &Rect, tolerance: i32) -> bool {
    (a.x - b.x).abs() <= tolerance
        && (a.y - b.y).abs() <= tolerance
        && (a.width - b.width).abs() <= tolerance
        && (a.height - b.height).abs() <= tolerance
}
