//! Similarity scoring between two detected geometries, used to decide
//! whether a failing test step still shows the expected page.

use crate::page::{Field, Label};
use serde::Serialize;
use tracing::debug;

/// Outcome of one comparison: an integer percentage plus the reference
/// entries that found no counterpart in the step capture.
///
/// The comparator only produces the score; interpreting it (same page,
/// changed page, wrong page) is up to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonResult {
    pub score: i32,
    pub missing_fields: Vec<Field>,
    pub missing_labels: Vec<Label>,
}

/// Compares a captured test-step geometry against a stored reference.
pub struct StepReferenceComparator {
    step_fields: Vec<Field>,
    step_labels: Vec<Label>,
    reference_fields: Vec<Field>,
    reference_labels: Vec<Label>,
    position_tolerance: i32,
}

impl StepReferenceComparator {
    pub fn new(
        step_fields: Vec<Field>,
        step_labels: Vec<Label>,
        reference_fields: Vec<Field>,
        reference_labels: Vec<Label>,
        position_tolerance: i32,
    ) -> Self {
        Self {
            step_fields,
            step_labels,
            reference_fields,
            reference_labels,
            position_tolerance,
        }
    }

    /// Score in [0, 100]: the share of reference fields and labels that
    /// have a matching counterpart in the step sets. An empty reference
    /// is trivially satisfied and scores 100.
    pub fn compare(&self) -> ComparisonResult {
        let mut matched = 0usize;
        let mut missing_labels = Vec::new();
        for reference in &self.reference_labels {
            if self
                .step_labels
                .iter()
                .any(|label| reference.matches(label, self.position_tolerance))
            {
                matched += 1;
            } else {
                missing_labels.push(reference.clone());
            }
        }

        let mut missing_fields = Vec::new();
        for reference in &self.reference_fields {
            if self
                .step_fields
                .iter()
                .any(|field| reference.matches(field, self.position_tolerance))
            {
                matched += 1;
            } else {
                missing_fields.push(reference.clone());
            }
        }

        let total = self.reference_fields.len() + self.reference_labels.len();
        let score = if total == 0 {
            100
        } else {
            (100 * matched / total) as i32
        };

        debug!(
            score,
            missing_fields = missing_fields.len(),
            missing_labels = missing_labels.len(),
            "compared step against reference"
        );
        ComparisonResult {
            score,
            missing_fields,
            missing_labels,
        }
    }
}
