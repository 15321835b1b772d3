//! Field update rules
//!
//! Every key of a state snapshot is looked up in a [`FieldTable`]. Keys
//! without an explicit entry fall back to [`FieldRule::Generic`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RemoteError, Result};
use crate::panel::ControlPanel;
use crate::snapshot::StateSnapshot;

/// How a field's value is written into the panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FieldRule {
    /// Value and displayed text of the element with the field's id
    Generic,
    /// As `Generic`, plus the displayed text of a separate label
    Labelled { label: String },
    /// Sets the maximum range of another element; writes nothing else
    RangeMax { target: String },
}

/// Lookup table from field name to update rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTable {
    rules: HashMap<String, FieldRule>,
    fallback: FieldRule,
}

impl Default for FieldTable {
    fn default() -> Self {
        let rules = [
            ("Volume", FieldRule::labelled("VolumeValue")),
            ("VolumeSteps", FieldRule::range_max("Volume")),
            ("Temp1", FieldRule::labelled("Temp1Value")),
            ("Temp2", FieldRule::labelled("Temp2Value")),
        ]
        .into_iter()
        .map(|(field, rule)| (field.to_string(), rule))
        .collect();

        Self {
            rules,
            fallback: FieldRule::Generic,
        }
    }
}

impl FieldRule {
    pub fn labelled(label: impl Into<String>) -> Self {
        FieldRule::Labelled {
            label: label.into(),
        }
    }

    pub fn range_max(target: impl Into<String>) -> Self {
        FieldRule::RangeMax {
            target: target.into(),
        }
    }
}

impl FieldTable {
    /// Built-in rules with `overrides` merged on top
    pub fn with_overrides(overrides: &HashMap<String, FieldRule>) -> Self {
        let mut table = Self::default();
        for (field, rule) in overrides {
            table.insert(field.clone(), rule.clone());
        }
        table
    }

    pub fn insert(&mut self, field: impl Into<String>, rule: FieldRule) {
        self.rules.insert(field.into(), rule);
    }

    pub fn rule(&self, field: &str) -> &FieldRule {
        self.rules.get(field).unwrap_or(&self.fallback)
    }

    /// Write every field of `snapshot` into `panel`.
    ///
    /// Range rules run first so a slider's maximum is in place before its
    /// value arrives. A missing element does not stop the remaining fields.
    pub fn apply(&self, panel: &mut dyn ControlPanel, snapshot: &StateSnapshot) -> ApplyReport {
        let mut report = ApplyReport::default();
        let (ranges, values): (Vec<_>, Vec<_>) = snapshot
            .iter()
            .partition(|(field, _)| matches!(self.rule(field), FieldRule::RangeMax { .. }));

        for (field, value) in ranges.into_iter().chain(values) {
            let text = value.render();
            debug!("Applying {}={}", field, text);
            match self.apply_field(panel, field, &text) {
                Ok(()) => report.applied.push(field.to_string()),
                Err(RemoteError::ElementNotFound(id)) => {
                    warn!("Field '{}' has no element '{}' on the panel", field, id);
                    report.missing.push(id);
                }
                Err(e) => {
                    warn!("Failed to apply field '{}': {}", field, e);
                    report.failed.push(field.to_string());
                }
            }
        }
        report
    }

    fn apply_field(&self, panel: &mut dyn ControlPanel, field: &str, text: &str) -> Result<()> {
        match self.rule(field) {
            FieldRule::Generic => {
                panel.set_value(field, text)?;
                panel.set_text(field, text)
            }
            FieldRule::Labelled { label } => {
                panel.set_value(field, text)?;
                panel.set_text(field, text)?;
                panel.set_text(label, text)
            }
            FieldRule::RangeMax { target } => panel.set_max(target, text),
        }
    }
}

/// Outcome of applying one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Fields fully written
    pub applied: Vec<String>,
    /// Element ids that were addressed but do not exist
    pub missing: Vec<String>,
    /// Fields rejected by the panel for any other reason
    pub failed: Vec<String>,
}

impl ApplyReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.failed.is_empty()
    }
}
