//! Control panel abstraction
//!
//! The sync client never owns any presentation state of its own. It writes
//! values into a [`ControlPanel`], addressing elements by id, the way a web
//! page exposes sliders and labels by element id.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::{RemoteError, Result};

/// Addressable elements the sync client writes into
#[cfg_attr(test, mockall::automock)]
pub trait ControlPanel: Send {
    /// Set the element's value (the slider position / input value)
    fn set_value(&mut self, id: &str, value: &str) -> Result<()>;

    /// Set the element's displayed text
    fn set_text(&mut self, id: &str, text: &str) -> Result<()>;

    /// Set the element's maximum range
    fn set_max(&mut self, id: &str, max: &str) -> Result<()>;
}

/// State of one element in a [`MemoryPanel`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub value: Option<String>,
    pub text: Option<String>,
    pub max: Option<String>,
}

/// In-memory control panel with a fixed set of element ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryPanel {
    elements: BTreeMap<String, Element>,
}

impl MemoryPanel {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            elements: ids
                .into_iter()
                .map(|id| (id.into(), Element::default()))
                .collect(),
        }
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn value(&self, id: &str) -> Option<&str> {
        self.elements.get(id).and_then(|e| e.value.as_deref())
    }

    pub fn text(&self, id: &str) -> Option<&str> {
        self.elements.get(id).and_then(|e| e.text.as_deref())
    }

    pub fn max(&self, id: &str) -> Option<&str> {
        self.elements.get(id).and_then(|e| e.max.as_deref())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    /// One line per element, sorted by id
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (id, element) in &self.elements {
            let _ = write!(
                out,
                "{:<12} value={:<8} text={:<8}",
                id,
                element.value.as_deref().unwrap_or("-"),
                element.text.as_deref().unwrap_or("-"),
            );
            if let Some(max) = &element.max {
                let _ = write!(out, " max={}", max);
            }
            out.push('\n');
        }
        out
    }

    fn element_mut(&mut self, id: &str) -> Result<&mut Element> {
        self.elements
            .get_mut(id)
            .ok_or_else(|| RemoteError::ElementNotFound(id.to_string()))
    }
}

impl ControlPanel for MemoryPanel {
    fn set_value(&mut self, id: &str, value: &str) -> Result<()> {
        self.element_mut(id)?.value = Some(value.to_string());
        Ok(())
    }

    fn set_text(&mut self, id: &str, text: &str) -> Result<()> {
        self.element_mut(id)?.text = Some(text.to_string());
        Ok(())
    }

    fn set_max(&mut self, id: &str, max: &str) -> Result<()> {
        self.element_mut(id)?.max = Some(max.to_string());
        Ok(())
    }
}
