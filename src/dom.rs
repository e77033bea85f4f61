//! Minimal DOM surface consumed and produced by the interceptor
//!
//! The host page's DOM is an external collaborator; this module models the
//! slice of it the interceptor touches: elements with attributes and parent
//! links, incoming keydown events with their delivery state, and the
//! synthetic events we dispatch back at the page. Page snapshots are plain
//! JSON so the harness and tests can build documents directly.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::constants::{dom, keys};

/// Index into the document's element arena
pub type NodeId = usize;

/// A single element node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    /// Parent element, if any (root elements have none)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    /// Raw attribute map; `id` and `class` live here like any other attribute
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
    /// Current value (form controls only)
    #[serde(default)]
    pub value: String,
    /// Selection range in characters (form controls only)
    #[serde(default)]
    pub selection_start: usize,
    #[serde(default)]
    pub selection_end: usize,
}

impl Element {
    pub fn id(&self) -> Option<&str> {
        self.attributes.get("id").map(String::as_str)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace())
            .into_iter()
            .flatten()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Native form-control text inputs carry their own value and selection.
    /// Only text-like inputs qualify: checkboxes, buttons and the rest have
    /// no splice-able value.
    pub fn is_form_control(&self) -> bool {
        if self.tag.eq_ignore_ascii_case("textarea") {
            return true;
        }
        if !self.tag.eq_ignore_ascii_case("input") {
            return false;
        }
        match self.attributes.get("type") {
            // <input> without a type defaults to text
            None => true,
            Some(t) => matches!(
                t.to_ascii_lowercase().as_str(),
                "text" | "search" | "url" | "tel" | "email" | "password"
            ),
        }
    }
}

/// How far an event propagates after the handler returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
    #[default]
    Continue,
    /// stopPropagation: listeners further up the tree are skipped
    Stopped,
    /// stopImmediatePropagation: no other listener sees the event at all
    StoppedImmediate,
}

/// An incoming keydown event as observed at the document capture phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: String,
    pub target: NodeId,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub meta: bool,
    #[serde(default)]
    pub alt: bool,
    /// Set while an IME conversion is in progress
    #[serde(default)]
    pub is_composing: bool,
    /// False for events constructed by page scripts
    #[serde(default = "default_trusted")]
    pub is_trusted: bool,
    /// Self-originated marker carried by our own synthetic events
    #[serde(default)]
    pub self_dispatched: bool,
    #[serde(skip)]
    pub default_prevented: bool,
    #[serde(skip)]
    pub propagation: Propagation,
}

fn default_trusted() -> bool {
    true
}

impl KeyEvent {
    /// A genuine user keystroke on `target` with the given key name
    pub fn new(key: impl Into<String>, target: NodeId) -> Self {
        Self {
            key: key.into(),
            target,
            shift: false,
            ctrl: false,
            meta: false,
            alt: false,
            is_composing: false,
            is_trusted: true,
            self_dispatched: false,
            default_prevented: false,
            propagation: Propagation::Continue,
        }
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn stop_propagation(&mut self) {
        // Never downgrade an immediate stop
        if self.propagation == Propagation::Continue {
            self.propagation = Propagation::Stopped;
        }
    }

    pub fn stop_immediate_propagation(&mut self) {
        self.propagation = Propagation::StoppedImmediate;
    }
}

/// Events the interceptor dispatches back at the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyntheticEvent {
    /// input notification after a direct value mutation
    Input { target: NodeId, bubbles: bool },
    /// Re-dispatched keydown (Shift+Enter soft break, or plain Enter submit)
    Keydown {
        target: NodeId,
        key: String,
        key_code: u32,
        shift: bool,
        bubbles: bool,
        cancelable: bool,
        self_dispatched: bool,
    },
    /// Structured editing intent for editors that own their text model
    BeforeInput {
        target: NodeId,
        input_type: String,
        bubbles: bool,
        cancelable: bool,
    },
}

impl SyntheticEvent {
    /// Marked Enter keydown, optionally with Shift held
    pub fn enter_keydown(target: NodeId, shift: bool) -> Self {
        SyntheticEvent::Keydown {
            target,
            key: keys::ENTER.to_string(),
            key_code: keys::ENTER_KEY_CODE,
            shift,
            bubbles: true,
            cancelable: true,
            self_dispatched: true,
        }
    }
}

/// Element arena for one document/frame
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub elements: Vec<Element>,
    /// Idempotency flag: true while our capture-phase listener is attached
    #[serde(skip)]
    pub listener_attached: bool,
    /// Synthetic events dispatched since the last flush
    #[serde(skip)]
    outbox: Vec<SyntheticEvent>,
}

impl Document {
    pub fn new(elements: Vec<Element>) -> Self {
        Self {
            elements,
            ..Self::default()
        }
    }

    /// Load a page snapshot from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read page snapshot from {path:?}"))?;
        let doc: Document = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse page snapshot from {path:?}"))?;
        Ok(doc)
    }

    pub fn get(&self, node: NodeId) -> Option<&Element> {
        self.elements.get(node)
    }

    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        self.elements.get_mut(node)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.get(node)?.parent
    }

    /// Walk the ancestor chain, nearest first, bounded against parent cycles
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut current = Some(node);
        let mut hops = 0;
        std::iter::from_fn(move || {
            if hops >= dom::MAX_ANCESTOR_DEPTH {
                return None;
            }
            hops += 1;
            current = self.parent(current?);
            current
        })
    }

    pub fn dispatch(&mut self, event: SyntheticEvent) {
        self.outbox.push(event);
    }

    /// Drain the synthetic events dispatched so far
    pub fn take_dispatched(&mut self) -> Vec<SyntheticEvent> {
        std::mem::take(&mut self.outbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tag: &str, parent: Option<NodeId>) -> Element {
        Element {
            tag: tag.to_string(),
            parent,
            ..Element::default()
        }
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let doc = Document {
            elements: vec![
                element("html", None),
                element("body", Some(0)),
                element("div", Some(1)),
                element("textarea", Some(2)),
            ],
            ..Document::default()
        };

        let chain: Vec<NodeId> = doc.ancestors(3).collect();
        assert_eq!(chain, vec![2, 1, 0]);
    }

    #[test]
    fn test_ancestors_terminates_on_parent_cycle() {
        // 0 → 1 → 0 is malformed but must not hang
        let doc = Document {
            elements: vec![element("div", Some(1)), element("div", Some(0))],
            ..Document::default()
        };

        let chain: Vec<NodeId> = doc.ancestors(0).collect();
        assert!(chain.len() <= crate::constants::dom::MAX_ANCESTOR_DEPTH);
    }

    #[test]
    fn test_form_control_covers_textarea_and_text_like_inputs() {
        let mut el = element("textarea", None);
        assert!(el.is_form_control());

        el.tag = "input".to_string();
        assert!(el.is_form_control());
        for ty in ["text", "search", "email", "TEXT"] {
            el.attributes.insert("type".to_string(), ty.to_string());
            assert!(el.is_form_control(), "input[type={ty}]");
        }
        for ty in ["checkbox", "button", "submit", "radio", "file"] {
            el.attributes.insert("type".to_string(), ty.to_string());
            assert!(!el.is_form_control(), "input[type={ty}]");
        }

        el.tag = "div".to_string();
        el.attributes.remove("type");
        assert!(!el.is_form_control());
    }

    #[test]
    fn test_classes_split_from_class_attribute() {
        let mut el = element("div", None);
        el.attributes
            .insert("class".to_string(), "chat-input  focused".to_string());

        let classes: Vec<&str> = el.classes().collect();
        assert_eq!(classes, vec!["chat-input", "focused"]);
    }

    #[test]
    fn test_stop_propagation_never_downgrades_immediate() {
        let mut event = KeyEvent::new("Enter", 0);
        event.stop_immediate_propagation();
        event.stop_propagation();
        assert_eq!(event.propagation, Propagation::StoppedImmediate);
    }

    #[test]
    fn test_take_dispatched_drains_outbox() {
        let mut doc = Document::default();
        doc.dispatch(SyntheticEvent::enter_keydown(0, true));
        assert_eq!(doc.take_dispatched().len(), 1);
        assert!(doc.take_dispatched().is_empty());
    }
}
