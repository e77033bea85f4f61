//! Enter-key interception state machine
//!
//! Runs at the document capture phase, ahead of every page handler. Each
//! keydown passes through an ordered guard chain; the first failing guard
//! lets the event proceed natively. A plain Enter on a recognized target is
//! suppressed and replaced with a newline appropriate to the element's
//! editing model; Ctrl/Cmd+Enter is re-presented to the page as a bare Enter
//! so its own submit-on-Enter handler fires. Every failure path degrades to
//! pass-through: nothing here may break the page.

use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::{SiteConfig, SiteRegistry};
use crate::constants::{events, keys, markers};
use crate::dom::{Document, Element, KeyEvent, NodeId, SyntheticEvent};
use crate::selector::Selector;

/// Whether the capture-phase listener is currently attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Detached,
    Attached,
}

/// What the interceptor did with one keydown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Event proceeds natively, untouched
    PassThrough,
    /// Mid-IME-conversion Enter: hidden from page handlers but left to the
    /// browser so the conversion commits normally
    CompositionShielded,
    /// Newline spliced directly into a form control's value
    NewlineInserted,
    /// insertLineBreak intent dispatched to a rich-text editor
    LineBreakIntent,
    /// Synthetic Shift+Enter re-dispatched for the page to handle
    SoftBreakRedispatch,
    /// Synthetic plain Enter re-dispatched to trigger the page's submit
    SubmitRedispatch,
}

/// Per-document interception state. One instance per document/frame,
/// created at script start and torn down with the document.
#[derive(Debug)]
pub struct PageState {
    pub enabled: bool,
    pub current_domain: String,
    pub site_config: Option<SiteConfig>,
    /// Elements already confirmed to match a selector; never pruned,
    /// cleared whenever the site config is reloaded
    pub recognized: HashSet<NodeId>,
}

impl PageState {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            enabled: false,
            current_domain: domain.into(),
            site_config: None,
            recognized: HashSet::new(),
        }
    }
}

/// Element editing models we know how to insert a newline into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditorKind {
    /// textarea/input: value and selection are ours to mutate
    FormControl,
    /// Editor that owns its text model; edits go through its command pipeline
    RichText,
    /// Anything else editable; the page's own Shift+Enter handler does the work
    Generic,
}

fn classify(el: &Element) -> EditorKind {
    if el.is_form_control() {
        EditorKind::FormControl
    } else if el.has_attribute(markers::RICH_TEXT_EDITOR) {
        EditorKind::RichText
    } else {
        EditorKind::Generic
    }
}

/// Re-resolve the site config for the current domain and attach or detach
/// the listener to match. The listener is attached iff an enabled config
/// with at least one selector resolves; attach and detach are idempotent,
/// keyed on the document's own flag, so at most one listener exists.
pub fn reload_settings(
    state: &mut PageState,
    doc: &mut Document,
    registry: &SiteRegistry,
) -> ListenerState {
    // The resolved config may have changed; cached recognitions are stale
    state.recognized.clear();

    let resolved = registry.resolve(&state.current_domain).cloned();
    state.enabled = resolved.as_ref().is_some_and(|site| site.enabled);
    let should_attach = resolved
        .as_ref()
        .is_some_and(|site| site.enabled && !site.selectors.is_empty());
    state.site_config = resolved;

    if should_attach {
        if !doc.listener_attached {
            doc.listener_attached = true;
            info!(domain = %state.current_domain, "Attached keydown listener");
        }
        ListenerState::Attached
    } else {
        if doc.listener_attached {
            doc.listener_attached = false;
            info!(domain = %state.current_domain, "Detached keydown listener");
        }
        ListenerState::Detached
    }
}

/// The capture-phase keydown handler: the ordered guard chain
pub fn handle_keydown(state: &mut PageState, doc: &mut Document, event: &mut KeyEvent) -> Verdict {
    // 1. Only Enter is ever touched
    if event.key != keys::ENTER {
        return Verdict::PassThrough;
    }

    // 2. Our own synthetic events must not loop back through us
    if event.self_dispatched {
        return Verdict::PassThrough;
    }

    // 3. Mid-IME-conversion Enter commits the conversion. Leave the default
    //    action alone, but hide the event from the page's submit handlers.
    if event.is_composing {
        event.stop_immediate_propagation();
        debug!("Shielding Enter during IME composition");
        return Verdict::CompositionShielded;
    }

    // 4. Disabled, or a spoofed event from a page script
    if !state.enabled || !event.is_trusted {
        return Verdict::PassThrough;
    }

    // 5. No site config resolved for this domain
    let Some(site) = &state.site_config else {
        return Verdict::PassThrough;
    };

    // 6. Target must be an element node
    if doc.get(event.target).is_none() {
        return Verdict::PassThrough;
    }

    // 7. Target recognition, amortized through the positive cache
    if !state.recognized.contains(&event.target)
        && !recognize_target(&mut state.recognized, doc, event.target, &site.selectors)
    {
        return Verdict::PassThrough;
    }

    // 8. Exactly one of the two dispatch branches
    let plain_enter = !event.shift && !event.ctrl && !event.meta && !event.alt;
    if plain_enter {
        event.prevent_default();
        event.stop_immediate_propagation();
        return insert_newline(doc, event.target);
    }

    let modifier_enter = event.ctrl || event.meta;
    if modifier_enter {
        event.prevent_default();
        // Non-immediate: bubble listeners up the tree may still run
        event.stop_propagation();
        doc.dispatch(SyntheticEvent::enter_keydown(event.target, false));
        debug!(target = event.target, "Re-dispatched plain Enter for submit");
        return Verdict::SubmitRedispatch;
    }

    // 9. Alt+Enter and the like
    Verdict::PassThrough
}

/// Test `target` against each selector in order: the element itself matches,
/// or some ancestor-or-self does. A selector that fails to parse is skipped.
/// The first hit caches the element for subsequent keystrokes.
fn recognize_target(
    recognized: &mut HashSet<NodeId>,
    doc: &Document,
    target: NodeId,
    selectors: &[String],
) -> bool {
    for raw in selectors {
        let selector = match Selector::parse(raw) {
            Ok(selector) => selector,
            Err(err) => {
                debug!(selector = %raw, error = %err, "Skipping unparseable selector");
                continue;
            }
        };
        if selector.matches(doc, target) || selector.closest(doc, target).is_some() {
            recognized.insert(target);
            debug!(target = target, selector = %raw, "Recognized target element");
            return true;
        }
    }
    false
}

/// Insert a newline into `target` the way its editing model expects
fn insert_newline(doc: &mut Document, target: NodeId) -> Verdict {
    let kind = match doc.get(target) {
        Some(el) => classify(el),
        None => return Verdict::PassThrough,
    };

    match kind {
        EditorKind::FormControl => {
            if let Some(el) = doc.get_mut(target) {
                splice_newline(el);
            }
            // Reactive UIs watch for input, not keydown
            doc.dispatch(SyntheticEvent::Input {
                target,
                bubbles: true,
            });
            Verdict::NewlineInserted
        }
        EditorKind::RichText => {
            doc.dispatch(SyntheticEvent::BeforeInput {
                target,
                input_type: events::INSERT_LINE_BREAK.to_string(),
                bubbles: true,
                cancelable: true,
            });
            Verdict::LineBreakIntent
        }
        EditorKind::Generic => {
            doc.dispatch(SyntheticEvent::enter_keydown(target, true));
            Verdict::SoftBreakRedispatch
        }
    }
}

/// Replace the selected range with "\n" and put the caret right after it.
/// Selection offsets from a snapshot may be out of range; clamp rather than
/// lose the keystroke.
fn splice_newline(el: &mut Element) {
    let chars: Vec<char> = el.value.chars().collect();
    let start = el.selection_start.min(chars.len());
    let end = el.selection_end.clamp(start, chars.len());
    if start != el.selection_start || end != el.selection_end {
        warn!(
            start = el.selection_start,
            end = el.selection_end,
            len = chars.len(),
            "Clamped out-of-range selection"
        );
    }

    let mut value = String::with_capacity(el.value.len() + 1);
    value.extend(&chars[..start]);
    value.push('\n');
    value.extend(&chars[end..]);
    el.value = value;
    el.selection_start = start + 1;
    el.selection_end = start + 1;
}
