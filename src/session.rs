//! Per-page session: document, interception state, listener lifecycle
//!
//! One session per document/frame. Construction runs the initial settings
//! load; `reload` is the storage-change notification path; `keydown` is the
//! capture-phase entry point, gated on the attached listener so a detached
//! session is a strict pass-through.

use tracing::debug;

use crate::config::SiteRegistry;
use crate::dom::{Document, KeyEvent, SyntheticEvent};
use crate::interceptor::{self, ListenerState, PageState, Verdict};

pub struct PageSession {
    doc: Document,
    state: PageState,
}

impl PageSession {
    /// Build a session for `hostname` over `doc` and resolve the initial
    /// listener state from the registry snapshot
    pub fn new(hostname: impl Into<String>, doc: Document, registry: &SiteRegistry) -> Self {
        let mut session = Self {
            doc,
            state: PageState::new(hostname),
        };
        session.reload(registry);
        session
    }

    /// Re-resolve against a fresh registry snapshot (config change path)
    pub fn reload(&mut self, registry: &SiteRegistry) -> ListenerState {
        interceptor::reload_settings(&mut self.state, &mut self.doc, registry)
    }

    pub fn listener_state(&self) -> ListenerState {
        if self.doc.listener_attached {
            ListenerState::Attached
        } else {
            ListenerState::Detached
        }
    }

    /// Deliver one keydown. Without an attached listener the event is not
    /// observed at all.
    pub fn keydown(&mut self, event: &mut KeyEvent) -> Verdict {
        if !self.doc.listener_attached {
            debug!(key = %event.key, "Listener detached, event passes through");
            return Verdict::PassThrough;
        }
        interceptor::handle_keydown(&mut self.state, &mut self.doc, event)
    }

    /// Synthetic events dispatched since the last call
    pub fn take_dispatched(&mut self) -> Vec<SyntheticEvent> {
        self.doc.take_dispatched()
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use crate::dom::Element;
    use std::collections::HashMap;

    fn registry(domain: &str, enabled: bool, selectors: &[&str]) -> SiteRegistry {
        SiteRegistry {
            sites: [(
                domain.to_string(),
                SiteConfig {
                    name: "Example".to_string(),
                    enabled,
                    selectors: selectors.iter().map(|s| s.to_string()).collect(),
                },
            )]
            .into_iter()
            .collect(),
        }
    }

    fn textarea_doc() -> Document {
        Document::new(vec![Element {
            tag: "textarea".to_string(),
            value: "ab".to_string(),
            selection_start: 1,
            selection_end: 1,
            attributes: HashMap::from([("class".to_string(), "chat-input".to_string())]),
            ..Element::default()
        }])
    }

    #[test]
    fn test_session_attaches_on_construction() {
        let reg = registry("example.com", true, &["textarea.chat-input"]);
        let mut session = PageSession::new("example.com", textarea_doc(), &reg);
        assert_eq!(session.listener_state(), ListenerState::Attached);

        let mut event = KeyEvent::new("Enter", 0);
        assert_eq!(session.keydown(&mut event), Verdict::NewlineInserted);
        assert_eq!(session.document().get(0).unwrap().value, "a\nb");
    }

    #[test]
    fn test_detached_session_ignores_events() {
        let reg = registry("example.com", false, &["textarea.chat-input"]);
        let mut session = PageSession::new("example.com", textarea_doc(), &reg);
        assert_eq!(session.listener_state(), ListenerState::Detached);

        let mut event = KeyEvent::new("Enter", 0);
        assert_eq!(session.keydown(&mut event), Verdict::PassThrough);
        assert!(!event.default_prevented);
        assert_eq!(session.document().get(0).unwrap().value, "ab");
    }

    #[test]
    fn test_reload_toggles_listener() {
        let enabled = registry("example.com", true, &["textarea.chat-input"]);
        let disabled = registry("example.com", false, &["textarea.chat-input"]);

        let mut session = PageSession::new("example.com", textarea_doc(), &enabled);
        assert_eq!(session.reload(&disabled), ListenerState::Detached);
        assert_eq!(session.reload(&enabled), ListenerState::Attached);

        let mut event = KeyEvent::new("Enter", 0);
        assert_eq!(session.keydown(&mut event), Verdict::NewlineInserted);
        assert_eq!(session.take_dispatched().len(), 1);
    }
}
