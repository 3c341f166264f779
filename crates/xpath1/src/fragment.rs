//! Result tree fragments: recorded output that can be stored in a variable.

use crate::name::QualifiedName;
use std::fmt;
use std::sync::Arc;

/// One recorded output event.
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentEvent {
    StartElement(QualifiedName),
    Attribute(QualifiedName, String),
    EndElement(QualifiedName),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
    StartPrefixMapping { prefix: Option<String>, uri: String },
    EndPrefixMapping { prefix: Option<String> },
    SetEscaping(bool),
}

/// An immutable, pre-built output subtree.
///
/// Cloning is cheap: the events are shared.
#[derive(Clone, PartialEq)]
pub struct TreeFragment {
    events: Arc<[FragmentEvent]>,
    string_value: Arc<str>,
}

impl TreeFragment {
    pub fn from_events(events: Vec<FragmentEvent>) -> Self {
        let string_value: String = events
            .iter()
            .filter_map(|event| match event {
                FragmentEvent::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        Self {
            events: events.into(),
            string_value: string_value.into(),
        }
    }

    pub fn empty() -> Self {
        Self::from_events(Vec::new())
    }

    pub fn events(&self) -> &[FragmentEvent] {
        &self.events
    }

    /// The concatenated text content, as for the string value of a root node.
    pub fn string_value(&self) -> &str {
        &self.string_value
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl fmt::Debug for TreeFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeFragment")
            .field("events", &self.events.len())
            .field("string_value", &self.string_value)
            .finish()
    }
}
