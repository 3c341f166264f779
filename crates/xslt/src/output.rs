//! Defines the `ResultSink` trait, which decouples the executor from whatever
//! consumes the result tree.

use weft_xpath1::{FragmentEvent, QualifiedName, TreeFragment};

/// The ordered events of a result tree. Attributes of an element arrive after
/// its `start_element` and before any of its content.
pub trait ResultSink {
    fn start_element(&mut self, name: &QualifiedName);
    fn attribute(&mut self, name: &QualifiedName, value: &str);
    fn end_element(&mut self, name: &QualifiedName);
    fn characters(&mut self, text: &str);
    fn comment(&mut self, text: &str);
    fn processing_instruction(&mut self, target: &str, data: &str);
    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str);
    fn end_prefix_mapping(&mut self, prefix: Option<&str>);
    /// Turns output escaping off (`false`) and back on. Always issued in pairs.
    fn set_escaping(&mut self, enabled: bool);
}

/// A sink that records events, used for tree-fragment variables and as the
/// default output of a transformation.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Vec<FragmentEvent>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[FragmentEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<FragmentEvent> {
        self.events
    }

    pub fn into_fragment(self) -> TreeFragment {
        TreeFragment::from_events(self.events)
    }
}

impl ResultSink for EventRecorder {
    fn start_element(&mut self, name: &QualifiedName) {
        self.events.push(FragmentEvent::StartElement(name.clone()));
    }

    fn attribute(&mut self, name: &QualifiedName, value: &str) {
        self.events.push(FragmentEvent::Attribute(name.clone(), value.to_string()));
    }

    fn end_element(&mut self, name: &QualifiedName) {
        self.events.push(FragmentEvent::EndElement(name.clone()));
    }

    fn characters(&mut self, text: &str) {
        // Adjacent runs form one text node.
        if let Some(FragmentEvent::Text(last)) = self.events.last_mut() {
            last.push_str(text);
        } else {
            self.events.push(FragmentEvent::Text(text.to_string()));
        }
    }

    fn comment(&mut self, text: &str) {
        self.events.push(FragmentEvent::Comment(text.to_string()));
    }

    fn processing_instruction(&mut self, target: &str, data: &str) {
        self.events.push(FragmentEvent::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        });
    }

    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) {
        self.events.push(FragmentEvent::StartPrefixMapping {
            prefix: prefix.map(str::to_string),
            uri: uri.to_string(),
        });
    }

    fn end_prefix_mapping(&mut self, prefix: Option<&str>) {
        self.events.push(FragmentEvent::EndPrefixMapping {
            prefix: prefix.map(str::to_string),
        });
    }

    fn set_escaping(&mut self, enabled: bool) {
        self.events.push(FragmentEvent::SetEscaping(enabled));
    }
}

/// Sends one recorded event to `target`.
pub fn apply_event(target: &mut dyn ResultSink, event: &FragmentEvent) {
    match event {
        FragmentEvent::StartElement(name) => target.start_element(name),
        FragmentEvent::Attribute(name, value) => target.attribute(name, value),
        FragmentEvent::EndElement(name) => target.end_element(name),
        FragmentEvent::Text(text) => target.characters(text),
        FragmentEvent::Comment(text) => target.comment(text),
        FragmentEvent::ProcessingInstruction { target: t, data } => target.processing_instruction(t, data),
        FragmentEvent::StartPrefixMapping { prefix, uri } => target.start_prefix_mapping(prefix.as_deref(), uri),
        FragmentEvent::EndPrefixMapping { prefix } => target.end_prefix_mapping(prefix.as_deref()),
        FragmentEvent::SetEscaping(enabled) => target.set_escaping(*enabled),
    }
}

/// The executor's view of a sink. It tracks open elements so that an attribute
/// can be refused once the current element has content.
///
/// Attributes of the open start tag are held back until the first content
/// event or the end of the element. A later attribute with the same expanded
/// name replaces the earlier one.
pub struct ResultWriter<'o> {
    sink: &'o mut dyn ResultSink,
    open: Vec<QualifiedName>,
    accepts_attributes: bool,
    pending: Vec<(QualifiedName, String)>,
}

impl<'o> ResultWriter<'o> {
    pub fn new(sink: &'o mut dyn ResultSink) -> Self {
        Self {
            sink,
            open: Vec::new(),
            accepts_attributes: false,
            pending: Vec::new(),
        }
    }

    fn flush_attributes(&mut self) {
        for (name, value) in self.pending.drain(..) {
            self.sink.attribute(&name, &value);
        }
    }

    pub fn start_element(&mut self, name: &QualifiedName) {
        self.flush_attributes();
        self.sink.start_element(name);
        self.open.push(name.clone());
        self.accepts_attributes = true;
    }

    /// Adds the attribute to the open start tag, or returns `false` if no
    /// element is open or the open element already has content.
    pub fn attribute(&mut self, name: &QualifiedName, value: &str) -> bool {
        if !self.accepts_attributes {
            return false;
        }
        match self.pending.iter_mut().find(|(existing, _)| existing == name) {
            Some(slot) => *slot = (name.clone(), value.to_string()),
            None => self.pending.push((name.clone(), value.to_string())),
        }
        true
    }

    pub fn end_element(&mut self) {
        self.flush_attributes();
        if let Some(name) = self.open.pop() {
            self.sink.end_element(&name);
        }
        self.accepts_attributes = false;
    }

    pub fn text(&mut self, text: &str, disable_escaping: bool) {
        if text.is_empty() {
            return;
        }
        self.flush_attributes();
        self.accepts_attributes = false;
        if disable_escaping {
            self.sink.set_escaping(false);
            self.sink.characters(text);
            self.sink.set_escaping(true);
        } else {
            self.sink.characters(text);
        }
    }

    pub fn comment(&mut self, text: &str) {
        self.flush_attributes();
        self.accepts_attributes = false;
        self.sink.comment(text);
    }

    pub fn processing_instruction(&mut self, target: &str, data: &str) {
        self.flush_attributes();
        self.accepts_attributes = false;
        self.sink.processing_instruction(target, data);
    }

    pub fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) {
        self.flush_attributes();
        self.sink.start_prefix_mapping(prefix, uri);
    }

    pub fn end_prefix_mapping(&mut self, prefix: Option<&str>) {
        self.flush_attributes();
        self.sink.end_prefix_mapping(prefix);
    }

    fn toggle_escaping(&mut self, enabled: bool) {
        self.flush_attributes();
        self.sink.set_escaping(enabled);
    }

    /// Replays a tree fragment. Attribute events in it go through the same check.
    pub fn fragment(&mut self, fragment: &TreeFragment) -> usize {
        let mut refused = 0;
        for event in fragment.events() {
            match event {
                FragmentEvent::StartElement(name) => self.start_element(name),
                FragmentEvent::EndElement(_) => self.end_element(),
                FragmentEvent::Attribute(name, value) => {
                    if !self.attribute(name, value) {
                        refused += 1;
                    }
                }
                FragmentEvent::Text(text) => self.text(text, false),
                FragmentEvent::Comment(text) => self.comment(text),
                FragmentEvent::ProcessingInstruction { target, data } => self.processing_instruction(target, data),
                FragmentEvent::StartPrefixMapping { prefix, uri } => self.start_prefix_mapping(prefix.as_deref(), uri),
                FragmentEvent::EndPrefixMapping { prefix } => self.end_prefix_mapping(prefix.as_deref()),
                FragmentEvent::SetEscaping(enabled) => self.toggle_escaping(*enabled),
            }
        }
        refused
    }
}

/// Lets extension elements write through the writer.
impl ResultSink for ResultWriter<'_> {
    fn start_element(&mut self, name: &QualifiedName) {
        ResultWriter::start_element(self, name);
    }

    fn attribute(&mut self, name: &QualifiedName, value: &str) {
        ResultWriter::attribute(self, name, value);
    }

    fn end_element(&mut self, _name: &QualifiedName) {
        ResultWriter::end_element(self);
    }

    fn characters(&mut self, text: &str) {
        self.text(text, false);
    }

    fn comment(&mut self, text: &str) {
        ResultWriter::comment(self, text);
    }

    fn processing_instruction(&mut self, target: &str, data: &str) {
        ResultWriter::processing_instruction(self, target, data);
    }

    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) {
        ResultWriter::start_prefix_mapping(self, prefix, uri);
    }

    fn end_prefix_mapping(&mut self, prefix: Option<&str>) {
        ResultWriter::end_prefix_mapping(self, prefix);
    }

    fn set_escaping(&mut self, enabled: bool) {
        self.toggle_escaping(enabled);
    }
}
