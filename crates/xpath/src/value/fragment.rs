//! Result tree fragments: a recorded sequence of construction events that can be replayed.
use crate::datasource::ExpandedName;
use crate::error::Result;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentAttribute {
    pub name: ExpandedName,
    pub display_name: String,
    pub value: String,
}

/// One recorded construction event. Adjacent character events are merged when recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentEvent {
    StartElement {
        name: ExpandedName,
        display_name: String,
        attributes: Vec<FragmentAttribute>,
    },
    EndElement {
        name: ExpandedName,
    },
    Namespace {
        prefix: String,
        uri: String,
    },
    Characters(String),
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
    Escaping(bool),
}

/// Receives replayed fragment events.
pub trait FragmentHandler {
    fn start_element(
        &mut self,
        name: &ExpandedName,
        display_name: &str,
        attributes: &[FragmentAttribute],
    ) -> Result<()>;
    fn end_element(&mut self, name: &ExpandedName) -> Result<()>;
    fn namespace(&mut self, prefix: &str, uri: &str) -> Result<()>;
    fn characters(&mut self, text: &str) -> Result<()>;
    fn comment(&mut self, text: &str) -> Result<()>;
    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()>;
    fn set_escaping(&mut self, _enabled: bool) -> Result<()> {
        Ok(())
    }
}

/// An immutable fragment value. Its string value is the concatenation of all recorded
/// character data; as a boolean it is always true.
#[derive(Debug, Clone)]
pub struct FragmentValue {
    events: Arc<[FragmentEvent]>,
    text: Arc<str>,
}

impl PartialEq for FragmentValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.events, &other.events) || self.events == other.events
    }
}

impl FragmentValue {
    pub fn builder() -> FragmentBuilder {
        FragmentBuilder::default()
    }

    /// A fragment holding a single text node.
    pub fn from_text(text: &str) -> Self {
        let mut builder = FragmentBuilder::default();
        builder.push_characters(text);
        builder.build()
    }

    pub fn events(&self) -> &[FragmentEvent] {
        &self.events
    }

    pub fn string_value(&self) -> &str {
        &self.text
    }

    pub fn replay(&self, handler: &mut dyn FragmentHandler) -> Result<()> {
        for event in self.events.iter() {
            match event {
                FragmentEvent::StartElement {
                    name,
                    display_name,
                    attributes,
                } => handler.start_element(name, display_name, attributes)?,
                FragmentEvent::EndElement { name } => handler.end_element(name)?,
                FragmentEvent::Namespace { prefix, uri } => handler.namespace(prefix, uri)?,
                FragmentEvent::Characters(text) => handler.characters(text)?,
                FragmentEvent::Comment(text) => handler.comment(text)?,
                FragmentEvent::ProcessingInstruction { target, data } => {
                    handler.processing_instruction(target, data)?
                }
                FragmentEvent::Escaping(enabled) => handler.set_escaping(*enabled)?,
            }
        }
        Ok(())
    }
}

/// Records events into a [`FragmentValue`].
#[derive(Debug, Default)]
pub struct FragmentBuilder {
    events: Vec<FragmentEvent>,
    text: String,
}

impl FragmentBuilder {
    fn push_characters(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.text.push_str(text);
        if let Some(FragmentEvent::Characters(previous)) = self.events.last_mut() {
            previous.push_str(text);
        } else {
            self.events.push(FragmentEvent::Characters(text.to_string()));
        }
    }

    pub fn start_element(mut self, name: ExpandedName, display_name: &str) -> Self {
        self.events.push(FragmentEvent::StartElement {
            name,
            display_name: display_name.to_string(),
            attributes: Vec::new(),
        });
        self
    }

    /// Adds an attribute to the most recently started element.
    pub fn attribute(mut self, name: ExpandedName, display_name: &str, value: &str) -> Self {
        let attribute = FragmentAttribute {
            name,
            display_name: display_name.to_string(),
            value: value.to_string(),
        };
        if let Some(FragmentEvent::StartElement { attributes, .. }) = self
            .events
            .iter_mut()
            .rev()
            .find(|e| matches!(e, FragmentEvent::StartElement { .. }))
        {
            attributes.push(attribute);
        }
        self
    }

    pub fn end_element(mut self, name: ExpandedName) -> Self {
        self.events.push(FragmentEvent::EndElement { name });
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.push_characters(text);
        self
    }

    pub fn comment(mut self, text: &str) -> Self {
        self.events.push(FragmentEvent::Comment(text.to_string()));
        self
    }

    pub fn processing_instruction(mut self, target: &str, data: &str) -> Self {
        self.events.push(FragmentEvent::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        });
        self
    }

    pub fn build(self) -> FragmentValue {
        FragmentValue {
            events: self.events.into(),
            text: self.text.into(),
        }
    }
}

impl FragmentHandler for FragmentBuilder {
    fn start_element(
        &mut self,
        name: &ExpandedName,
        display_name: &str,
        attributes: &[FragmentAttribute],
    ) -> Result<()> {
        self.events.push(FragmentEvent::StartElement {
            name: name.clone(),
            display_name: display_name.to_string(),
            attributes: attributes.to_vec(),
        });
        Ok(())
    }

    fn end_element(&mut self, name: &ExpandedName) -> Result<()> {
        self.events.push(FragmentEvent::EndElement { name: name.clone() });
        Ok(())
    }

    fn namespace(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.events.push(FragmentEvent::Namespace {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        });
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.push_characters(text);
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.events.push(FragmentEvent::Comment(text.to_string()));
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.events.push(FragmentEvent::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        });
        Ok(())
    }

    fn set_escaping(&mut self, enabled: bool) -> Result<()> {
        self.events.push(FragmentEvent::Escaping(enabled));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FragmentValue {
        FragmentValue::builder()
            .start_element(ExpandedName::local("item"), "item")
            .attribute(ExpandedName::local("n"), "n", "1")
            .text("Hello, ")
            .text("World")
            .comment("not text")
            .end_element(ExpandedName::local("item"))
            .build()
    }

    #[test]
    fn test_string_value_concatenates_characters() {
        let fragment = sample();
        assert_eq!(fragment.string_value(), "Hello, World");
        let characters = fragment
            .events()
            .iter()
            .filter(|e| matches!(e, FragmentEvent::Characters(_)))
            .count();
        assert_eq!(characters, 1);
    }

    #[test]
    fn test_replay_copies_events() {
        let fragment = sample();
        let mut copy = FragmentBuilder::default();
        fragment.replay(&mut copy).unwrap();
        let copy = copy.build();
        assert_eq!(copy, fragment);
        assert_eq!(copy.string_value(), "Hello, World");
    }
}
