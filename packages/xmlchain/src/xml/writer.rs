//! Writes mapped trees back to XML.
//!
//! Only what the tree retained is written: tag, attributes, trimmed text and
//! bound children in field order. Parsing the output again yields the same
//! retained tree.

use std::io::Write;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{ResolveError, Result};
use crate::mapping::{Mapped, Structural};

/// XML writer for mapped items.
pub struct TreeWriter<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> TreeWriter<W> {
    /// Compact output.
    pub fn new(inner: W) -> Self {
        Self {
            writer: Writer::new(inner),
        }
    }

    /// Output indented by two spaces per level.
    pub fn indented(inner: W) -> Self {
        Self {
            writer: Writer::new_with_indent(inner, b' ', 2),
        }
    }

    /// Write `item` and everything bound below it.
    pub fn write_item(&mut self, item: &dyn Mapped) -> Result<()> {
        let tag = item.tag();
        if tag.is_empty() {
            return Err(ResolveError::Serialization(
                "item has no element name; was it ever parsed?".to_string(),
            ));
        }

        let mut element = BytesStart::new(tag);
        for (name, value) in item.node().attributes() {
            element.push_attribute((name.as_str(), value.as_str()));
        }

        let children = item.children();
        let text = item.text();
        if children.is_empty() && text.is_none() {
            return self.write(Event::Empty(element));
        }

        self.write(Event::Start(element))?;
        if let Some(text) = text {
            self.write(Event::Text(BytesText::new(text)))?;
        }
        for child in children {
            self.write_item(&**child)?;
        }
        self.write(Event::End(BytesEnd::new(tag)))
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| ResolveError::Serialization(e.to_string()))
    }
}

/// Serialize `item` to a string.
///
/// # Errors
/// `Serialization` if the item was never populated by a parse pass.
pub fn to_xml(item: &dyn Mapped, indent: bool) -> Result<String> {
    let mut writer = if indent {
        TreeWriter::indented(Vec::new())
    } else {
        TreeWriter::new(Vec::new())
    };
    writer.write_item(item)?;
    String::from_utf8(writer.into_inner()).map_err(|e| ResolveError::Serialization(e.to_string()))
}
