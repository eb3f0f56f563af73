//! Minimal element tree for the XML configuration document
//!
//! The configuration only uses elements and attributes, so the tree keeps
//! exactly that: names, attributes in document order, and child elements.
//! Character data between elements is ignored.

use crate::error::{EngineError, IoResultExt, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::path::{Path, PathBuf};

/// One XML element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Tag name
    pub name: String,
    /// Attributes in document order
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order
    pub children: Vec<Element>,
}

impl Element {
    /// Create an element with no attributes or children
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Look up an attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Direct children with the given tag name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First element with the given name in depth-first document order,
    /// including `self`
    pub fn find_first(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_first(name))
    }

    fn from_start(start: &BytesStart<'_>, path: &Path) -> Result<Self> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| EngineError::xml(path, e))?
            .to_string();

        let mut element = Element::new(name);
        for attr in start.attributes() {
            let attr = attr.map_err(|e| EngineError::xml(path, e))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| EngineError::xml(path, e))?
                .to_string();
            let value = attr
                .unescape_value()
                .map_err(|e| EngineError::xml(path, e))?
                .into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }
}

/// A parsed configuration document
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    path: PathBuf,
    root: Element,
}

impl ConfigDocument {
    /// Read and parse a document from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_path(path)?;
        Self::parse(path, &text)
    }

    /// Parse document text; `path` is only used in error messages
    pub fn parse(path: impl AsRef<Path>, text: &str) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    let position = reader.buffer_position();
                    return Err(EngineError::xml(path, format!("{} at byte {}", e, position)));
                }
            };

            match event {
                Event::Start(start) => {
                    stack.push(Element::from_start(&start, path)?);
                }
                Event::Empty(start) => {
                    let element = Element::from_start(&start, path)?;
                    Self::attach(&mut stack, &mut root, element, path)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| EngineError::xml(path, "unexpected closing tag"))?;
                    Self::attach(&mut stack, &mut root, element, path)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(EngineError::xml(path, "document ended inside an element"));
        }

        let root = root.ok_or_else(|| EngineError::xml(path, "document has no root element"))?;

        Ok(Self {
            path: path.to_path_buf(),
            root,
        })
    }

    fn attach(
        stack: &mut [Element],
        root: &mut Option<Element>,
        element: Element,
        path: &Path,
    ) -> Result<()> {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(element);
        } else if root.is_none() {
            *root = Some(element);
        } else {
            return Err(EngineError::xml(path, "multiple root elements"));
        }
        Ok(())
    }

    /// Path the document was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Root element
    pub fn root(&self) -> &Element {
        &self.root
    }
}
