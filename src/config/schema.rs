//! Structural schema for configuration documents
//!
//! The schema is a JSON document describing, for each element type, the
//! attributes it accepts (with a value type and a required flag) and the
//! child element types it may contain with occurrence bounds. Validation
//! walks the parsed element tree and stops at the first violation.

use super::document::{ConfigDocument, Element};
use crate::error::{EngineError, IoResultExt, Result};
use crate::model::CpuSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Value type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttributeType {
    /// Any string
    String,
    /// Signed integer
    Integer,
    /// `true`/`false` (any case) or `1`/`0`
    Boolean,
    /// Comma-separated list of unique non-negative core indices, may be empty
    CpuList,
}

impl AttributeType {
    /// Check a raw attribute value against this type
    pub fn check(&self, value: &str) -> std::result::Result<(), String> {
        match self {
            Self::String => Ok(()),
            Self::Integer => value
                .trim()
                .parse::<i64>()
                .map(|_| ())
                .map_err(|_| format!("'{}' is not an integer", value)),
            Self::Boolean => parse_bool(value)
                .map(|_| ())
                .ok_or_else(|| format!("'{}' is not a boolean", value)),
            Self::CpuList => CpuSet::parse_list(value).map(|_| ()),
        }
    }
}

/// Parse a boolean attribute value
pub fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") || value == "1" {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") || value == "0" {
        Some(false)
    } else {
        None
    }
}

/// Constraint on one attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeRule {
    /// Value type
    #[serde(rename = "type")]
    pub kind: AttributeType,
    /// Whether the attribute must be present
    #[serde(default)]
    pub required: bool,
}

/// Allowed child element with occurrence bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChildRule {
    /// Element type name
    pub element: String,
    /// Minimum occurrences
    #[serde(default)]
    pub min_occurs: usize,
    /// Maximum occurrences, unbounded if absent
    #[serde(default)]
    pub max_occurs: Option<usize>,
}

/// Constraints on one element type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElementRule {
    /// Accepted attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeRule>,
    /// Accepted child elements
    #[serde(default)]
    pub children: Vec<ChildRule>,
}

/// A compiled schema
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schema {
    /// Name of the root element
    pub root: String,
    /// Element type definitions
    pub elements: BTreeMap<String, ElementRule>,
}

impl Schema {
    /// Read, parse and compile a schema document
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_path(path)?;
        Self::parse(&text)
    }

    /// Parse and compile schema text
    pub fn parse(text: &str) -> Result<Self> {
        let schema: Schema = serde_json::from_str(text)
            .map_err(|e| EngineError::Schema(format!("invalid schema document: {}", e)))?;
        schema.compile()?;
        Ok(schema)
    }

    /// Check the schema is self-consistent
    fn compile(&self) -> Result<()> {
        if !self.elements.contains_key(&self.root) {
            return Err(EngineError::Schema(format!(
                "root element '{}' is not defined",
                self.root
            )));
        }

        for (name, rule) in &self.elements {
            for child in &rule.children {
                if !self.elements.contains_key(&child.element) {
                    return Err(EngineError::Schema(format!(
                        "element '{}' references undefined child '{}'",
                        name, child.element
                    )));
                }
                if let Some(max) = child.max_occurs {
                    if max == 0 || max < child.min_occurs {
                        return Err(EngineError::Schema(format!(
                            "element '{}' has invalid bounds for child '{}'",
                            name, child.element
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Validate a parsed document against this schema
    pub fn validate(&self, document: &ConfigDocument) -> Result<()> {
        let root = document.root();
        if root.name != self.root {
            return Err(EngineError::Schema(format!(
                "expected root element '{}', found '{}'",
                self.root, root.name
            )));
        }
        self.validate_element(root, &root.name)
    }

    fn validate_element(&self, element: &Element, location: &str) -> Result<()> {
        let rule = self.elements.get(&element.name).ok_or_else(|| {
            EngineError::Schema(format!("{}: element type is not defined", location))
        })?;

        for (key, value) in &element.attributes {
            let attr_rule = rule.attributes.get(key).ok_or_else(|| {
                EngineError::Schema(format!("{}: unexpected attribute '{}'", location, key))
            })?;
            attr_rule.kind.check(value).map_err(|e| {
                EngineError::Schema(format!("{}: attribute '{}': {}", location, key, e))
            })?;
        }

        for (key, attr_rule) in &rule.attributes {
            if attr_rule.required && element.attribute(key).is_none() {
                return Err(EngineError::Schema(format!(
                    "{}: missing required attribute '{}'",
                    location, key
                )));
            }
        }

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for child in &element.children {
            if !rule.children.iter().any(|c| c.element == child.name) {
                return Err(EngineError::Schema(format!(
                    "{}: unexpected child element '{}'",
                    location, child.name
                )));
            }
            let index = counts.entry(child.name.as_str()).or_insert(0);
            let child_location = format!("{}/{}[{}]", location, child.name, index);
            *index += 1;
            self.validate_element(child, &child_location)?;
        }

        for child_rule in &rule.children {
            let count = counts.get(child_rule.element.as_str()).copied().unwrap_or(0);
            if count < child_rule.min_occurs {
                return Err(EngineError::Schema(format!(
                    "{}: expected at least {} '{}' element(s), found {}",
                    location, child_rule.min_occurs, child_rule.element, count
                )));
            }
            if let Some(max) = child_rule.max_occurs {
                if count > max {
                    return Err(EngineError::Schema(format!(
                        "{}: expected at most {} '{}' element(s), found {}",
                        location, max, child_rule.element, count
                    )));
                }
            }
        }

        Ok(())
    }
}
