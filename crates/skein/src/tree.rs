//! Tagged-tree persistence.
//!
//! Every component serializes to a [`TreeNode`] and parses back from one, so
//! component code never touches a concrete document API. The text rendering
//! is an indented tagged format with one element per line for branches and
//! `<Name>value</Name>` for leaves.

use crate::{Error, Result};
use core::fmt::Display;
use core::str::FromStr;

/// One element of a persistence tree: a name, an optional scalar value, and
/// child elements. Leaves carry a value; branches carry children.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    name: String,
    value: Option<String>,
    children: Vec<TreeNode>,
}

impl TreeNode {
    /// New branch element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            children: Vec::new(),
        }
    }

    /// New leaf element with a display-formatted value.
    pub fn leaf(name: impl Into<String>, value: impl Display) -> Self {
        Self {
            name: name.into(),
            value: Some(value.to_string()),
            children: Vec::new(),
        }
    }

    /// Leaf holding a float in shortest round-trip form.
    pub fn float_leaf(name: impl Into<String>, value: f64) -> Self {
        Self::leaf(name, format!("{value:?}"))
    }

    /// Leaf holding a space-separated list of floats, round-trip exact.
    pub fn float_list_leaf(name: impl Into<String>, values: &[f64]) -> Self {
        let joined = values
            .iter()
            .map(|v| format!("{v:?}"))
            .collect::<Vec<_>>()
            .join(" ");
        Self::leaf(name, joined)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn children(&self) -> &[TreeNode] {
        &self.children
    }

    /// Append a child element.
    pub fn push(&mut self, child: TreeNode) {
        self.children.push(child);
    }

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&TreeNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Required child; missing children are a configuration error.
    pub fn require(&self, name: &str) -> Result<&TreeNode> {
        self.child(name).ok_or_else(|| {
            Error::InvalidConfiguration(format!("missing element {name} in {}", self.name))
        })
    }

    /// Required child value parsed as `T`.
    pub fn parse_child<T: FromStr>(&self, name: &str) -> Result<T> {
        let node = self.require(name)?;
        let text = node.value().ok_or_else(|| {
            Error::InvalidConfiguration(format!("element {name} has no value"))
        })?;
        text.trim().parse().map_err(|_| {
            Error::InvalidConfiguration(format!("element {name}: cannot parse {text:?}"))
        })
    }

    /// Required child value parsed as a space-separated float list.
    pub fn parse_float_list(&self, name: &str) -> Result<Vec<f64>> {
        let node = self.require(name)?;
        let text = node.value().unwrap_or("");
        text.split_whitespace()
            .map(|t| {
                t.parse().map_err(|_| {
                    Error::InvalidConfiguration(format!("element {name}: bad float {t:?}"))
                })
            })
            .collect()
    }

    /// Render the tree as indented tagged text.
    pub fn write(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out, 0);
        out
    }

    fn write_into(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("    ");
        }
        if self.children.is_empty() {
            let value = self.value.as_deref().unwrap_or("");
            out.push_str(&format!("<{0}>{1}</{0}>\n", self.name, value));
        } else {
            out.push_str(&format!("<{}>\n", self.name));
            for child in &self.children {
                child.write_into(out, depth + 1);
            }
            for _ in 0..depth {
                out.push_str("    ");
            }
            out.push_str(&format!("</{}>\n", self.name));
        }
    }

    /// Parse tagged text back into a tree. Inverse of [`write`](Self::write).
    pub fn parse(text: &str) -> Result<TreeNode> {
        let mut parser = Parser {
            text: text.as_bytes(),
            pos: 0,
        };
        let node = parser.element()?;
        parser.skip_whitespace();
        if parser.pos != parser.text.len() {
            return Err(Error::InvalidConfiguration(
                "trailing content after document element".into(),
            ));
        }
        Ok(node)
    }
}

struct Parser<'a> {
    text: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn skip_whitespace(&mut self) {
        while self.pos < self.text.len() && self.text[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn bad(&self, msg: &str) -> Error {
        Error::InvalidConfiguration(format!("parse error at byte {}: {msg}", self.pos))
    }

    fn expect(&mut self, b: u8) -> Result<()> {
        if self.pos < self.text.len() && self.text[self.pos] == b {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.bad(&format!("expected {:?}", b as char)))
        }
    }

    fn tag_name(&mut self) -> Result<String> {
        let start = self.pos;
        while self.pos < self.text.len() && self.text[self.pos] != b'>' {
            self.pos += 1;
        }
        if self.pos == self.text.len() {
            return Err(self.bad("unterminated tag"));
        }
        let name = core::str::from_utf8(&self.text[start..self.pos])
            .map_err(|_| self.bad("tag name is not utf-8"))?
            .to_string();
        self.pos += 1; // consume '>'
        if name.is_empty() {
            return Err(self.bad("empty tag name"));
        }
        Ok(name)
    }

    fn element(&mut self) -> Result<TreeNode> {
        self.skip_whitespace();
        self.expect(b'<')?;
        let name = self.tag_name()?;

        // Leaf: everything up to the next '<' is the value. Branch: child
        // elements until the matching close tag.
        let content_start = self.pos;
        let mut probe = self.pos;
        while probe < self.text.len() && self.text[probe] != b'<' {
            probe += 1;
        }
        if probe >= self.text.len() {
            return Err(self.bad(&format!("unterminated element {name}")));
        }

        if probe + 1 < self.text.len() && self.text[probe + 1] == b'/' {
            // Leaf element.
            let raw = core::str::from_utf8(&self.text[content_start..probe])
                .map_err(|_| self.bad("value is not utf-8"))?;
            let value = raw.trim().to_string();
            self.pos = probe;
            self.close_tag(&name)?;
            let mut node = TreeNode::new(name);
            if !value.is_empty() {
                node.value = Some(value);
            }
            Ok(node)
        } else {
            let mut node = TreeNode::new(name.clone());
            loop {
                self.skip_whitespace();
                if self.pos + 1 < self.text.len()
                    && self.text[self.pos] == b'<'
                    && self.text[self.pos + 1] == b'/'
                {
                    self.close_tag(&name)?;
                    return Ok(node);
                }
                node.push(self.element()?);
            }
        }
    }

    fn close_tag(&mut self, name: &str) -> Result<()> {
        self.skip_whitespace();
        self.expect(b'<')?;
        self.expect(b'/')?;
        let closing = self.tag_name()?;
        if closing != name {
            return Err(self.bad(&format!("expected </{name}>, found </{closing}>")));
        }
        Ok(())
    }
}
