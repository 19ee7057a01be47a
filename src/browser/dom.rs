//! Structural DOM snapshot returned by the page renderer.
//!
//! The renderer serializes only the content containers of a page into this
//! tree; adapters extract observations from it by structural markers rather
//! than by re-querying a live page.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomNode {
    pub tag: String,
    /// `data-testid` marker, when present.
    #[serde(default)]
    pub test_id: Option<String>,
    /// Retained attributes: href, datetime, aria-label, role.
    #[serde(default)]
    pub attrs: HashMap<String, String>,
    /// Direct text content of this node, trimmed.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub children: Vec<DomNode>,
}

impl DomNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Depth-first search for every descendant (including self) carrying the
    /// given `data-testid` marker.
    pub fn find_all<'a>(&'a self, test_id: &str) -> Vec<&'a DomNode> {
        let mut out = Vec::new();
        self.collect(test_id, &mut out);
        out
    }

    pub fn find<'a>(&'a self, test_id: &str) -> Option<&'a DomNode> {
        self.find_all(test_id).into_iter().next()
    }

    fn collect<'a>(&'a self, test_id: &str, out: &mut Vec<&'a DomNode>) {
        if self.test_id.as_deref() == Some(test_id) {
            out.push(self);
        }
        for child in &self.children {
            child.collect(test_id, out);
        }
    }

    /// First descendant (including self) with the given tag name.
    pub fn find_tag<'a>(&'a self, tag: &str) -> Option<&'a DomNode> {
        if self.tag == tag {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_tag(tag))
    }

    /// First descendant link whose href contains the given fragment.
    pub fn find_link<'a>(&'a self, href_fragment: &str) -> Option<&'a DomNode> {
        if self.tag == "a" {
            if let Some(href) = self.attr("href") {
                if href.contains(href_fragment) {
                    return Some(self);
                }
            }
        }
        self.children.iter().find_map(|c| c.find_link(href_fragment))
    }

    /// Concatenated text of this node and all descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            if !out.is_empty() && !out.ends_with(' ') {
                out.push(' ');
            }
            out.push_str(text);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }
}

/// Snapshot of the content-bearing portion of one rendered page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomSnapshot {
    pub root: DomNode,
}

impl DomSnapshot {
    pub fn empty() -> Self {
        Self {
            root: DomNode {
                tag: "root".to_string(),
                test_id: None,
                attrs: HashMap::new(),
                text: None,
                children: Vec::new(),
            },
        }
    }

    pub fn find_all<'a>(&'a self, test_id: &str) -> Vec<&'a DomNode> {
        self.root.find_all(test_id)
    }
}
