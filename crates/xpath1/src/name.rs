//! Owned qualified names and the lexical checks used for computed names.

use std::fmt;
use std::hash::{Hash, Hasher};

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// A qualified name with its resolved namespace.
///
/// Identity is the expanded name: two names are equal when their namespace URIs
/// and local parts are equal, regardless of the prefix used to write them.
#[derive(Debug, Clone, Eq)]
pub struct QualifiedName {
    pub prefix: Option<String>,
    pub local_part: String,
    pub namespace_uri: Option<String>,
}

impl QualifiedName {
    pub fn new(
        prefix: Option<&str>,
        local_part: impl Into<String>,
        namespace_uri: Option<&str>,
    ) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            local_part: local_part.into(),
            namespace_uri: namespace_uri.map(str::to_string),
        }
    }

    /// A name in no namespace.
    pub fn local(local_part: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local_part: local_part.into(),
            namespace_uri: None,
        }
    }

    /// Splits a lexical QName into prefix and local part without resolving it.
    /// Returns `None` when the text is not a syntactically valid QName.
    pub fn parse_lexical(text: &str) -> Option<Self> {
        if !is_qname(text) {
            return None;
        }
        Some(match text.split_once(':') {
            Some((prefix, local)) => Self {
                prefix: Some(prefix.to_string()),
                local_part: local.to_string(),
                namespace_uri: None,
            },
            None => Self::local(text),
        })
    }

    /// Resolves the prefix through `lookup`. Unprefixed names stay in no namespace,
    /// matching XPath 1.0 rules for names in expressions and patterns.
    pub fn resolve<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(prefix) = &self.prefix {
            if prefix == "xml" {
                self.namespace_uri = Some(XML_NAMESPACE.to_string());
                return Ok(());
            }
            match lookup(prefix) {
                Some(uri) => self.namespace_uri = Some(uri),
                None => return Err(prefix.clone()),
            }
        }
        Ok(())
    }

    pub fn is_resolved(&self) -> bool {
        self.prefix.is_none() || self.namespace_uri.is_some()
    }

    pub fn matches(&self, namespace_uri: Option<&str>, local_part: &str) -> bool {
        self.local_part == local_part && self.namespace_uri.as_deref() == namespace_uri
    }
}

impl PartialEq for QualifiedName {
    fn eq(&self, other: &Self) -> bool {
        self.local_part == other.local_part && self.namespace_uri == other.namespace_uri
    }
}

impl Hash for QualifiedName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace_uri.hash(state);
        self.local_part.hash(state);
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.local_part),
            None => f.write_str(&self.local_part),
        }
    }
}

fn is_name_start_char(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}')
}

/// True if `text` is an XML NCName (a name without a colon).
pub fn is_ncname(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if is_name_start_char(first) => chars.all(is_name_char),
        _ => false,
    }
}

/// True if `text` is `NCName` or `NCName:NCName`.
pub fn is_qname(text: &str) -> bool {
    match text.split_once(':') {
        Some((prefix, local)) => is_ncname(prefix) && is_ncname(local),
        None => is_ncname(text),
    }
}
