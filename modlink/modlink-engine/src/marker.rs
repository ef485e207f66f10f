//! Declaration marker parsing.

use modlink_core::error::{ModlinkError, Result};
use regex::Regex;

/// Matches the single-line comment through which a file claims a module name.
///
/// The line starts with optional whitespace and an optional comment opener
/// (`//`, `/*`, `/**` or a block continuation `*`), then the marker keyword and
/// exactly one whitespace-delimited token. A trailing `*/` is tolerated.
#[derive(Debug, Clone)]
pub struct DeclarationMarker {
    pattern: Regex,
}

impl DeclarationMarker {
    pub fn new(keyword: &str) -> Result<Self> {
        let pattern = format!(
            r"(?m)^[ \t]*(?:/\*+|\*|//)?[ \t]*{}[ \t]+(\S+?)[ \t]*(?:\*/)?[ \t]*\r?$",
            regex::escape(keyword)
        );
        let pattern = Regex::new(&pattern)
            .map_err(|e| ModlinkError::config(format!("Invalid marker '{}': {}", keyword, e)))?;

        Ok(Self { pattern })
    }

    /// The token of the first marker line in `contents`, if any.
    pub fn find<'a>(&self, contents: &'a str) -> Option<&'a str> {
        self.pattern
            .captures(contents)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}
