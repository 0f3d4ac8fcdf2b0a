// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Line-oriented documents.
//!
//! Shell profiles and environment files are treated as ordered lists of
//! lines. Line endings of the original file are kept, so a CRLF profile stays
//! CRLF after an edit. A leading byte order mark is kept aside and written
//! back, never treated as part of the first line.

use crate::patch::{Document, DocumentError};

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Ordered listing of lines.
///
/// # Invariant
///
/// - Lines never contain line terminators.
/// - Existing lines are never reordered or rewritten by [`Self::ensure_line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDocument {
    lines: Vec<String>,
    bom: bool,
    crlf: bool,
    trailing_newline: bool,
}

const BOM: char = '\u{feff}';

impl Default for LineDocument {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            bom: false,
            crlf: false,
            trailing_newline: true,
        }
    }
}

impl LineDocument {
    /// Count lines equivalent to target line.
    ///
    /// Lines are equivalent when they match after surrounding whitespace is
    /// trimmed.
    pub fn count(&self, line: &str) -> usize {
        let target = line.trim();
        self.lines
            .iter()
            .filter(|existing| existing.trim() == target)
            .count()
    }

    /// Check if an equivalent line is present.
    pub fn contains(&self, line: &str) -> bool {
        self.count(line) > 0
    }

    /// Append line unless an equivalent one is already present.
    pub fn ensure_line(mut self, line: impl AsRef<str>) -> Self {
        let line = line.as_ref();
        if !self.contains(line) {
            self.lines.push(line.trim_end().to_string());
            self.trailing_newline = true;
        }

        self
    }

    /// Lookup value of a `KEY=value` line.
    pub fn get_key(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| {
            line.trim_start()
                .strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }

    /// Set value of a `KEY=value` line, appending the line if needed.
    ///
    /// Only the first matching line is replaced.
    pub fn set_key(mut self, key: &str, value: &str) -> Self {
        let rendered = format!("{key}={value}");
        let position = self.lines.iter().position(|line| {
            line.trim_start()
                .strip_prefix(key)
                .is_some_and(|rest| rest.starts_with('='))
        });

        match position {
            Some(index) if self.lines[index] == rendered => {}
            Some(index) => self.lines[index] = rendered,
            None => {
                self.lines.push(rendered);
                self.trailing_newline = true;
            }
        }

        self
    }
}

impl Document for LineDocument {
    fn parse(content: &str) -> Result<Self, DocumentError> {
        Ok(Self::from(content))
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

impl Display for LineDocument {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        if self.bom {
            write!(fmt, "{BOM}")?;
        }

        if self.lines.is_empty() {
            return Ok(());
        }

        let ending = if self.crlf { "\r\n" } else { "\n" };
        fmt.write_str(&self.lines.join(ending))?;
        if self.trailing_newline {
            fmt.write_str(ending)?;
        }

        Ok(())
    }
}

impl From<&str> for LineDocument {
    fn from(content: &str) -> Self {
        let (bom, content) = match content.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, content),
        };

        if content.is_empty() {
            return Self {
                bom,
                ..Self::default()
            };
        }

        Self {
            lines: content.lines().map(str::to_owned).collect(),
            bom,
            crlf: content.contains("\r\n"),
            trailing_newline: content.ends_with('\n'),
        }
    }
}

impl From<String> for LineDocument {
    fn from(content: String) -> Self {
        Self::from(content.as_str())
    }
}
