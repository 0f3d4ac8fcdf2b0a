// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! JSON documents and terminal settings.
//!
//! Terminal settings are patched through [`serde_json::Value`] with key order
//! preserved, so that a rewritten file keeps the layout the terminal itself
//! produced. Only keys under `profiles.defaults` are ever touched.
//!
//! Terminal settings are JSON with comments. Comments and trailing commas are
//! dropped while parsing. A file that already holds the enforced values is
//! never rewritten, so its comments survive until a change is needed.

use crate::patch::{Document, DocumentError};

use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Map, Serializer, Value};

/// JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonDocument(pub Value);

impl JsonDocument {
    /// Lookup value by JSON pointer.
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.0.pointer(pointer)
    }
}

impl Document for JsonDocument {
    fn parse(content: &str) -> Result<Self, DocumentError> {
        if content.trim().is_empty() {
            return Ok(Self(Value::Object(Map::new())));
        }

        Ok(Self(serde_json::from_str(&strip_jsonc(content))?))
    }

    fn render(&self) -> String {
        let mut buffer = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = Serializer::with_formatter(&mut buffer, formatter);

        // INVARIANT: Serializing a Value into memory cannot fail.
        if self.0.serialize(&mut serializer).is_err() {
            return self.0.to_string();
        }

        let mut rendered = String::from_utf8_lossy(&buffer).into_owned();
        rendered.push('\n');
        rendered
    }
}

/// Default profile values to enforce in terminal settings.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TerminalDefaults {
    /// Value for `profiles.defaults.font.face`.
    pub font_face: String,

    /// Value for `profiles.defaults.padding`.
    pub padding: Option<String>,

    /// Value for `profiles.defaults.scrollbarState`.
    pub scrollbar_state: Option<String>,
}

impl TerminalDefaults {
    /// Enforce default profile values.
    ///
    /// Each key is set only when absent or different. Missing `profiles`,
    /// `profiles.defaults`, and `font` objects are created on the way.
    ///
    /// # Errors
    ///
    /// - Return [`DocumentError::Shape`] if any object on the way is some
    ///   other kind of value, e.g., the legacy array form of `profiles`.
    pub fn apply(&self, document: JsonDocument) -> Result<JsonDocument, DocumentError> {
        let JsonDocument(mut root) = document;

        let root_map = as_object(&mut root, "document root")?;
        let profiles = child_object(root_map, "profiles")?;
        let defaults = child_object(profiles, "defaults")?;

        let font = child_object(defaults, "font")?;
        set_string(font, "face", &self.font_face);

        if let Some(padding) = &self.padding {
            set_string(defaults, "padding", padding);
        }

        if let Some(state) = &self.scrollbar_state {
            set_string(defaults, "scrollbarState", state);
        }

        Ok(JsonDocument(root))
    }
}

/// Strip comments and trailing commas from JSON with comments.
///
/// String literals are copied verbatim, so `//` inside a URL is kept. Line
/// comments keep their newline so parse errors still point at the right line.
fn strip_jsonc(content: &str) -> String {
    let mut output = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(ch) = chars.next() {
        if in_string {
            output.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                output.push(ch);
            }
            '/' if chars.peek() == Some(&'/') => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut last = '\0';
                for next in chars.by_ref() {
                    if last == '*' && next == '/' {
                        break;
                    }
                    if next == '\n' {
                        output.push(next);
                    }
                    last = next;
                }
            }
            '}' | ']' => {
                let end = output.trim_end().len();
                if output[..end].ends_with(',') {
                    output.remove(end - 1);
                }
                output.push(ch);
            }
            _ => output.push(ch),
        }
    }

    output
}

fn as_object<'a>(value: &'a mut Value, name: &str) -> Result<&'a mut Map<String, Value>, DocumentError> {
    value
        .as_object_mut()
        .ok_or_else(|| DocumentError::Shape(format!("{name} is not an object")))
}

fn child_object<'a>(
    parent: &'a mut Map<String, Value>,
    key: &str,
) -> Result<&'a mut Map<String, Value>, DocumentError> {
    let child = parent
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    as_object(child, &format!("`{key}`"))
}

fn set_string(map: &mut Map<String, Value>, key: &str, value: &str) {
    if map.get(key).and_then(Value::as_str) != Some(value) {
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn defaults() -> TerminalDefaults {
        TerminalDefaults {
            font_face: "JetBrainsMono Nerd Font".into(),
            padding: Some("8".into()),
            scrollbar_state: Some("hidden".into()),
        }
    }

    #[test]
    fn missing_font_is_added() -> anyhow::Result<()> {
        let doc = JsonDocument::parse(r#"{"profiles": {"defaults": {}, "list": []}}"#)?;
        let result = defaults().apply(doc)?;

        assert_eq!(
            result.pointer("/profiles/defaults/font/face"),
            Some(&json!("JetBrainsMono Nerd Font"))
        );
        assert_eq!(result.pointer("/profiles/defaults/padding"), Some(&json!("8")));
        assert_eq!(
            result.pointer("/profiles/defaults/scrollbarState"),
            Some(&json!("hidden"))
        );
        assert_eq!(result.pointer("/profiles/list"), Some(&json!([])));

        Ok(())
    }

    #[test]
    fn different_face_is_overwritten() -> anyhow::Result<()> {
        let doc = JsonDocument(json!({
            "profiles": {"defaults": {"font": {"face": "Consolas", "size": 11}}}
        }));
        let result = defaults().apply(doc)?;

        assert_eq!(
            result.pointer("/profiles/defaults/font"),
            Some(&json!({"face": "JetBrainsMono Nerd Font", "size": 11}))
        );

        Ok(())
    }

    #[test]
    fn matching_document_is_unchanged() -> anyhow::Result<()> {
        let doc = JsonDocument(json!({
            "profiles": {
                "defaults": {
                    "font": {"face": "JetBrainsMono Nerd Font"},
                    "padding": "8",
                    "scrollbarState": "hidden"
                }
            }
        }));
        let result = defaults().apply(doc.clone())?;
        assert_eq!(result, doc);

        Ok(())
    }

    #[test]
    fn legacy_profile_array_is_rejected() -> anyhow::Result<()> {
        let doc = JsonDocument::parse(r#"{"profiles": [{"name": "cmd"}]}"#)?;
        let result = defaults().apply(doc);
        assert!(matches!(result, Err(DocumentError::Shape(_))));

        Ok(())
    }

    #[test]
    fn commented_settings_are_parsed() -> anyhow::Result<()> {
        let doc = JsonDocument::parse(indoc! {r#"
            // This file was initially generated by Windows Terminal.
            {
                "$schema": "https://aka.ms/terminal-profiles-schema",
                /* Defaults apply to every profile. */
                "profiles": {
                    "defaults": {
                        "font": {"face": "Consolas"}, // old face
                    },
                    "list": [
                        {"name": "cmd", "commandline": "cmd.exe /k \"echo //\""},
                    ],
                },
            }
        "#})?;
        let result = defaults().apply(doc)?;

        assert_eq!(
            result.pointer("/$schema"),
            Some(&json!("https://aka.ms/terminal-profiles-schema"))
        );
        assert_eq!(
            result.pointer("/profiles/defaults/font/face"),
            Some(&json!("JetBrainsMono Nerd Font"))
        );
        assert_eq!(
            result.pointer("/profiles/list/0/commandline"),
            Some(&json!("cmd.exe /k \"echo //\""))
        );

        Ok(())
    }

    #[test]
    fn commented_settings_already_matching_are_unchanged() -> anyhow::Result<()> {
        let doc = JsonDocument::parse(indoc! {r#"
            {
                "profiles": {
                    "defaults": {
                        // Keep in sync with the installed font.
                        "font": {"face": "JetBrainsMono Nerd Font"},
                        "padding": "8",
                        "scrollbarState": "hidden",
                    },
                },
            }
        "#})?;
        let result = defaults().apply(doc.clone())?;
        assert_eq!(result, doc);

        Ok(())
    }

    #[test]
    fn render_keeps_key_order() -> anyhow::Result<()> {
        let doc = JsonDocument::parse(r#"{"theme": "dark", "actions": [], "profiles": {}}"#)?;
        let result = TerminalDefaults {
            font_face: "Iosevka".into(),
            ..TerminalDefaults::default()
        }
        .apply(doc)?
        .render();

        let expect = indoc! {r#"
            {
                "theme": "dark",
                "actions": [],
                "profiles": {
                    "defaults": {
                        "font": {
                            "face": "Iosevka"
                        }
                    }
                }
            }
        "#};
        assert_eq!(result, expect);

        Ok(())
    }
}
