//! Label and value formatting
//!
//! Everything that can be decided per member (labels, colors, precision) is
//! computed once into a [`ValueStyle`] when the profile is built. Reading a
//! value only appends to a reusable buffer.

use std::fmt::Write;

use crate::settings::{ColorSettings, FormatSettings};
use crate::value::{MonitorValue, Rgba};

/// Closing tag for rich text color markup
pub const COLOR_CLOSE: &str = "</color>";

/// Opening tag for rich text color markup
pub fn color_open(color: Rgba) -> String {
    format!("<color={}>", color.to_hex())
}

/// Wrap `text` in color markup when rich text is enabled
pub fn colorize(text: &str, color: Rgba, rich_text: bool) -> String {
    if rich_text {
        format!("{}{}{}", color_open(color), text, COLOR_CLOSE)
    } else {
        text.to_string()
    }
}

/// Turn a member identifier into a display label
///
/// Strips the first matching variable prefix, then splits on underscores and
/// case boundaries and capitalizes each word: `_playerHealth` becomes
/// `Player Health`, `m_maxHP` becomes `Max HP`.
pub fn humanize(name: &str, prefixes: &[String]) -> String {
    let mut stripped = name;
    for prefix in prefixes {
        if let Some(rest) = stripped.strip_prefix(prefix.as_str())
            && !rest.is_empty()
        {
            stripped = rest;
            break;
        }
    }

    let mut out = String::with_capacity(stripped.len() + 4);
    let mut prev: Option<char> = None;
    let mut chars = stripped.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '_' || c.is_whitespace() {
            if !out.is_empty() && !out.ends_with(' ') {
                out.push(' ');
            }
            prev = None;
            continue;
        }

        let boundary = match prev {
            Some(p) if c.is_uppercase() => {
                p.is_lowercase()
                    || p.is_ascii_digit()
                    || (p.is_uppercase() && chars.peek().is_some_and(|n| n.is_lowercase()))
            }
            _ => false,
        };
        if boundary {
            out.push(' ');
        }

        if out.is_empty() || out.ends_with(' ') {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        prev = Some(c);
    }

    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Strip module paths from a Rust type name
///
/// `core::option::Option<alloc::string::String>` becomes `Option<String>`.
pub fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment_start = 0;
    let mut chars = full.chars().peekable();

    while let Some(c) = chars.next() {
        if c == ':' && chars.peek() == Some(&':') {
            chars.next();
            out.truncate(segment_start);
        } else if c.is_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push(c);
            segment_start = out.len();
        }
    }
    out
}

/// Per-member formatting policy, precomputed at profile construction
#[derive(Debug, Clone, PartialEq)]
pub struct ValueStyle {
    /// Decimal places for floats and vector components
    pub precision: usize,
    /// Whether markup is emitted
    pub rich_text: bool,
    true_text: String,
    false_text: String,
    /// Colored `X:`/`Y:`/`Z:`/`W:` prefixes
    components: [String; 4],
}

impl ValueStyle {
    /// Build the style for one member
    ///
    /// `precision` overrides the global float precision when set.
    pub fn new(format: &FormatSettings, colors: &ColorSettings, precision: Option<usize>) -> Self {
        let rich_text = format.rich_text;
        let component_colors = [colors.x, colors.y, colors.z, colors.w];
        let components =
            std::array::from_fn(|i| colorize(["X:", "Y:", "Z:", "W:"][i], component_colors[i], rich_text));

        Self {
            precision: precision.unwrap_or(format.float_precision),
            rich_text,
            true_text: colorize("true", colors.true_color, rich_text),
            false_text: colorize("false", colors.false_color, rich_text),
            components,
        }
    }

    /// Append the formatted value to `out`
    pub fn write(&self, out: &mut String, value: &MonitorValue) {
        let p = self.precision;
        match value {
            MonitorValue::Unit => {}
            MonitorValue::Bool(true) => out.push_str(&self.true_text),
            MonitorValue::Bool(false) => out.push_str(&self.false_text),
            MonitorValue::I32(v) => {
                let _ = write!(out, "{}", v);
            }
            MonitorValue::I64(v) => {
                let _ = write!(out, "{}", v);
            }
            MonitorValue::U32(v) => {
                let _ = write!(out, "{}", v);
            }
            MonitorValue::U64(v) => {
                let _ = write!(out, "{}", v);
            }
            MonitorValue::F32(v) => {
                let _ = write!(out, "{:.p$}", v);
            }
            MonitorValue::F64(v) => {
                let _ = write!(out, "{:.p$}", v);
            }
            MonitorValue::String(s) => out.push_str(s),
            MonitorValue::Color(color) => {
                let hex = color.to_hex();
                out.push_str(&colorize(&hex, *color, self.rich_text));
            }
            MonitorValue::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write(out, item);
                }
                out.push(']');
            }
            vector => {
                let count = vector.value_type().components().unwrap_or(0);
                let values = vector.components().unwrap_or_default();
                for i in 0..count {
                    if i > 0 {
                        out.push(' ');
                    }
                    let _ = write!(out, "{} {:.p$}", self.components[i], values[i]);
                }
            }
        }
    }

    /// Format a value into a fresh string
    pub fn to_text(&self, value: &MonitorValue) -> String {
        let mut out = String::new();
        self.write(&mut out, value);
        out
    }
}
