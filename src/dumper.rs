use serde::{Deserialize, Serialize};

use crate::types::{Map, Number, Value};

const INDENT: &str = "  ";
const KEYWORDS: [&str; 7] = ["true", "false", "yes", "no", "on", "off", "null"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpOptions {
    /// One entry per line, indented.
    pub pretty_print: bool,
    /// Writes `{a: {b: 1}}` as `a b 1`.
    pub short_single_element: bool,
    /// Quotes every string, even those that could be bare words.
    pub quote_strings: bool,
    /// Wraps a root object in braces.
    pub root_braces: bool,
    /// Ends object entries with `,` instead of `;`.
    pub comma_separator: bool,
}

impl DumpOptions {
    pub fn pretty() -> Self {
        Self {
            pretty_print: true,
            short_single_element: true,
            ..Self::default()
        }
    }

    /// Every combination of flags.
    pub fn all() -> Vec<DumpOptions> {
        (0u8..32)
            .map(|bits| DumpOptions {
                pretty_print: bits & 1 != 0,
                short_single_element: bits & 2 != 0,
                quote_strings: bits & 4 != 0,
                root_braces: bits & 8 != 0,
                comma_separator: bits & 16 != 0,
            })
            .collect()
    }
}

/// Writes values back as NACL source.
#[derive(Debug, Clone, Default)]
pub struct Dumper {
    options: DumpOptions,
}

impl Dumper {
    pub fn new(options: DumpOptions) -> Self {
        Self { options }
    }

    pub fn dump(&self, value: &Value) -> String {
        let mut out = String::new();
        match value {
            Value::Map(map) if !self.options.root_braces => self.write_entries(&mut out, map, 0),
            other => self.write_value(&mut out, other, 0),
        }
        if self.options.pretty_print && !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }

    fn write_entries(&self, out: &mut String, map: &Map, level: usize) {
        for (key, value) in map {
            if self.options.pretty_print {
                out.push_str(&INDENT.repeat(level));
            }
            self.write_string(out, key);

            let mut value = value;
            if self.options.short_single_element {
                while let Value::Map(inner) = value {
                    let Some((inner_key, inner_value)) = inner.iter().next().filter(|_| inner.len() == 1) else {
                        break;
                    };
                    out.push(' ');
                    self.write_string(out, inner_key);
                    value = inner_value;
                }
            }

            out.push(' ');
            self.write_value(out, value, level);
            if !matches!(value, Value::Map(_) | Value::List(_)) {
                out.push(if self.options.comma_separator { ',' } else { ';' });
            }
            if self.options.pretty_print {
                out.push('\n');
            }
        }
    }

    fn write_value(&self, out: &mut String, value: &Value, level: usize) {
        match value {
            Value::Null => out.push_str("null"),
            Value::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Number(number) => write_number(out, *number),
            Value::String(s) => self.write_string(out, s),
            Value::Map(map) if map.is_empty() => out.push_str("{}"),
            Value::List(items) if items.is_empty() => out.push_str("[]"),
            Value::Map(map) => {
                out.push('{');
                if self.options.pretty_print {
                    out.push('\n');
                }
                self.write_entries(out, map, level + 1);
                if self.options.pretty_print {
                    out.push_str(&INDENT.repeat(level));
                }
                out.push('}');
            }
            Value::List(items) => self.write_list(out, items, level),
        }
    }

    fn write_list(&self, out: &mut String, items: &[Value], level: usize) {
        out.push('[');
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                out.push(',');
                if !self.options.pretty_print {
                    out.push(' ');
                }
            }
            if self.options.pretty_print {
                out.push('\n');
                out.push_str(&INDENT.repeat(level + 1));
            }
            match item {
                Value::Map(map) if self.options.short_single_element && map.len() == 1 => {
                    self.write_short_map(out, map, level + 1)
                }
                other => self.write_value(out, other, level + 1),
            }
        }
        if self.options.pretty_print {
            out.push('\n');
            out.push_str(&INDENT.repeat(level));
        }
        out.push(']');
    }

    /// `{k: v}` inside a list, written as `k v`.
    fn write_short_map(&self, out: &mut String, map: &Map, level: usize) {
        let mut current = map;
        loop {
            let Some((key, value)) = current.iter().next() else {
                return out.push_str("{}");
            };
            self.write_string(out, key);
            out.push(' ');
            match value {
                Value::Map(next) if next.len() == 1 => current = next,
                other => return self.write_value(out, other, level),
            }
        }
    }

    fn write_string(&self, out: &mut String, s: &str) {
        if !self.options.quote_strings && is_bare_word(s) {
            out.push_str(s);
            return;
        }

        out.push('"');
        let mut previous = '\0';
        for c in s.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                '\r' => out.push_str("\\r"),
                '\u{8}' => out.push_str("\\b"),
                '\u{c}' => out.push_str("\\f"),
                '{' if previous == '$' => out.push_str("\\u007b"),
                c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
            previous = c;
        }
        out.push('"');
    }
}

/// Whether `s` reads back as a NAME token.
fn is_bare_word(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !KEYWORDS.contains(&s.to_ascii_lowercase().as_str())
}

fn write_number(out: &mut String, number: Number) {
    match number {
        // The literal 9223372036854775808 would overflow before being negated.
        Number::Int(i64::MIN) => out.push_str("(-9223372036854775807 - 1)"),
        Number::Int(i) => out.push_str(&i.to_string()),
        Number::Float(f) if f.is_finite() => out.push_str(&format!("{:?}", f)),
        Number::Float(_) => out.push_str("null"),
    }
}
