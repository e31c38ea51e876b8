//! HCL literal rendering
//!
//! Turns [`VariableValue`]s into the literal syntax the provisioning tool reads
//! from a variables file. Output is fully deterministic: maps are ordered and
//! no whitespace depends on anything but the value itself.

use strata_core::domain::variable::VariableValue;

/// Words that parse as expressions when used bare as object keys
const RESERVED_WORDS: [&str; 6] = ["true", "false", "null", "for", "in", "if"];

/// Renders a value as an HCL literal expression
pub fn to_hcl_literal(value: &VariableValue) -> String {
    let mut out = String::new();
    write_literal(&mut out, value);
    out
}

/// Renders one `name = literal` assignment line (without trailing newline)
pub fn assignment(name: &str, value: &VariableValue) -> String {
    format!("{} = {}", name, to_hcl_literal(value))
}

/// Whether `name` is a valid HCL identifier
///
/// Identifiers start with a letter or underscore and continue with letters,
/// digits, underscores or dashes.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn write_literal(out: &mut String, value: &VariableValue) {
    match value {
        VariableValue::String(s) => write_quoted(out, s),
        VariableValue::Number(n) => out.push_str(&n.to_string()),
        VariableValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        VariableValue::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_literal(out, item);
            }
            out.push(']');
        }
        VariableValue::Map(entries) => {
            if entries.is_empty() {
                out.push_str("{}");
                return;
            }

            out.push_str("{ ");
            for (i, (key, item)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_key(out, key);
                out.push_str(" = ");
                write_literal(out, item);
            }
            out.push_str(" }");
        }
    }
}

fn write_key(out: &mut String, key: &str) {
    if is_identifier(key) && !RESERVED_WORDS.contains(&key) {
        out.push_str(key);
    } else {
        write_quoted(out, key);
    }
}

fn write_quoted(out: &mut String, s: &str) {
    out.push('"');

    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            // Template introducers would otherwise start an interpolation
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }

    out.push('"');
}
