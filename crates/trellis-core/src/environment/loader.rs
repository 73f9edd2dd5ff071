//! Loading property maps from `.properties`, JSON and YAML text.

use indexmap::IndexMap;
use serde_json::Value;
use trellis_common::error::Result;

/// Parses `.properties` text.
///
/// Supports `#`/`!` comments, `=`, `:` or whitespace separators, trailing
/// backslash line continuations and the common escapes.
#[must_use]
pub fn parse_properties(text: &str) -> IndexMap<String, String> {
    let mut properties = IndexMap::new();
    let mut logical = String::new();

    for raw_line in text.lines() {
        let line = raw_line.trim_start();
        if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }
        if ends_with_continuation(line) {
            logical.push_str(&line[..line.len() - 1]);
            continue;
        }
        logical.push_str(line);
        let (key, value) = split_entry(&logical);
        let _ = properties.insert(unescape(key), unescape(value));
        logical.clear();
    }
    if !logical.is_empty() {
        let (key, value) = split_entry(&logical);
        let _ = properties.insert(unescape(key), unescape(value));
    }
    properties
}

fn ends_with_continuation(line: &str) -> bool {
    let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
    trailing % 2 == 1
}

fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (index, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '=' | ':' => return (line[..index].trim_end(), line[index + 1..].trim_start()),
            c if c.is_whitespace() => {
                let rest = line[index..].trim_start();
                let rest = rest
                    .strip_prefix('=')
                    .or_else(|| rest.strip_prefix(':'))
                    .map_or(rest, str::trim_start);
                return (&line[..index], rest);
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Parses a JSON document and flattens it to dotted keys.
///
/// # Errors
///
/// Returns an error if the text is not valid JSON.
pub fn parse_json(text: &str) -> Result<IndexMap<String, String>> {
    let value: Value = serde_json::from_str(text)?;
    Ok(flatten(&value))
}

/// Parses a YAML document and flattens it to dotted keys.
///
/// # Errors
///
/// Returns an error if the text is not valid YAML.
pub fn parse_yaml(text: &str) -> Result<IndexMap<String, String>> {
    let value: Value = serde_yaml::from_str(text)?;
    Ok(flatten(&value))
}

/// Flattens nested objects to `a.b.c` keys and arrays to `a[0]` keys.
#[must_use]
pub fn flatten(value: &Value) -> IndexMap<String, String> {
    let mut out = IndexMap::new();
    flatten_into(String::new(), value, &mut out);
    out
}

fn flatten_into(prefix: String, value: &Value, out: &mut IndexMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(path, nested, out);
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten_into(format!("{prefix}[{index}]"), nested, out);
            }
        }
        Value::String(s) => {
            let _ = out.insert(prefix, s.clone());
        }
        Value::Null => {
            if !prefix.is_empty() {
                let _ = out.insert(prefix, String::new());
            }
        }
        other => {
            let _ = out.insert(prefix, other.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_separators_comments_and_continuations() {
        let text = "# comment\n! also\na=1\nb : 2\nc 3\nlong = one \\\n    two\nescaped\\=key = v\\tx\n";
        let props = parse_properties(text);
        assert_eq!(props["a"], "1");
        assert_eq!(props["b"], "2");
        assert_eq!(props["c"], "3");
        assert_eq!(props["long"], "one two");
        assert_eq!(props["escaped=key"], "v\tx");
        assert_eq!(props.len(), 5);
    }

    #[test]
    fn key_without_value() {
        let props = parse_properties("flag\n");
        assert_eq!(props["flag"], "");
    }

    #[test]
    fn json_is_flattened_to_dotted_keys() {
        let props = parse_json(r#"{"db":{"url":"mem","pool":[1,2]},"debug":true}"#).unwrap();
        assert_eq!(props["db.url"], "mem");
        assert_eq!(props["db.pool[1]"], "2");
        assert_eq!(props["debug"], "true");
    }

    #[test]
    fn yaml_is_flattened_to_dotted_keys() {
        let props = parse_yaml("server:\n  port: 8080\n  hosts:\n    - a\n    - b\nempty:\n").unwrap();
        assert_eq!(props["server.port"], "8080");
        assert_eq!(props["server.hosts[0]"], "a");
        assert_eq!(props["empty"], "");
    }

    #[test]
    fn invalid_documents_are_errors() {
        assert!(parse_json("{").is_err());
        assert!(parse_yaml("a: [").is_err());
    }
}
