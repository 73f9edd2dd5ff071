//! `${key:default}` placeholder resolution.

use std::collections::HashSet;

use trellis_common::error::{Result, TrellisError};

const PREFIX: &str = "${";
const SUFFIX: &str = "}";
const SIMPLE_PREFIX: &str = "{";
const VALUE_SEPARATOR: char = ':';

/// Resolves every placeholder in `text` through `lookup`.
///
/// Placeholders nest (`${a.${b}}`) and resolved values are themselves
/// resolved. When `ignore_unresolvable` is set, placeholders without a value
/// or default are left untouched; otherwise they are an error.
///
/// # Errors
///
/// Returns [`TrellisError::UnresolvablePlaceholder`] for a missing value in
/// strict mode and [`TrellisError::CircularPlaceholder`] for self-references.
pub fn resolve_placeholders(
    text: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
    ignore_unresolvable: bool,
) -> Result<String> {
    let mut visited = HashSet::new();
    parse_string_value(text, lookup, ignore_unresolvable, &mut visited)
}

fn parse_string_value(
    value: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
    ignore_unresolvable: bool,
    visited: &mut HashSet<String>,
) -> Result<String> {
    let mut result = value.to_string();
    let mut start = result.find(PREFIX);

    while let Some(start_index) = start {
        let Some(end_index) = find_placeholder_end(&result, start_index) else {
            break;
        };
        let original = result[start_index + PREFIX.len()..end_index].to_string();
        if !visited.insert(original.clone()) {
            return Err(TrellisError::CircularPlaceholder {
                placeholder: original,
            });
        }

        let placeholder = parse_string_value(&original, lookup, ignore_unresolvable, visited)?;
        let mut resolved = lookup(&placeholder);
        if resolved.is_none() {
            if let Some((key, default)) = placeholder.split_once(VALUE_SEPARATOR) {
                resolved = lookup(key).or_else(|| Some(default.to_string()));
            }
        }

        match resolved {
            Some(raw) => {
                let replacement = parse_string_value(&raw, lookup, ignore_unresolvable, visited)?;
                result.replace_range(start_index..end_index + SUFFIX.len(), &replacement);
                let resume = start_index + replacement.len();
                start = result[resume..].find(PREFIX).map(|i| i + resume);
            }
            None if ignore_unresolvable => {
                let resume = end_index + SUFFIX.len();
                start = result[resume..].find(PREFIX).map(|i| i + resume);
            }
            None => {
                return Err(TrellisError::UnresolvablePlaceholder {
                    placeholder,
                    value: value.to_string(),
                });
            }
        }
        let _ = visited.remove(&original);
    }
    Ok(result)
}

fn find_placeholder_end(buf: &str, start_index: usize) -> Option<usize> {
    let bytes = buf.as_bytes();
    let mut index = start_index + PREFIX.len();
    let mut nested = 0usize;
    while index < bytes.len() {
        if bytes[index..].starts_with(SUFFIX.as_bytes()) {
            if nested == 0 {
                return Some(index);
            }
            nested -= 1;
            index += SUFFIX.len();
        } else if bytes[index..].starts_with(SIMPLE_PREFIX.as_bytes()) {
            nested += 1;
            index += SIMPLE_PREFIX.len();
        } else {
            index += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn resolve(text: &str, pairs: &[(&str, &str)], lenient: bool) -> Result<String> {
        let map = props(pairs);
        resolve_placeholders(text, &|k| map.get(k).cloned(), lenient)
    }

    #[test]
    fn simple_and_default_values() {
        assert_eq!(resolve("${a}/x", &[("a", "1")], false).unwrap(), "1/x");
        assert_eq!(resolve("${b:two}", &[], false).unwrap(), "two");
        assert_eq!(resolve("${b:}", &[], false).unwrap(), "");
    }

    #[test]
    fn nested_keys_and_recursive_values() {
        let pairs = [("env", "prod"), ("db.prod", "${host}:5432"), ("host", "h")];
        assert_eq!(resolve("${db.${env}}", &pairs, false).unwrap(), "h:5432");
    }

    #[test]
    fn lenient_mode_keeps_unresolvable() {
        assert_eq!(
            resolve("${missing}-${a}", &[("a", "1")], true).unwrap(),
            "${missing}-1"
        );
    }

    #[test]
    fn strict_mode_rejects_unresolvable() {
        let err = resolve("cfg/${dir}/app.properties", &[], false).unwrap_err();
        assert!(matches!(err, TrellisError::UnresolvablePlaceholder { ref placeholder, .. } if placeholder == "dir"));
    }

    #[test]
    fn circular_reference_is_detected() {
        let err = resolve("${a}", &[("a", "${b}"), ("b", "${a}")], false).unwrap_err();
        assert!(matches!(err, TrellisError::CircularPlaceholder { .. }));
    }

    #[test]
    fn repeated_placeholder_is_not_circular() {
        assert_eq!(resolve("${a}${a}", &[("a", "x")], false).unwrap(), "xx");
    }

    #[test]
    fn unterminated_placeholder_is_left_alone() {
        assert_eq!(resolve("${open", &[], false).unwrap(), "${open");
    }
}
