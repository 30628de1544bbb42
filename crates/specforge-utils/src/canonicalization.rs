use anyhow::{Context, Result};
use serde::Serialize;

/// Serialize a value as RFC 8785 canonical JSON.
///
/// Persisted JSON artifacts (manifests, status records, dependency graphs)
/// are written with this so a resumed run that reaches the same state
/// produces byte-identical files.
///
/// # Example
///
/// ```rust
/// use specforge_utils::canonicalization::emit_jcs;
/// use serde_json::json;
///
/// let out = emit_jcs(&json!({"b": 1, "a": [true, null]})).expect("serializable");
/// assert_eq!(out, r#"{"a":[true,null],"b":1}"#);
/// ```
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    let json_bytes = serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON using JCS")?;
    String::from_utf8(json_bytes).with_context(|| "JCS output contained invalid UTF-8")
}

/// BLAKE3 hex digest of text content, after LF normalization.
#[must_use]
pub fn content_hash(content: &str) -> String {
    let normalized = content.replace("\r\n", "\n");
    let mut hasher = blake3::Hasher::new();
    hasher.update(normalized.as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn jcs_sorts_keys_recursively() {
        let value = json!({"z": {"y": 1, "x": 2}, "a": "s"});
        assert_eq!(emit_jcs(&value).unwrap(), r#"{"a":"s","z":{"x":2,"y":1}}"#);
    }

    #[test]
    fn hash_ignores_line_ending_style() {
        assert_eq!(content_hash("a\r\nb\r\n"), content_hash("a\nb\n"));
        assert_ne!(content_hash("a"), content_hash("b"));
        assert_eq!(content_hash("x").len(), 64);
    }
}
