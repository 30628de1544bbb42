//! Component ID sanitization
//!
//! Component IDs become directory names under the artifact root, so they are
//! restricted to a filesystem-safe alphabet before anything is written.

use crate::error::{ErrorCategory, UserFriendlyError};
use unicode_normalization::UnicodeNormalization;

/// Error type for component ID validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComponentIdError {
    #[error("Component ID is empty after sanitization")]
    Empty,

    #[error("Component ID '{0}' contains only invalid characters")]
    OnlyInvalidCharacters(String),
}

impl UserFriendlyError for ComponentIdError {
    fn user_message(&self) -> String {
        match self {
            Self::Empty => "A component ID is empty".to_string(),
            Self::OnlyInvalidCharacters(raw) => {
                format!("Component ID '{raw}' has no usable characters")
            }
        }
    }

    fn context(&self) -> Option<String> {
        Some("Component IDs name directories in the artifact store. Only ASCII alphanumerics, dots, dashes and underscores are kept.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        vec![
            "Use IDs such as 'auth', 'billing-api' or 'ui.forms'".to_string(),
            "If the analyzer produced the ID, re-run after deleting its analysis artifact"
                .to_string(),
        ]
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }
}

/// Sanitize a component ID for filesystem use.
///
/// NFKC-normalizes, keeps `[A-Za-z0-9._-]`, replaces everything else with
/// `_`, and breaks up `..` runs so an ID can never climb out of its directory.
///
/// ```
/// use specforge_utils::component_id::sanitize_component_id;
///
/// assert_eq!(sanitize_component_id("user-auth").unwrap(), "user-auth");
/// assert_eq!(sanitize_component_id("Data Layer").unwrap(), "Data_Layer");
/// assert_eq!(sanitize_component_id("ａｐｉ").unwrap(), "api");
/// assert!(sanitize_component_id("   ").is_err());
/// ```
pub fn sanitize_component_id(raw: &str) -> Result<String, ComponentIdError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ComponentIdError::Empty);
    }

    let normalized: String = trimmed.nfkc().collect();
    let mut sanitized: String = normalized
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    while sanitized.contains("..") {
        sanitized = sanitized.replace("..", "__");
    }

    let meaningful = sanitized
        .chars()
        .any(|c| c.is_ascii_alphanumeric() || c == '-');
    if !meaningful {
        return Err(ComponentIdError::OnlyInvalidCharacters(raw.to_string()));
    }

    if sanitized != raw {
        tracing::warn!(original = %raw, sanitized = %sanitized, "Component ID sanitized");
    }

    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn valid_ids_are_unchanged() {
        for id in ["auth", "db", "c1", "api.v2", "user_store-3"] {
            assert_eq!(sanitize_component_id(id).unwrap(), id);
        }
    }

    #[test]
    fn traversal_is_neutralized() {
        let id = sanitize_component_id("../../etc").unwrap();
        assert!(!id.contains(".."));
        assert!(!id.contains('/'));
    }

    #[test]
    fn rejects_only_punctuation() {
        assert_eq!(
            sanitize_component_id("!!!"),
            Err(ComponentIdError::OnlyInvalidCharacters("!!!".to_string()))
        );
        assert_eq!(sanitize_component_id(""), Err(ComponentIdError::Empty));
    }

    #[test]
    fn errors_are_user_friendly() {
        let err = ComponentIdError::Empty;
        assert!(!err.user_message().is_empty());
        assert!(err.context().is_some());
        assert!(!err.suggestions().is_empty());
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    proptest! {
        #[test]
        fn sanitized_ids_are_path_safe(raw in "\\PC{1,24}") {
            if let Ok(id) = sanitize_component_id(&raw) {
                prop_assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
                prop_assert!(!id.contains(".."));
            }
        }

        #[test]
        fn sanitization_is_idempotent(raw in "[a-zA-Z0-9 ._/-]{1,24}") {
            if let Ok(once) = sanitize_component_id(&raw) {
                prop_assert_eq!(sanitize_component_id(&once).unwrap(), once);
            }
        }
    }
}
