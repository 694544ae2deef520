//! Domain error types

use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Tool arguments must be a JSON object, got {0}")]
    ArgumentsNotObject(String),

    #[error("Tool name must not be empty")]
    EmptyToolName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_not_object_display() {
        let error = DomainError::ArgumentsNotObject("array".to_string());
        assert_eq!(
            error.to_string(),
            "Tool arguments must be a JSON object, got array"
        );
    }

    #[test]
    fn test_empty_tool_name_display() {
        assert_eq!(
            DomainError::EmptyToolName.to_string(),
            "Tool name must not be empty"
        );
    }
}
