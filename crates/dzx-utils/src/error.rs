//! User-facing error reporting shared by every dzx crate.

use std::fmt;

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    ProcessExecution,
    Pipeline,
    Usage,
    FileSystem,
    Runtime,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::ProcessExecution => write!(f, "Process Execution"),
            Self::Pipeline => write!(f, "Pipeline"),
            Self::Usage => write!(f, "Usage"),
            Self::FileSystem => write!(f, "File System"),
            Self::Runtime => write!(f, "Runtime"),
        }
    }
}

/// Render an error as the block shown to end users:
///
/// ```text
/// Error: <user message>
///
/// Context: <context if available>
///
/// Suggestions:
///   • <suggestion 1>
/// ```
#[must_use]
pub fn render_for_user(error: &dyn UserFriendlyError) -> String {
    let mut output = format!("Error: {}\n", error.user_message());

    if let Some(ctx) = error.context() {
        output.push_str(&format!("\nContext: {ctx}\n"));
    }

    let suggestions = error.suggestions();
    if !suggestions.is_empty() {
        output.push_str("\nSuggestions:\n");
        for suggestion in suggestions {
            output.push_str(&format!("  • {suggestion}\n"));
        }
    }

    output
}
