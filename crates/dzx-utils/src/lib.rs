pub mod error;
pub mod exit_codes;
pub mod logging;

pub use error::{ErrorCategory, UserFriendlyError};
pub use exit_codes::ExitCode;
