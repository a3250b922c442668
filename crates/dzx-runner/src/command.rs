//! Command strings and safe argument interpolation.

use std::borrow::Cow;
use std::fmt;

use crate::error::RunError;
use crate::output::ProcessOutput;

const PLACEHOLDER: &str = "{}";

/// A shell command string, handed to the configured shell after the prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command(String);

impl Command {
    /// Wrap a command string verbatim. No escaping is applied.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self(command.into())
    }

    /// Build a command from a template, substituting each `{}` with the
    /// escaped form of the matching argument.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Template`] when the number of placeholders and
    /// arguments differ.
    ///
    /// # Example
    ///
    /// ```rust
    /// use dzx_runner::{Arg, Command};
    ///
    /// let cmd = Command::template("echo {} {}", [Arg::from("a b"), Arg::from(3)]).unwrap();
    /// assert_eq!(cmd.as_str(), "echo 'a b' 3");
    /// ```
    pub fn template<I>(template: &str, args: I) -> Result<Self, RunError>
    where
        I: IntoIterator<Item = Arg>,
    {
        let args: Vec<Arg> = args.into_iter().collect();
        let pieces: Vec<&str> = template.split(PLACEHOLDER).collect();
        let placeholders = pieces.len() - 1;
        if placeholders != args.len() {
            return Err(RunError::Template {
                placeholders,
                arguments: args.len(),
            });
        }

        let mut command = String::with_capacity(template.len());
        for (index, piece) in pieces.iter().enumerate() {
            command.push_str(piece);
            if let Some(arg) = args.get(index) {
                command.push_str(&arg.escaped());
            }
        }
        Ok(Self(command))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Command {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Command {
    fn from(command: &str) -> Self {
        Self::new(command)
    }
}

impl From<String> for Command {
    fn from(command: String) -> Self {
        Self(command)
    }
}

impl From<&String> for Command {
    fn from(command: &String) -> Self {
        Self(command.clone())
    }
}

impl From<&Command> for Command {
    fn from(command: &Command) -> Self {
        command.clone()
    }
}

/// A value interpolated into a command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Inserted verbatim. Numbers convert to this form.
    Raw(String),
    /// Shell-quoted before insertion.
    Quoted(String),
}

impl Arg {
    /// Wrap a string that should be inserted without quoting.
    #[must_use]
    pub fn raw(value: impl Into<String>) -> Self {
        Self::Raw(value.into())
    }

    /// Text that lands in the command string.
    #[must_use]
    pub fn escaped(&self) -> Cow<'_, str> {
        match self {
            Self::Raw(value) => Cow::Borrowed(value),
            Self::Quoted(value) => shell_words::quote(value),
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Quoted(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Quoted(value)
    }
}

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Self::Quoted(value.clone())
    }
}

impl From<&std::path::Path> for Arg {
    fn from(value: &std::path::Path) -> Self {
        Self::Quoted(value.to_string_lossy().into_owned())
    }
}

/// A finished process interpolates as its stdout minus one trailing newline.
impl From<&ProcessOutput> for Arg {
    fn from(output: &ProcessOutput) -> Self {
        Self::Quoted(output.stdout_line().to_string())
    }
}

impl From<ProcessOutput> for Arg {
    fn from(output: ProcessOutput) -> Self {
        Self::from(&output)
    }
}

macro_rules! numeric_args {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Self::Raw(value.to_string())
                }
            }
        )*
    };
}

numeric_args!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

/// Build a [`Command`] from a template with `{}` placeholders.
///
/// Each argument goes through [`Arg::from`], so strings are shell-quoted,
/// numbers are inserted verbatim, and a [`ProcessOutput`] contributes its
/// stdout. Evaluates to `Result<Command, RunError>`.
///
/// ```rust
/// use dzx_runner::cmd;
///
/// let name = "it's here";
/// let command = cmd!("touch {} && wc -c {}", name, name).unwrap();
/// assert_eq!(command.as_str(), "touch 'it'\\''s here' && wc -c 'it'\\''s here'");
/// ```
#[macro_export]
macro_rules! cmd {
    ($template:expr $(, $arg:expr)* $(,)?) => {{
        let args: ::std::vec::Vec<$crate::Arg> = ::std::vec![$($crate::Arg::from($arg)),*];
        $crate::Command::template($template, args)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ProcessStatus;
    use proptest::prelude::*;

    #[test]
    fn test_plain_template() {
        let command = Command::template("echo hi", Vec::<Arg>::new()).unwrap();
        assert_eq!(command.as_str(), "echo hi");
    }

    #[test]
    fn test_strings_are_quoted() {
        let command = cmd!("echo {}", "a b; rm -rf /").unwrap();
        assert_eq!(command.as_str(), "echo 'a b; rm -rf /'");
    }

    #[test]
    fn test_safe_strings_stay_bare() {
        let command = cmd!("ls {}", "README").unwrap();
        assert_eq!(command.as_str(), "ls README");
    }

    #[test]
    fn test_numbers_are_verbatim() {
        let command = cmd!("exit {}", 3).unwrap();
        assert_eq!(command.as_str(), "exit 3");
        let command = cmd!("sleep {}", 0.5).unwrap();
        assert_eq!(command.as_str(), "sleep 0.5");
    }

    #[test]
    fn test_process_output_interpolation() {
        let output = ProcessOutput {
            stdout: "hello world\n".to_string(),
            stderr: String::new(),
            combined: "hello world\n".to_string(),
            status: ProcessStatus::exited(0),
            retries: 0,
        };
        let command = cmd!("echo {}", &output).unwrap();
        assert_eq!(command.as_str(), "echo 'hello world'");
    }

    #[test]
    fn test_placeholder_mismatch() {
        let err = cmd!("echo {} {}", "a").unwrap_err();
        assert!(matches!(
            err,
            RunError::Template {
                placeholders: 2,
                arguments: 1
            }
        ));
        assert!(cmd!("echo", "a").is_err());
    }

    #[test]
    fn test_raw_arg() {
        let command = cmd!("echo {}", Arg::raw("$HOME")).unwrap();
        assert_eq!(command.as_str(), "echo $HOME");
    }

    proptest! {
        #[test]
        fn prop_quoted_arg_splits_back_to_itself(value in "\\PC*") {
            let command = cmd!("printf %s {}", value.as_str()).unwrap();
            let words = shell_words::split(command.as_str()).unwrap();
            prop_assert_eq!(words, vec!["printf".to_string(), "%s".to_string(), value]);
        }
    }
}
