/// The Errors that may occur when normalizing key ids or decoding boxes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    reason: String,
    input: Option<String>,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.input {
            Some(input) => write!(f, "{} (found '{}').", self.reason, input),
            None => write!(f, "{}.", self.reason),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Create a new uncategorized error.
    pub fn new<T: Into<String>>(reason: T) -> Self {
        Self {
            reason: reason.into(),
            input: None,
        }
    }

    /// Create a new error which remembers the offending input.
    pub fn new_with_input<T: Into<String>, U: Into<String>>(reason: T, input: U) -> Self {
        Self {
            reason: reason.into(),
            input: Some(input.into()),
        }
    }

    /// The offending input, if one was recorded.
    pub fn input(&self) -> Option<&str> {
        self.input.as_deref()
    }
}
