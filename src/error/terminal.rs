use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("Terminal label '{label}' already exists on '{holder}'.")]
    DuplicateLabel { label: String, holder: String },
    #[error("Operation '{operation}' is not supported by relay terminal '{terminal}'.")]
    Unsupported {
        operation: &'static str,
        terminal: String,
    },
    #[error("Terminal '{terminal}' must be an {expected} terminal.")]
    WrongDirection {
        terminal: String,
        expected: &'static str,
    },
    #[error("Terminal '{terminal}' is not owned by '{holder}'.")]
    NotOwned { terminal: String, holder: String },
    #[error("Terminal '{id}' was not found.")]
    NotFound { id: String },
    #[error("Terminal holder of '{terminal}' has been released.")]
    HolderReleased { terminal: String },
    #[cfg(test)]
    #[error("Test expectation failed: {message}")]
    TestExpectation { message: &'static str },
    #[cfg(test)]
    #[error("Test expectation failed: {message}: {value}")]
    TestExpectationValue {
        message: &'static str,
        value: String,
    },
}
