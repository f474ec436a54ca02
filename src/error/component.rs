use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("Component label must not be empty.")]
    EmptyLabel,
    #[error("Component descriptor type must not be empty.")]
    EmptyType,
    #[error("No behavior registered for component type '{type_name}'.")]
    UnknownType { type_name: String },
    #[error("Component '{id}' has been released.")]
    Released { id: String },
    #[error("The timer counter cannot be manually incremented.")]
    TimerCounterReadOnly,
    #[error("Unknown statistics writer type '{writer_type}'.")]
    UnknownWriterType { writer_type: String },
    #[error("Failed to record statistic: {message}")]
    Statistic { message: String },
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
