use super::{CanvasError, ComponentError, ConfigError, DistributedError, TerminalError};

impl From<&'static str> for CanvasError {
    fn from(message: &'static str) -> Self {
        CanvasError::TestExpectation { message }
    }
}

impl From<String> for CanvasError {
    fn from(value: String) -> Self {
        CanvasError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for ComponentError {
    fn from(message: &'static str) -> Self {
        ComponentError::TestExpectation { message }
    }
}

impl From<String> for ComponentError {
    fn from(value: String) -> Self {
        ComponentError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for ConfigError {
    fn from(message: &'static str) -> Self {
        ConfigError::TestExpectation { message }
    }
}

impl From<String> for ConfigError {
    fn from(value: String) -> Self {
        ConfigError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for DistributedError {
    fn from(message: &'static str) -> Self {
        DistributedError::TestExpectation { message }
    }
}

impl From<String> for DistributedError {
    fn from(value: String) -> Self {
        DistributedError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for TerminalError {
    fn from(message: &'static str) -> Self {
        TerminalError::TestExpectation { message }
    }
}

impl From<String> for TerminalError {
    fn from(value: String) -> Self {
        TerminalError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}
