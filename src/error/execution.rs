use thiserror::Error;

use crate::execution::TestState;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Execution state channel closed while waiting for {expected:?}.")]
    StateChannelClosed { expected: TestState },
}
