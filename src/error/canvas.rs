use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("No tokio runtime available for the canvas scheduler: {source}")]
    SchedulerUnavailable {
        #[source]
        source: tokio::runtime::TryCurrentError,
    },
    #[error("Canvas '{id}' has been released.")]
    Released { id: String },
    #[error("Canvas '{id}' is not a project.")]
    NotAProject { id: String },
    #[error("Canvas '{id}' is not a scenario.")]
    NotAScenario { id: String },
    #[error("Scenario '{id}' does not exist in this project.")]
    UnknownScenario { id: String },
    #[error("Component '{id}' does not exist on canvas '{canvas}'.")]
    UnknownComponent { id: String, canvas: String },
    #[error("Item '{id}' is not part of the collection.")]
    ItemNotInCollection { id: String },
    #[error("Terminal '{id}' is not attached to any canvas.")]
    DetachedTerminal { id: String },
    #[error("Cannot create summary for '{id}': start or end time missing.")]
    SummaryUnavailable { id: String },
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
