mod app;
mod canvas;
mod component;
mod config;
mod distributed;
mod execution;
mod terminal;

#[cfg(test)]
mod test_support;

pub use app::{AppError, AppResult};
pub use canvas::CanvasError;
pub use component::ComponentError;
pub use config::ConfigError;
pub use distributed::DistributedError;
pub use execution::ExecutionError;
pub use terminal::TerminalError;
