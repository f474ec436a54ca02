//! Controller to agent plumbing: agents, assignments and the scenario
//! message channel.

mod agent;
mod endpoint;
mod protocol;
pub mod wire;

#[cfg(test)]
mod tests;

pub use agent::{Agent, AgentId, Assignment};
pub use endpoint::{ChannelEndpoint, MessageEndpoint};
pub use protocol::{
    ChannelMessage, ScenePayload, StatisticsReport, channels, format_timestamp, parse_timestamp,
};
