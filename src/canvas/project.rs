use std::path::Path;
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, AssignmentConfig, ProjectConfig, ScenarioConfig, save_config_file};
use crate::distributed::{Agent, AgentId, Assignment, ChannelMessage, ScenePayload};
use crate::error::{AppError, AppResult, CanvasError, DistributedError};
use crate::events::{CollectionChange, Event, SubscriptionId, keys};
use crate::sync::lock;
use crate::workspace::Workspace;

use super::{Canvas, CanvasRole};

#[derive(Default)]
pub(super) struct ProjectState {
    scenarios: Mutex<Vec<Arc<Canvas>>>,
    agents: Mutex<Vec<Arc<Agent>>>,
    assignments: Mutex<Vec<Assignment>>,
    workspace_subscription: Mutex<Option<SubscriptionId>>,
}

impl ProjectState {
    pub(super) fn set_workspace_subscription(&self, id: SubscriptionId) {
        *lock(&self.workspace_subscription) = Some(id);
    }

    pub(super) fn release(&self, workspace: &Workspace) {
        if let Some(id) = lock(&self.workspace_subscription).take() {
            workspace.bus().unsubscribe(id);
        }
        let scenarios: Vec<Arc<Canvas>> = lock(&self.scenarios).drain(..).collect();
        for scenario in scenarios {
            scenario.release();
        }
        for agent in lock(&self.agents).drain(..) {
            agent.detach_endpoint();
        }
        lock(&self.assignments).clear();
    }
}

impl Canvas {
    fn project_state(&self) -> AppResult<&ProjectState> {
        match &self.role {
            CanvasRole::Project(state) => Ok(state),
            CanvasRole::Scenario(_) => Err(AppError::canvas(CanvasError::NotAProject {
                id: self.id.clone(),
            })),
        }
    }

    /// The persisted form of a project and everything below it.
    ///
    /// # Errors
    ///
    /// Returns an error for scenarios.
    pub fn project_config(&self) -> AppResult<ProjectConfig> {
        let state = self.project_state()?;
        let scenarios = lock(&state.scenarios)
            .iter()
            .map(|scenario| scenario.scenario_config())
            .collect::<AppResult<Vec<_>>>()?;
        let agents = lock(&state.agents)
            .iter()
            .map(|agent| AgentConfig {
                id: agent.id().to_string(),
                label: agent.label().to_owned(),
                url: agent.url().map(str::to_owned),
            })
            .collect();
        let assignments = lock(&state.assignments)
            .iter()
            .map(|assignment| AssignmentConfig {
                scenario: assignment.scenario.clone(),
                agent: assignment.agent.to_string(),
            })
            .collect();
        Ok(ProjectConfig {
            canvas: self.canvas_config(),
            scenarios,
            agents,
            assignments,
        })
    }

    /// Write the project to `path` and mark it clean.
    ///
    /// # Errors
    ///
    /// Returns an error for scenarios, unsupported extensions or I/O failures.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        save_config_file(path, &self.project_config()?)?;
        self.mark_clean();
        info!("Saved project {} to {}", self.id, path.display());
        Ok(())
    }

    // Scenarios

    /// Scenarios of a project. Empty for scenarios.
    #[must_use]
    pub fn scenarios(&self) -> Vec<Arc<Self>> {
        match &self.role {
            CanvasRole::Project(state) => lock(&state.scenarios).clone(),
            CanvasRole::Scenario(_) => Vec::new(),
        }
    }

    #[must_use]
    pub fn scenario(&self, id: &str) -> Option<Arc<Self>> {
        self.scenarios()
            .into_iter()
            .find(|scenario| scenario.id() == id)
    }

    fn require_scenario(&self, id: &str) -> AppResult<Arc<Self>> {
        self.scenario(id).ok_or_else(|| {
            AppError::canvas(CanvasError::UnknownScenario { id: id.to_owned() })
        })
    }

    /// # Errors
    ///
    /// See [`Canvas::add_scenario`].
    pub fn create_scenario(self: &Arc<Self>, label: &str) -> AppResult<Arc<Self>> {
        self.add_scenario(ScenarioConfig::new(label))
    }

    /// Build a scenario from its persisted form and add it to the project.
    ///
    /// # Errors
    ///
    /// Returns an error for scenarios, released projects, or a scenario that
    /// cannot be initialised.
    pub fn add_scenario(self: &Arc<Self>, config: ScenarioConfig) -> AppResult<Arc<Self>> {
        self.project_state()?;
        self.ensure_live()?;
        let scenario = Self::load_scenario(self, config)?;
        self.attach_scenario(Arc::clone(&scenario), true);
        Ok(scenario)
    }

    pub(super) fn attach_scenario(&self, scenario: Arc<Self>, announce: bool) {
        let CanvasRole::Project(state) = &self.role else {
            return;
        };
        let id = scenario.id().to_owned();
        lock(&state.scenarios).push(scenario);
        if announce {
            self.bus.fire(&Event::Collection {
                key: keys::SCENARIOS,
                change: CollectionChange::Added,
                element: id,
                source: self.id.clone(),
            });
        }
    }

    /// Release a scenario and drop its assignments.
    ///
    /// # Errors
    ///
    /// Returns an error for scenarios or unknown scenario ids.
    pub fn remove_scenario(&self, id: &str) -> AppResult<()> {
        let state = self.project_state()?;
        let scenario = {
            let mut scenarios = lock(&state.scenarios);
            let position = scenarios
                .iter()
                .position(|scenario| scenario.id() == id)
                .ok_or_else(|| {
                    AppError::canvas(CanvasError::ItemNotInCollection { id: id.to_owned() })
                })?;
            scenarios.remove(position)
        };
        let agents: Vec<AgentId> = self.agents_assigned_to(id);
        for agent in &agents {
            self.unassign(id, agent.as_str())?;
        }
        scenario.release();
        self.bus.fire(&Event::Collection {
            key: keys::SCENARIOS,
            change: CollectionChange::Removed,
            element: id.to_owned(),
            source: self.id.clone(),
        });
        Ok(())
    }

    // Agents

    #[must_use]
    pub fn agents(&self) -> Vec<Arc<Agent>> {
        match &self.role {
            CanvasRole::Project(state) => lock(&state.agents).clone(),
            CanvasRole::Scenario(_) => Vec::new(),
        }
    }

    #[must_use]
    pub fn agent(&self, id: &str) -> Option<Arc<Agent>> {
        self.agents()
            .into_iter()
            .find(|agent| agent.id().as_str() == id)
    }

    fn require_agent(&self, id: &str) -> AppResult<Arc<Agent>> {
        self.agent(id).ok_or_else(|| {
            AppError::distributed(DistributedError::UnknownAgent { id: id.to_owned() })
        })
    }

    /// Register an agent, or return the one already registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error for scenarios.
    pub fn add_agent(&self, id: &str, label: &str, url: Option<String>) -> AppResult<Arc<Agent>> {
        let state = self.project_state()?;
        let agent = {
            let mut agents = lock(&state.agents);
            if let Some(existing) = agents.iter().find(|agent| agent.id().as_str() == id) {
                return Ok(Arc::clone(existing));
            }
            let agent = Arc::new(Agent::new(AgentId::new(id), label, url));
            agents.push(Arc::clone(&agent));
            agent
        };
        debug!("Registered agent {} on {}", id, self.id);
        Ok(agent)
    }

    /// Flip an agent's readiness. Scenarios waiting on statistics re-check
    /// whether they still wait for anyone.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown agents.
    pub fn set_agent_ready(&self, id: &str, ready: bool) -> AppResult<()> {
        let agent = self.require_agent(id)?;
        if !agent.set_ready(ready) {
            return Ok(());
        }
        self.bus.fire(&Event::base(keys::AGENT_READY, &self.id));
        if !ready {
            for scenario in self.scenarios() {
                let assigned = self
                    .agents_assigned_to(scenario.id())
                    .iter()
                    .any(|assigned| assigned == agent.id());
                if assigned && scenario.expects_reports() {
                    scenario.check_statistics_ready();
                }
            }
        }
        Ok(())
    }

    // Assignments

    #[must_use]
    pub fn assignments(&self) -> Vec<Assignment> {
        match &self.role {
            CanvasRole::Project(state) => lock(&state.assignments).clone(),
            CanvasRole::Scenario(_) => Vec::new(),
        }
    }

    /// Deploy a scenario to an agent. Assigning twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown scenarios or agents.
    pub fn assign(&self, scenario_id: &str, agent_id: &str) -> AppResult<()> {
        let state = self.project_state()?;
        self.require_scenario(scenario_id)?;
        let agent = self.require_agent(agent_id)?;
        {
            let mut assignments = lock(&state.assignments);
            if assignments
                .iter()
                .any(|assignment| assignment.scenario == scenario_id && &assignment.agent == agent.id())
            {
                return Ok(());
            }
            assignments.push(Assignment {
                scenario: scenario_id.to_owned(),
                agent: agent.id().clone(),
            });
        }
        self.bus.fire(&Event::Collection {
            key: keys::ASSIGNMENTS,
            change: CollectionChange::Added,
            element: agent_id.to_owned(),
            source: scenario_id.to_owned(),
        });
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error for scenarios.
    pub fn unassign(&self, scenario_id: &str, agent_id: &str) -> AppResult<()> {
        let state = self.project_state()?;
        let removed = {
            let mut assignments = lock(&state.assignments);
            let before = assignments.len();
            assignments.retain(|assignment| {
                assignment.scenario != scenario_id || assignment.agent.as_str() != agent_id
            });
            assignments.len() != before
        };
        if removed {
            self.bus.fire(&Event::Collection {
                key: keys::ASSIGNMENTS,
                change: CollectionChange::Removed,
                element: agent_id.to_owned(),
                source: scenario_id.to_owned(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn agents_assigned_to(&self, scenario_id: &str) -> Vec<AgentId> {
        self.assignments()
            .into_iter()
            .filter(|assignment| assignment.scenario == scenario_id)
            .map(|assignment| assignment.agent)
            .collect()
    }

    pub(super) fn assigned_agents(&self, scenario_id: &str) -> Vec<Arc<Agent>> {
        let assigned = self.agents_assigned_to(scenario_id);
        self.agents()
            .into_iter()
            .filter(|agent| assigned.contains(agent.id()))
            .collect()
    }

    // Messaging

    /// Send `message` to every agent `scenario` is assigned to.
    pub(crate) fn broadcast_message(&self, scenario: &Canvas, message: &ChannelMessage) {
        for agent in self.assigned_agents(scenario.id()) {
            if let Err(err) = agent.send_message(message.clone()) {
                warn!("Cannot reach agent {} for {}: {}", agent.id(), scenario.id(), err);
            }
        }
    }

    pub(crate) fn send_to_agent(&self, agent: &AgentId, message: ChannelMessage) -> AppResult<()> {
        self.require_agent(agent.as_str())?.send_message(message)
    }

    /// Handle a message an agent sent about one of this project's scenarios.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown scenarios or components.
    pub fn handle_agent_message(&self, agent: &AgentId, message: ChannelMessage) -> AppResult<()> {
        let scenario = self.require_scenario(&message.scenario_id)?;
        match message.payload {
            ScenePayload::Statistics(report) => scenario.handle_statistics_data(agent, report),
            ScenePayload::ComponentMessage {
                component_id,
                message: terminal_message,
            } => {
                let component = scenario.component(&component_id).ok_or_else(|| {
                    AppError::canvas(CanvasError::UnknownComponent {
                        id: component_id.clone(),
                        canvas: scenario.id().to_owned(),
                    })
                })?;
                component.receive_agent_message(agent, terminal_message);
            }
            ScenePayload::Action { .. } | ScenePayload::CancelComponents => {
                warn!(
                    "Ignoring controller-bound message from agent {} for {}",
                    agent,
                    scenario.id()
                );
            }
        }
        Ok(())
    }

    pub(super) fn project_complete(self: &Arc<Self>, source: &Arc<Self>) {
        if !Arc::ptr_eq(source, self) {
            return;
        }
        let participants: Vec<Arc<Self>> = self
            .scenarios()
            .into_iter()
            .filter(|scenario| scenario.follows_project())
            .collect();
        let timeout = self.workspace.settings().summary_wait;
        let project = Arc::clone(self);
        drop(self.workspace.scheduler().spawn(async move {
            let waits = participants
                .iter()
                .map(|scenario| scenario.wait_until_completed(timeout));
            let completed = join_all(waits).await;
            for (scenario, done) in participants.iter().zip(completed) {
                if !done {
                    warn!(
                        "Scenario {} did not complete within {:?}, summarising {} without it",
                        scenario.id(),
                        timeout,
                        project.id()
                    );
                }
            }
            project.generate_summary();
        }));
    }
}
