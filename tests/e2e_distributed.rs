use std::sync::Arc;
use std::time::Duration;

use tokio::io::duplex;

use loadcanvas::canvas::Canvas;
use loadcanvas::component::BehaviorRegistry;
use loadcanvas::config::{
    AgentConfig, AssignmentConfig, ComponentConfig, ConnectionConfig, EngineSettings,
    ProjectConfig, ScenarioConfig,
};
use loadcanvas::distributed::AgentId;
use loadcanvas::distributed::wire::{forward_messages, spawn_writer};
use loadcanvas::execution::TestState;
use loadcanvas::summary::{CollectingSummarySink, Summary};
use loadcanvas::workspace::{ExecutionMode, Workspace};

const SCENARIO_ID: &str = "scenario-1";
const AGENTS: [&str; 2] = ["agent-a", "agent-b"];
const WAIT: Duration = Duration::from_secs(10);

fn settings(mode: ExecutionMode) -> EngineSettings {
    EngineSettings {
        mode,
        local_mode: false,
        time_update_interval: Duration::from_millis(50),
        busy_timeout: Duration::from_millis(500),
        summary_wait: Duration::from_secs(2),
    }
}

fn scenario_project() -> ProjectConfig {
    let mut generator = ComponentConfig::new("Generator", "generator");
    generator.id = "gen".to_owned();
    generator.non_blocking = true;
    generator
        .attributes
        .insert("interval".to_owned(), "5ms".to_owned());
    generator
        .attributes
        .insert("failEvery".to_owned(), "3".to_owned());
    let mut sink = ComponentConfig::new("Sink", "counter-sink");
    sink.id = "sink".to_owned();
    sink.non_blocking = true;

    let mut scenario = ScenarioConfig::new("Distributed scenario");
    scenario.canvas.id = SCENARIO_ID.to_owned();
    scenario.canvas.components = vec![generator, sink];
    scenario.canvas.connections = vec![ConnectionConfig {
        output: "gen/output".to_owned(),
        input: "sink/input".to_owned(),
    }];

    let mut project = ProjectConfig::new("Distributed demo");
    project.scenarios.push(scenario);
    project
}

fn controller_project() -> ProjectConfig {
    let mut project = scenario_project();
    for agent in AGENTS {
        project.agents.push(AgentConfig {
            id: agent.to_owned(),
            label: agent.to_owned(),
            url: None,
        });
        project.assignments.push(AssignmentConfig {
            scenario: SCENARIO_ID.to_owned(),
            agent: agent.to_owned(),
        });
    }
    project
}

fn require_scenario(project: &Canvas) -> Result<Arc<Canvas>, String> {
    project
        .scenario(SCENARIO_ID)
        .ok_or_else(|| "scenario missing".to_owned())
}

/// Wire an agent workspace to the controller project over two in-memory
/// byte streams, one per direction.
fn link_agent(controller: &Arc<Canvas>, agent_id: &str) -> Result<Arc<Workspace>, String> {
    let workspace = Workspace::new(
        settings(ExecutionMode::Agent),
        Arc::new(BehaviorRegistry::with_builtins()),
        Arc::new(CollectingSummarySink::default()),
    )
    .map_err(|err| format!("agent workspace failed: {}", err))?;
    let agent_project = workspace
        .load_project(scenario_project())
        .map_err(|err| format!("agent load failed: {}", err))?;
    let agent_scenario = require_scenario(&agent_project)?;

    let (to_agent_writer, to_agent_reader) = duplex(64 * 1024);
    let (to_controller_writer, to_controller_reader) = duplex(64 * 1024);

    let (controller_endpoint, _to_agent_task) = spawn_writer(agent_id, to_agent_writer);
    controller
        .agent(agent_id)
        .ok_or_else(|| format!("agent {} missing", agent_id))?
        .attach_endpoint(controller_endpoint);
    let (agent_endpoint, _to_controller_task) = spawn_writer("controller", to_controller_writer);
    agent_scenario.attach_controller_endpoint(agent_endpoint);

    tokio::spawn(async move {
        forward_messages(to_agent_reader, |message| {
            agent_scenario.handle_controller_message(message)
        })
        .await
    });
    let project = Arc::clone(controller);
    let id = AgentId::new(agent_id);
    tokio::spawn(async move {
        forward_messages(to_controller_reader, |message| {
            project.handle_agent_message(&id, message)
        })
        .await
    });

    controller
        .set_agent_ready(agent_id, true)
        .map_err(|err| format!("agent ready failed: {}", err))?;
    Ok(workspace)
}

fn agents_section_total(summary: &Summary, key: &str) -> Option<i64> {
    summary
        .chapters
        .iter()
        .flat_map(|chapter| chapter.sections.iter())
        .filter(|section| section.title == "Agents")
        .flat_map(|section| section.entries.iter())
        .find(|(name, _)| name == key)
        .and_then(|(_, value)| value.parse().ok())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_distributed_two_agents_reconcile_statistics() -> Result<(), String> {
    let sink = Arc::new(CollectingSummarySink::default());
    let controller = Workspace::new(
        settings(ExecutionMode::Controller),
        Arc::new(BehaviorRegistry::with_builtins()),
        sink.clone(),
    )
    .map_err(|err| format!("controller workspace failed: {}", err))?;
    let project = controller
        .load_project(controller_project())
        .map_err(|err| format!("controller load failed: {}", err))?;
    if project.is_loading_error() {
        return Err("controller project loaded with errors".to_owned());
    }
    let scenario = require_scenario(&project)?;

    let mut agents = Vec::new();
    for agent in AGENTS {
        agents.push(link_agent(&project, agent)?);
    }

    let execution = scenario
        .start()
        .map_err(|err| format!("start failed: {}", err))?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    scenario.stop();
    if !scenario.wait_until_completed(WAIT).await {
        return Err("controller scenario never completed".to_owned());
    }
    if scenario.counter("Requests") != 0 {
        return Err("controller scenario ran its components locally".to_owned());
    }

    let deadline = tokio::time::Instant::now() + WAIT;
    let summary = loop {
        if let Some(summary) = sink.for_canvas(SCENARIO_ID) {
            break summary;
        }
        if tokio::time::Instant::now() > deadline {
            return Err("scenario summary never published".to_owned());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    };

    for agent in AGENTS {
        let row = summary
            .chapters
            .iter()
            .flat_map(|chapter| chapter.sections.iter())
            .flat_map(|section| section.entries.iter())
            .any(|(name, _)| name == agent);
        if !row {
            return Err(format!("summary missing a row for {}:\n{}", agent, summary));
        }
    }
    let requests = agents_section_total(&summary, "Requests").unwrap_or(0);
    if requests <= 0 {
        return Err(format!("no remote requests reconciled:\n{}", summary));
    }
    tokio::time::timeout(WAIT, execution.wait_for_state(TestState::Completed))
        .await
        .map_err(|_| format!("execution left in {:?}", execution.state()))?
        .map_err(|err| format!("execution wait failed: {}", err))?;

    project.release();
    drop(agents);
    Ok(())
}
