//! Turn prompts for the coordinator and worker roles.

use crate::config::AgentDefinition;

/// Output an agent produced during a round.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutput {
    pub agent_id: String,
    pub agent_name: String,
    pub round: usize,
    pub text: String,
}

pub fn coordinator_assignment(
    task: &str,
    coordinator: &AgentDefinition,
    workers: &[&AgentDefinition],
    max_rounds: usize,
) -> String {
    let roster = if workers.is_empty() {
        "- (no other agents; complete the task yourself)".to_string()
    } else {
        workers
            .iter()
            .map(|worker| {
                let description = if worker.description.is_empty() {
                    "no description"
                } else {
                    worker.description.as_str()
                };
                format!(
                    "- {}: {} (role: {})",
                    worker.name, description, worker.system_prompt
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Task: {task}\n\n\
         You are {name}, coordinating a collaboration with {count} other agents:\n\
         {roster}\n\n\
         Break the task into subtasks and assign each one to the agent best suited for it. \
         Address each assignment by agent name. The collaboration has {max_rounds} rounds, \
         so plan the work to finish within that budget.",
        task = task,
        name = coordinator.name,
        count = workers.len(),
        roster = roster,
        max_rounds = max_rounds,
    )
}

pub fn coordinator_review(
    task: &str,
    round: usize,
    max_rounds: usize,
    worker_outputs: &[&TurnOutput],
) -> String {
    let responses = if worker_outputs.is_empty() {
        "No worker responses were received in the previous round.".to_string()
    } else {
        worker_outputs
            .iter()
            .map(|output| format!("{}: {}", output.agent_name, output.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        "Task: {task}\n\n\
         Round {round} of {max_rounds}. Worker responses from the previous round:\n\
         {responses}\n\n\
         Review this work. Consolidate what is complete into the overall result, and \
         reassign or refine any subtask that still needs attention.",
        task = task,
        round = round,
        max_rounds = max_rounds,
        responses = responses,
    )
}

pub fn worker_turn(
    task: &str,
    worker: &AgentDefinition,
    coordinator_output: Option<&TurnOutput>,
) -> String {
    match coordinator_output {
        Some(output) => format!(
            "Task: {task}\n\n\
             Latest instructions from the coordinator ({coordinator}):\n\
             {instructions}\n\n\
             You are {name}. Complete the part of the work assigned to you and report your result.",
            task = task,
            coordinator = output.agent_name,
            instructions = output.text,
            name = worker.name,
        ),
        None => format!(
            "Task: {task}\n\n\
             You are {name}. The coordinator has not assigned work yet. Share how you can \
             contribute to the task and await your assignment.",
            task = task,
            name = worker.name,
        ),
    }
}
