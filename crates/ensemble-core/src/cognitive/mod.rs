//! Per-agent perceive, reason, decide, plan and learn pipeline.
//!
//! [`CognitiveProcessor`] wraps the pure stages in [`classify`] and keeps the
//! history an agent accumulates across turns: the latest perception, every
//! reasoning step and decision, the active plan, and feedback records.

pub mod classify;
pub mod types;

use chrono::Utc;
use serde_json::Value;

pub use types::*;

#[derive(Debug)]
pub struct CognitiveProcessor {
    agent_id: String,
    agent_name: String,
    current_perception: Option<Perception>,
    reasoning_chain: Vec<ReasoningStep>,
    decisions: Vec<Decision>,
    current_plan: Option<ExecutionPlan>,
    feedback_history: Vec<Feedback>,
}

impl CognitiveProcessor {
    pub fn new(agent_id: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            current_perception: None,
            reasoning_chain: Vec::new(),
            decisions: Vec::new(),
            current_plan: None,
            feedback_history: Vec::new(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn perceive<T>(
        &mut self,
        message: &str,
        context: &[T],
        available_tools: &[String],
        collaboration_info: Option<&Value>,
    ) -> Perception {
        let perception = classify::perceive(message, context, available_tools, collaboration_info);
        log::debug!(
            "[{}] perceived complexity={} intent={} urgency={}",
            self.agent_name,
            perception.complexity.as_str(),
            perception.intent.as_str(),
            perception.urgency.as_str()
        );
        self.current_perception = Some(perception.clone());
        perception
    }

    pub fn reason(
        &mut self,
        perception: &Perception,
        goal: &str,
        constraints: &[String],
    ) -> ReasoningStep {
        let step = classify::reason(perception, goal, constraints);
        self.reasoning_chain.push(step.clone());
        step
    }

    pub fn decide(&mut self, reasoning: &ReasoningStep, perception: &Perception) -> Decision {
        let decision = classify::decide(reasoning, perception);
        log::debug!(
            "[{}] decided {} (confidence {:.2})",
            self.agent_name,
            decision.decision_type.as_str(),
            decision.confidence
        );
        self.decisions.push(decision.clone());
        decision
    }

    /// Build and install a fresh plan, replacing any previous one.
    pub fn plan_execution(&mut self, decision: &Decision, task_description: &str) -> ExecutionPlan {
        let now = Utc::now();
        let plan = ExecutionPlan {
            task_id: format!(
                "task_{}_{}_{}",
                self.agent_id,
                now.timestamp_micros(),
                &uuid::Uuid::new_v4().simple().to_string()[..8]
            ),
            task_description: task_description.to_string(),
            decision_type: decision.decision_type,
            steps: classify::plan_steps(decision),
            current_step: 0,
            status: PlanStatus::Pending,
            results: Vec::new(),
            created_at: now,
        };
        self.current_plan = Some(plan.clone());
        plan
    }

    pub fn process_feedback(
        &mut self,
        result: &str,
        expected_outcome: Option<&str>,
        success: bool,
    ) -> Feedback {
        let mut lessons_learned = Vec::new();
        let mut adjustments = Vec::new();

        if success {
            lessons_learned.push("Approach was successful".to_string());
            if let Some(expected) = expected_outcome {
                if classify::outcomes_match(result, expected) {
                    lessons_learned.push("Result matches expectations".to_string());
                } else {
                    lessons_learned
                        .push("Result differs from expectations but still successful".to_string());
                    adjustments.push("Consider revising expectations or approach".to_string());
                }
            }
        } else {
            lessons_learned.push("Approach failed".to_string());
            adjustments.push("Try alternative approach".to_string());
            adjustments.push("Consider using tools or requesting help".to_string());
            if let Some(last) = self.reasoning_chain.last() {
                adjustments.push(format!("Reconsider approach: {}", last.conclusion));
            }
        }

        let feedback = Feedback {
            result: result.to_string(),
            expected_outcome: expected_outcome.map(str::to_string),
            success,
            lessons_learned,
            adjustments,
            timestamp: Utc::now(),
        };
        self.feedback_history.push(feedback.clone());
        feedback
    }

    /// No-op without a current plan.
    pub fn update_plan_status(
        &mut self,
        step_number: usize,
        status: PlanStatus,
        result: Option<String>,
    ) {
        let Some(plan) = self.current_plan.as_mut() else {
            return;
        };

        plan.current_step = step_number;
        if status == PlanStatus::Completed {
            if let Some(result) = result {
                plan.results.push(StepResult {
                    step: step_number,
                    result,
                    timestamp: Utc::now(),
                });
            }
        }

        plan.status = if step_number >= plan.steps.len() {
            PlanStatus::Completed
        } else {
            PlanStatus::InProgress
        };
    }

    pub fn current_plan(&self) -> Option<&ExecutionPlan> {
        self.current_plan.as_ref()
    }

    pub fn current_perception(&self) -> Option<&Perception> {
        self.current_perception.as_ref()
    }

    pub fn reasoning_chain(&self) -> &[ReasoningStep] {
        &self.reasoning_chain
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    pub fn feedback_history(&self) -> &[Feedback] {
        &self.feedback_history
    }

    pub fn state_summary(&self) -> CognitiveState {
        CognitiveState {
            perception: self.current_perception.clone(),
            reasoning_chain_length: self.reasoning_chain.len(),
            decision_count: self.decisions.len(),
            current_plan: self.current_plan.clone(),
            feedback_history_length: self.feedback_history.len(),
        }
    }
}
