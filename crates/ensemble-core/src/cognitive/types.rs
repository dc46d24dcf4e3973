//! Value types produced by the cognitive pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Question,
    Creation,
    Analysis,
    ProblemSolving,
    Explanation,
    General,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Question => "question",
            Intent::Creation => "creation",
            Intent::Analysis => "analysis",
            Intent::ProblemSolving => "problem_solving",
            Intent::Explanation => "explanation",
            Intent::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
        }
    }
}

/// Approach chosen by reasoning. Its text becomes the reasoning conclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approach {
    MultiStepPlanning,
    ToolsForCreation,
    DirectAnswer,
    ToolsForAnalysis,
    DirectResponse,
}

impl Approach {
    pub fn as_str(self) -> &'static str {
        match self {
            Approach::MultiStepPlanning => "multi-step planning required",
            Approach::ToolsForCreation => "use tools for creation",
            Approach::DirectAnswer => "provide direct answer",
            Approach::ToolsForAnalysis => "use tools for analysis",
            Approach::DirectResponse => "direct response",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Perception {
    pub message: String,
    pub context_size: usize,
    pub available_tools: Vec<String>,
    pub in_collaboration: bool,
    pub collaboration_info: Option<Value>,
    pub complexity: Complexity,
    pub intent: Intent,
    pub urgency: Urgency,
}

impl Perception {
    pub fn has_tools(&self) -> bool {
        !self.available_tools.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerceptionSummary {
    pub complexity: Complexity,
    pub intent: Intent,
    pub urgency: Urgency,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtKind {
    Understanding,
    ResourceIdentification,
    ConstraintAnalysis,
    Approach,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Thought {
    pub step: u32,
    pub kind: ThoughtKind,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasoningStep {
    pub goal: String,
    pub perception_summary: PerceptionSummary,
    pub constraints: Vec<String>,
    pub thoughts: Vec<Thought>,
    pub conclusion: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Immediate,
    Planned,
    ToolUse,
    Delegate,
    Clarify,
}

impl DecisionType {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionType::Immediate => "immediate",
            DecisionType::Planned => "planned",
            DecisionType::ToolUse => "tool_use",
            DecisionType::Delegate => "delegate",
            DecisionType::Clarify => "clarify",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    pub step_number: usize,
    pub action: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<String>,
}

impl PlanStep {
    pub fn new(step_number: usize, action: &str, description: &str) -> Self {
        Self {
            step_number,
            action: action.to_string(),
            description: description.to_string(),
            questions: Vec::new(),
        }
    }
}

/// Decision-specific parameters. One variant per decision type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionParameters {
    Immediate { response_type: String },
    Planned { steps: Vec<PlanStep> },
    ToolUse { tools: Vec<String> },
    Delegate { collaboration_context: Value },
    Clarify { questions: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub decision_type: DecisionType,
    pub action: String,
    pub parameters: DecisionParameters,
    pub confidence: f64,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub step: usize,
    pub result: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionPlan {
    pub task_id: String,
    pub task_description: String,
    pub decision_type: DecisionType,
    pub steps: Vec<PlanStep>,
    pub current_step: usize,
    pub status: PlanStatus,
    pub results: Vec<StepResult>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    pub result: String,
    pub expected_outcome: Option<String>,
    pub success: bool,
    pub lessons_learned: Vec<String>,
    pub adjustments: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CognitiveState {
    pub perception: Option<Perception>,
    pub reasoning_chain_length: usize,
    pub decision_count: usize,
    pub current_plan: Option<ExecutionPlan>,
    pub feedback_history_length: usize,
}
