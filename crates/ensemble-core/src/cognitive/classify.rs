//! Rule-based classifiers and the pure stages of the pipeline.
//!
//! Every function here is deterministic in its inputs. Thresholds and keyword
//! lists are fixed, and for intent the first matching category wins.

use serde_json::Value;

use super::types::*;

const COMPLEX_KEYWORDS: &[&str] = &[
    "analyze",
    "design",
    "architect",
    "plan",
    "multiple",
    "complex",
    "integrate",
];

const INTENT_RULES: &[(Intent, &[&str])] = &[
    (Intent::Question, &["what", "how", "why", "when", "where", "?"]),
    (Intent::Creation, &["create", "build", "make", "generate", "write"]),
    (Intent::Analysis, &["analyze", "review", "check", "evaluate"]),
    (Intent::ProblemSolving, &["fix", "solve", "debug", "resolve"]),
    (Intent::Explanation, &["explain", "describe", "tell me about"]),
];

const URGENT_KEYWORDS: &[&str] = &["urgent", "asap", "immediately", "critical", "emergency"];
const SOFT_URGENCY_KEYWORDS: &[&str] = &["soon", "when possible", "please"];

const OUTCOME_OVERLAP_THRESHOLD: f64 = 0.3;

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

pub fn assess_complexity(message: &str, context_size: usize) -> Complexity {
    let length = message.chars().count();
    let mut score = 0;

    if length > 500 {
        score += 2;
    } else if length > 200 {
        score += 1;
    }

    if context_size > 5 {
        score += 1;
    }

    if contains_any(&message.to_lowercase(), COMPLEX_KEYWORDS) {
        score += 1;
    }

    match score {
        s if s >= 3 => Complexity::High,
        s if s >= 1 => Complexity::Medium,
        _ => Complexity::Low,
    }
}

pub fn identify_intent(message: &str) -> Intent {
    let lower = message.to_lowercase();
    INTENT_RULES
        .iter()
        .find(|(_, keywords)| contains_any(&lower, keywords))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::General)
}

pub fn assess_urgency(message: &str) -> Urgency {
    let lower = message.to_lowercase();
    if contains_any(&lower, URGENT_KEYWORDS) {
        Urgency::High
    } else if contains_any(&lower, SOFT_URGENCY_KEYWORDS) {
        Urgency::Medium
    } else {
        Urgency::Low
    }
}

/// `None`, JSON null, and an empty object all mean "not collaborating".
pub fn is_collaborating(collaboration_info: Option<&Value>) -> bool {
    match collaboration_info {
        None | Some(Value::Null) => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

pub fn perceive<T>(
    message: &str,
    context: &[T],
    available_tools: &[String],
    collaboration_info: Option<&Value>,
) -> Perception {
    let in_collaboration = is_collaborating(collaboration_info);
    Perception {
        message: message.to_string(),
        context_size: context.len(),
        available_tools: available_tools.to_vec(),
        in_collaboration,
        collaboration_info: collaboration_info.filter(|_| in_collaboration).cloned(),
        complexity: assess_complexity(message, context.len()),
        intent: identify_intent(message),
        urgency: assess_urgency(message),
    }
}

pub fn determine_approach(perception: &Perception) -> Approach {
    let has_tools = perception.has_tools();
    if perception.complexity == Complexity::High {
        Approach::MultiStepPlanning
    } else if perception.intent == Intent::Creation && has_tools {
        Approach::ToolsForCreation
    } else if perception.intent == Intent::Question {
        Approach::DirectAnswer
    } else if perception.intent == Intent::Analysis && has_tools {
        Approach::ToolsForAnalysis
    } else {
        Approach::DirectResponse
    }
}

pub fn reason(perception: &Perception, goal: &str, constraints: &[String]) -> ReasoningStep {
    let mut thoughts = vec![Thought {
        step: 1,
        kind: ThoughtKind::Understanding,
        content: format!("Task: {}. Intent: {}.", goal, perception.intent.as_str()),
    }];

    let mut resources = Vec::new();
    if perception.has_tools() {
        resources.push(format!("Tools: {}", perception.available_tools.join(", ")));
    }
    if perception.context_size > 0 {
        resources.push(format!("Context: {} messages", perception.context_size));
    }
    let resources = if resources.is_empty() {
        "None".to_string()
    } else {
        resources.join("; ")
    };
    thoughts.push(Thought {
        step: 2,
        kind: ThoughtKind::ResourceIdentification,
        content: format!("Available resources: {}", resources),
    });

    if !constraints.is_empty() {
        thoughts.push(Thought {
            step: 3,
            kind: ThoughtKind::ConstraintAnalysis,
            content: format!("Constraints: {}", constraints.join("; ")),
        });
    }

    let approach = determine_approach(perception);
    thoughts.push(Thought {
        step: 4,
        kind: ThoughtKind::Approach,
        content: format!("Recommended approach: {}", approach.as_str()),
    });

    ReasoningStep {
        goal: goal.to_string(),
        perception_summary: PerceptionSummary {
            complexity: perception.complexity,
            intent: perception.intent,
            urgency: perception.urgency,
        },
        constraints: constraints.to_vec(),
        thoughts,
        conclusion: approach.as_str().to_string(),
    }
}

pub fn planned_steps() -> Vec<PlanStep> {
    vec![
        PlanStep::new(1, "analyze_requirements", "Analyze task requirements and constraints"),
        PlanStep::new(2, "gather_information", "Gather necessary information and context"),
        PlanStep::new(3, "execute_task", "Execute the main task"),
        PlanStep::new(4, "verify_result", "Verify and validate the result"),
    ]
}

pub fn clarification_questions(perception: &Perception) -> Vec<String> {
    let mut questions = Vec::new();
    if perception.complexity == Complexity::High {
        questions.push(
            "Could you break down this task into more specific requirements?".to_string(),
        );
    }
    if perception.intent == Intent::General {
        questions.push("What specific outcome are you looking for?".to_string());
    }
    if perception.message.chars().count() < 20 {
        questions.push("Could you provide more details about what you need?".to_string());
    }
    if questions.is_empty() {
        questions.push("Could you clarify your requirements?".to_string());
    }
    questions
}

/// Checked in order: tool use, planning, clarification, delegation, immediate.
pub fn decide(reasoning: &ReasoningStep, perception: &Perception) -> Decision {
    let conclusion = reasoning.conclusion.to_lowercase();

    if conclusion.contains("tool") && perception.has_tools() {
        Decision {
            decision_type: DecisionType::ToolUse,
            action: "use_tool".to_string(),
            parameters: DecisionParameters::ToolUse {
                tools: perception.available_tools.clone(),
            },
            confidence: 0.8,
            rationale: "Task requires tool usage and tools are available".to_string(),
        }
    } else if perception.complexity == Complexity::High || conclusion.contains("plan") {
        Decision {
            decision_type: DecisionType::Planned,
            action: "create_plan".to_string(),
            parameters: DecisionParameters::Planned {
                steps: planned_steps(),
            },
            confidence: 0.7,
            rationale: "Complex task requires multi-step planning".to_string(),
        }
    } else if conclusion.contains("clarify") || conclusion.contains("unclear") {
        Decision {
            decision_type: DecisionType::Clarify,
            action: "ask_clarification".to_string(),
            parameters: DecisionParameters::Clarify {
                questions: clarification_questions(perception),
            },
            confidence: 0.6,
            rationale: "Task requirements are unclear".to_string(),
        }
    } else if perception.in_collaboration && conclusion.contains("delegate") {
        Decision {
            decision_type: DecisionType::Delegate,
            action: "delegate_task".to_string(),
            parameters: DecisionParameters::Delegate {
                collaboration_context: perception
                    .collaboration_info
                    .clone()
                    .unwrap_or_else(|| Value::Object(Default::default())),
            },
            confidence: 0.75,
            rationale: "Task can be better handled by another agent in collaboration".to_string(),
        }
    } else {
        Decision {
            decision_type: DecisionType::Immediate,
            action: "respond_directly".to_string(),
            parameters: DecisionParameters::Immediate {
                response_type: "direct".to_string(),
            },
            confidence: 0.85,
            rationale: "Task can be handled with immediate response".to_string(),
        }
    }
}

/// Steps for a decision. Planned decisions carry their own steps.
pub fn plan_steps(decision: &Decision) -> Vec<PlanStep> {
    match (&decision.decision_type, &decision.parameters) {
        (DecisionType::Planned, DecisionParameters::Planned { steps }) => steps.clone(),
        (DecisionType::Planned, _) => planned_steps(),
        (DecisionType::ToolUse, _) => vec![
            PlanStep::new(1, "select_tool", "Select appropriate tool"),
            PlanStep::new(2, "execute_tool", "Execute selected tool"),
            PlanStep::new(3, "process_result", "Process tool result"),
        ],
        (DecisionType::Immediate, _) => {
            vec![PlanStep::new(1, "generate_response", "Generate direct response")]
        }
        (DecisionType::Clarify, parameters) => {
            let mut step = PlanStep::new(1, "ask_questions", "Ask clarification questions");
            if let DecisionParameters::Clarify { questions } = parameters {
                step.questions = questions.clone();
            }
            vec![step]
        }
        (DecisionType::Delegate, _) => vec![
            PlanStep::new(1, "identify_delegate", "Identify best agent to delegate to"),
            PlanStep::new(2, "handoff", "Hand off task to selected agent"),
        ],
    }
}

/// More than 30% of the expected words appear in the actual result.
pub fn outcomes_match(actual: &str, expected: &str) -> bool {
    use std::collections::HashSet;

    let actual = actual.to_lowercase();
    let expected = expected.to_lowercase();
    let actual_words: HashSet<&str> = actual.split_whitespace().collect();
    let expected_words: HashSet<&str> = expected.split_whitespace().collect();

    let overlap = expected_words.intersection(&actual_words).count();
    overlap as f64 / expected_words.len().max(1) as f64 > OUTCOME_OVERLAP_THRESHOLD
}
