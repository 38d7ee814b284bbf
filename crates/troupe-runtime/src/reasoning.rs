// Troupe Runtime - Reasoning system
//
// A knowledge bag plus keyword-driven advisory surfaces. The keyword
// logic stands in for an LLM-backed implementation; callers only rely on
// getting well-formed textual advice back.

use parking_lot::Mutex;
use std::collections::HashMap;

use troupe_core::AgentData;

#[derive(Default)]
struct ReasoningInner {
    knowledge: HashMap<String, AgentData>,
    history: Vec<String>,
}

/// Advisory reasoning over a small knowledge base
#[derive(Default)]
pub struct ReasoningSystem {
    inner: Mutex<ReasoningInner>,
}

impl ReasoningSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_knowledge(&self, key: impl Into<String>, data: AgentData) {
        self.inner.lock().knowledge.insert(key.into(), data);
    }

    pub fn get_knowledge(&self, key: &str) -> Option<AgentData> {
        self.inner.lock().knowledge.get(key).cloned()
    }

    pub fn has_knowledge(&self, key: &str) -> bool {
        self.inner.lock().knowledge.contains_key(key)
    }

    pub fn remove_knowledge(&self, key: &str) -> bool {
        self.inner.lock().knowledge.remove(key).is_some()
    }

    /// Classify the question and describe the angle of analysis
    pub fn reason_about(&self, question: &str, context: &str) -> String {
        let mut reasoning = format!("Based on the question: '{}'", question);
        if !context.is_empty() {
            reasoning.push_str(&format!(" and the context: '{}'", context));
        }
        reasoning.push_str(", here is my analysis:\n\n");

        let question_lower = question.to_lowercase();
        reasoning.push_str(if question_lower.contains("what") {
            "This is a definitional question requiring factual information."
        } else if question_lower.contains("why") {
            "This question seeks causal explanations or reasons."
        } else if question_lower.contains("how") {
            "This question asks about processes or methods."
        } else if question_lower.contains("when") {
            "This question relates to timing or temporal information."
        } else {
            "This appears to be a general inquiry requiring analysis."
        });

        self.inner
            .lock()
            .history
            .push(format!("Q: {} | A: {}", question, reasoning));
        reasoning
    }

    /// Whether any available function plausibly covers the goal
    pub fn can_achieve_goal(&self, goal: &str, available_functions: &[String]) -> bool {
        let goal = goal.to_lowercase();
        available_functions.iter().any(|function| {
            let function = function.to_lowercase();
            (goal.contains("search") && function.contains("search"))
                || (goal.contains("analyze") && function.contains("analysis"))
                || (goal.contains("write") && function.contains("text"))
                || (goal.contains("research") && function.contains("search"))
        })
    }

    pub fn suggest_approach(&self, problem: &str, constraints: &str) -> String {
        let mut suggestion = format!("Suggested approach for: {}\n\n", problem);
        let problem_lower = problem.to_lowercase();

        if problem_lower.contains("research") {
            suggestion.push_str(
                "1. Define research scope and objectives\n\
                 2. Identify relevant sources and databases\n\
                 3. Gather and organize information\n\
                 4. Analyze and synthesize findings\n\
                 5. Present results and conclusions\n",
            );
        } else if problem_lower.contains("analysis") {
            suggestion.push_str(
                "1. Define analysis criteria and methodology\n\
                 2. Collect and prepare data\n\
                 3. Apply analytical techniques\n\
                 4. Interpret results\n\
                 5. Generate insights and recommendations\n",
            );
        } else {
            suggestion.push_str(
                "1. Break down the problem into smaller components\n\
                 2. Identify available resources and tools\n\
                 3. Develop a step-by-step plan\n\
                 4. Execute the plan systematically\n\
                 5. Review and refine the approach as needed\n",
            );
        }

        if !constraints.is_empty() {
            suggestion.push_str(&format!("\nConstraints to consider: {}", constraints));
        }
        suggestion
    }

    pub fn make_decision(&self, situation: &str, options: &[String], criteria: &str) -> String {
        if options.is_empty() {
            return "No options provided for decision making.".to_string();
        }
        if options.len() == 1 {
            return format!("Only one option available: {}", options[0]);
        }

        let mut decision = format!("Decision analysis for situation: {}\n\n", situation);
        decision.push_str("Available options:\n");
        for (i, option) in options.iter().enumerate() {
            decision.push_str(&format!("{}. {}\n", i + 1, option));
        }
        if !criteria.is_empty() {
            decision.push_str(&format!("\nEvaluation criteria: {}\n", criteria));
        }
        decision.push_str(&format!("\nRecommended option: 1. {}", options[0]));
        decision
            .push_str("\nReason: This option appears most suitable based on the available information.");
        decision
    }

    pub fn reflect_on_performance(&self, task_result: &str, expected_outcome: &str) -> String {
        let mut reflection = format!(
            "Performance reflection:\n\nTask result: {}\nExpected outcome: {}\n\n",
            task_result, expected_outcome
        );
        if task_result == expected_outcome {
            reflection.push_str("Assessment: Task completed successfully as expected.");
        } else {
            reflection.push_str(
                "Assessment: Task result differs from expected outcome. This suggests areas \
                 for improvement in task execution or expectation setting.",
            );
        }
        reflection
    }

    pub fn generate_clarifying_questions(&self, unclear_request: &str) -> Vec<String> {
        let mut questions = Vec::new();

        if unclear_request.contains("this") || unclear_request.contains("that") {
            questions.push("What specific item or concept are you referring to?".to_string());
        }
        if unclear_request.contains("analyze") {
            questions.push("What type of analysis are you looking for?".to_string());
            questions.push("What data or information should be analyzed?".to_string());
        }
        if unclear_request.contains("help") {
            questions.push("What specific aspect do you need help with?".to_string());
            questions.push("What is your end goal?".to_string());
        }
        questions.push("Are there any constraints or requirements I should be aware of?".to_string());
        questions
    }

    pub fn should_ask_for_help(&self, situation: &str) -> bool {
        let situation = situation.to_lowercase();
        ["stuck", "confused", "unclear", "uncertain"]
            .iter()
            .any(|marker| situation.contains(marker))
    }

    pub fn reasoning_history(&self) -> Vec<String> {
        self.inner.lock().history.clone()
    }

    pub fn clear_reasoning_history(&self) {
        self.inner.lock().history.clear();
    }
}
