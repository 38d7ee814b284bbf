// Troupe Runtime - Built-in agent functions
//
// The standard function set installed on agents at creation time, plus the
// closure adapter used to register ad-hoc functions.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use troupe_core::{
    AgentData, FunctionSpec, ModelParameters, ParameterSpec, TroupeError, TroupeResult, Value,
    ValueKind,
};
use troupe_llm::InferenceClient;

use crate::agent::AgentFunction;

struct ClosureFunction<F> {
    spec: FunctionSpec,
    callable: F,
}

#[async_trait]
impl<F, Fut> AgentFunction for ClosureFunction<F>
where
    F: Fn(AgentData) -> Fut + Send + Sync,
    Fut: Future<Output = TroupeResult<AgentData>> + Send,
{
    fn spec(&self) -> &FunctionSpec {
        &self.spec
    }

    async fn execute(&self, params: AgentData) -> TroupeResult<AgentData> {
        (self.callable)(params).await
    }
}

/// Wrap an async closure as an agent function
pub fn closure_function<F, Fut>(spec: FunctionSpec, callable: F) -> Arc<dyn AgentFunction>
where
    F: Fn(AgentData) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TroupeResult<AgentData>> + Send + 'static,
{
    Arc::new(ClosureFunction { spec, callable })
}

/// Echoes its parameters back
fn echo_function() -> Arc<dyn AgentFunction> {
    closure_function(
        FunctionSpec::new("echo", "Return the input parameters unchanged"),
        |params| async move {
            let mut data = params;
            data.set("echoed", true);
            Ok(data)
        },
    )
}

/// Pass-through transformer used by the default collaboration chain
fn process_function() -> Arc<dyn AgentFunction> {
    closure_function(
        FunctionSpec::new("process", "Process the input and hand it onward"),
        |params| async move {
            let mut data = AgentData::new();
            data.set("result", params.clone());
            data.set("processed", true);
            Ok(data)
        },
    )
}

fn text_processing_spec() -> FunctionSpec {
    FunctionSpec::new("text_processing", "Local text operations")
        .parameter(ParameterSpec::new("text", ValueKind::String).with_default(""))
        .parameter(
            ParameterSpec::new("operation", ValueKind::String)
                .with_default("uppercase")
                .one_of(vec![
                    "uppercase".into(),
                    "lowercase".into(),
                    "reverse".into(),
                    "word_count".into(),
                    "web_search_simulation".into(),
                    "code_generation".into(),
                ]),
        )
}

/// Keyword-free local text operations; also the substitution target for
/// web_search and code_generation steps
fn text_processing_function() -> Arc<dyn AgentFunction> {
    closure_function(text_processing_spec(), |params| async move {
        let text = params.get_string_or("text", "");
        let operation = params.get_string_or("operation", "uppercase");

        let mut data = AgentData::new();
        match operation.as_str() {
            "uppercase" => data.set("result", text.to_uppercase()),
            "lowercase" => data.set("result", text.to_lowercase()),
            "reverse" => data.set("result", text.chars().rev().collect::<String>()),
            "word_count" => {
                data.set("result", text.split_whitespace().count());
            }
            "web_search_simulation" => {
                let query = if text.is_empty() {
                    params.get_string_or("query", "")
                } else {
                    text
                };
                let results: Vec<Value> = (1..=3)
                    .map(|i| {
                        Value::Map(
                            AgentData::new()
                                .with("title", format!("Result {} for '{}'", i, query))
                                .with("snippet", format!("Simulated finding {} about {}", i, query))
                                .with("rank", i as i64),
                        )
                    })
                    .collect();
                data.set("results", results);
                data.set("query", query);
                data.set("simulated", true);
            }
            "code_generation" => {
                let description = if text.is_empty() {
                    params.get_string_or("description", "")
                } else {
                    text
                };
                data.set(
                    "result",
                    format!("// generated stub\n// task: {}\nfn main() {{}}\n", description),
                );
                data.set("language", "rust");
            }
            other => {
                return Err(TroupeError::validation(format!(
                    "unknown text operation '{}'",
                    other
                )))
            }
        }
        data.set("operation", operation);
        Ok(data)
    })
}

/// Chat with the external inference service using the agent's model
fn inference_function(
    client: Option<Arc<InferenceClient>>,
    model: ModelParameters,
    system_prompt: Option<String>,
) -> Arc<dyn AgentFunction> {
    let spec = FunctionSpec::new("inference", "Chat completion through the inference service")
        .parameter(ParameterSpec::new("prompt", ValueKind::String).required())
        .parameter(ParameterSpec::new("model", ValueKind::String));

    closure_function(spec, move |params| {
        let client = client.clone();
        let model = model.clone();
        let system_prompt = system_prompt.clone();
        async move {
            let Some(client) = client else {
                return Err(TroupeError::inference("inference service not configured"));
            };
            let prompt = params.get_string_or("prompt", "");
            let model_id = params.get_string_or("model", &model.model);

            let reply = client
                .chat(&model_id, &prompt, system_prompt.as_deref())
                .await?;

            Ok(AgentData::new()
                .with("result", reply)
                .with("model", model_id))
        }
    })
}

/// Deterministic local vote used by the consensus pattern when agents do
/// not carry a bespoke analyze_and_vote implementation. Deterministic on
/// the input alone so identical inputs group into one vote bucket.
fn analyze_and_vote_function() -> Arc<dyn AgentFunction> {
    let spec = FunctionSpec::new("analyze_and_vote", "Analyze a topic and cast a vote")
        .parameter(ParameterSpec::new("topic", ValueKind::String).with_default(""));

    closure_function(spec, |params| async move {
        let topic = params.get_string_or("topic", "").to_lowercase();
        let affirmative = ["should", "adopt", "enable", "improve", "benefit"];
        let verdict = if affirmative.iter().any(|kw| topic.contains(kw)) {
            "yes"
        } else {
            "needs_review"
        };

        Ok(AgentData::new()
            .with("verdict", verdict)
            .with("topic", params.get_string_or("topic", "")))
    })
}

/// Master-side function of the hierarchy pattern
fn coordinate_function() -> Arc<dyn AgentFunction> {
    let spec = FunctionSpec::new("coordinate", "Coordinate subordinate agents");

    closure_function(spec, |params| async move {
        let directives: Vec<Value> = params
            .keys()
            .map(|key| {
                Value::Map(
                    AgentData::new()
                        .with("input_key", key)
                        .with("action", "delegate"),
                )
            })
            .collect();

        Ok(AgentData::new()
            .with("strategy", "hierarchy")
            .with("directives", directives)
            .with("input", params.clone()))
    })
}

/// One negotiation round: annotate the proposal, concede on later rounds
fn negotiate_function() -> Arc<dyn AgentFunction> {
    let spec = FunctionSpec::new("negotiate", "Respond to the current proposal");

    closure_function(spec, |params| async move {
        let round = params.get_int_or("round", 0);
        let mut proposal = params.clone();
        proposal.set("round", round + 1);
        proposal.set("accepted", round >= 1);
        Ok(proposal)
    })
}

/// The default function set installed on a new agent
pub fn default_function_set(
    client: Option<Arc<InferenceClient>>,
    model: &ModelParameters,
    system_prompt: Option<&str>,
) -> Vec<Arc<dyn AgentFunction>> {
    vec![
        echo_function(),
        process_function(),
        text_processing_function(),
        inference_function(
            client,
            model.clone(),
            system_prompt.map(|s| s.to_string()),
        ),
        analyze_and_vote_function(),
        coordinate_function(),
        negotiate_function(),
    ]
}

/// Subset of the default set by name; unknown names are skipped with the
/// full set acting as the catalog. An empty list selects everything.
pub fn function_set_by_names(
    names: &[String],
    client: Option<Arc<InferenceClient>>,
    model: &ModelParameters,
    system_prompt: Option<&str>,
) -> Vec<Arc<dyn AgentFunction>> {
    let all = default_function_set(client, model, system_prompt);
    if names.is_empty() {
        return all;
    }
    all.into_iter()
        .filter(|f| names.iter().any(|n| n == &f.spec().name))
        .collect()
}
