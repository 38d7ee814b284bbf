// End-to-end workflow engine scenarios

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use troupe_core::{
    AgentData, AgentSettings, ExecutionState, FunctionSpec, ParameterSpec, TroupeError, ValueKind,
    WorkflowDefinition, WorkflowStep, WorkflowType,
};
use troupe_runtime::{closure_function, AgentManager, AsyncServiceLayer, WorkflowOrchestrator};

struct Harness {
    manager: Arc<AgentManager>,
    service: Arc<AsyncServiceLayer>,
    orchestrator: Arc<WorkflowOrchestrator>,
}

impl Harness {
    fn new() -> Self {
        let manager = Arc::new(AgentManager::new(None));
        let service = Arc::new(AsyncServiceLayer::new(4, 100));
        service.start();
        let orchestrator = Arc::new(WorkflowOrchestrator::new(manager.clone(), service.clone()));
        Self {
            manager,
            service,
            orchestrator,
        }
    }

    fn create_agent(&self, name: &str) -> String {
        self.manager.create(&AgentSettings::new(name)).unwrap()
    }

    async fn teardown(self) {
        self.service.shutdown().await;
    }
}

#[tokio::test]
async fn test_sequential_workflow_passes_results_downstream() {
    let harness = Harness::new();

    let a = harness.create_agent("upper");
    harness.manager.get(&a).unwrap().register_function(closure_function(
        FunctionSpec::new("capitalize", "Uppercase the text")
            .parameter(ParameterSpec::new("text", ValueKind::String).required()),
        |params| async move {
            Ok(AgentData::new().with("result", params.get_string_or("text", "").to_uppercase()))
        },
    ));

    let b = harness.create_agent("suffixer");
    harness.manager.get(&b).unwrap().register_function(closure_function(
        FunctionSpec::new("append", "Append a suffix"),
        |params| async move {
            // Upstream output arrives under "<step>.result"
            let upstream = params
                .get_map("s1.result")
                .and_then(|m| m.get_string("result"))
                .unwrap_or_default()
                .to_string();
            let suffix = params.get_string_or("suffix", "");
            Ok(AgentData::new().with("result", format!("{}{}", upstream, suffix)))
        },
    ));

    let workflow = WorkflowDefinition::new("w-seq", "sequential", WorkflowType::Sequential)
        .step(
            WorkflowStep::new("s1", a, "capitalize")
                .with_parameters(AgentData::new().with("text", "hello")),
        )
        .step(
            WorkflowStep::new("s2", b, "append")
                .with_parameters(AgentData::new().with("suffix", "!"))
                .depends_on("s1"),
        );
    harness.orchestrator.register_workflow(workflow).unwrap();

    let execution = harness
        .orchestrator
        .execute_workflow_sync("w-seq", AgentData::new())
        .await
        .unwrap();

    assert_eq!(execution.state, ExecutionState::Completed);
    assert!(execution.success);
    assert_eq!(
        execution.step_results["s1"].result.data.get_string("result"),
        Some("HELLO")
    );
    assert_eq!(
        execution.step_results["s2"].result.data.get_string("result"),
        Some("HELLO!")
    );

    harness.teardown().await;
}

#[tokio::test]
async fn test_circular_dependency_fails_without_running_steps() {
    let harness = Harness::new();
    let agent = harness.create_agent("solo");

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = hits.clone();
    harness
        .manager
        .get(&agent)
        .unwrap()
        .register_function(closure_function(
            FunctionSpec::new("noop", ""),
            move |_params| {
                let hits = hits_clone.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok(AgentData::new())
                }
            },
        ));

    let workflow = WorkflowDefinition::new("w-cycle", "cycle", WorkflowType::Sequential)
        .step(WorkflowStep::new("a", agent.clone(), "noop").depends_on("b"))
        .step(WorkflowStep::new("b", agent, "noop").depends_on("a"));
    harness.orchestrator.register_workflow(workflow).unwrap();

    let execution = harness
        .orchestrator
        .execute_workflow_sync("w-cycle", AgentData::new())
        .await
        .unwrap();

    assert_eq!(execution.state, ExecutionState::Failed);
    assert!(!execution.success);
    assert_eq!(
        execution.error,
        "Circular dependency detected or missing dependencies"
    );
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(execution.step_results.is_empty());

    harness.teardown().await;
}

#[tokio::test]
async fn test_parallel_steps_run_concurrently() {
    let harness = Harness::new();

    let mut ids = Vec::new();
    for i in 0..3 {
        let id = harness.create_agent(&format!("worker-{}", i));
        harness.manager.get(&id).unwrap().register_function(closure_function(
            FunctionSpec::new("slow", ""),
            |_params| async move {
                tokio::time::sleep(Duration::from_millis(80)).await;
                Ok(AgentData::new().with("done", true))
            },
        ));
        ids.push(id);
    }

    let mut workflow = WorkflowDefinition::new("w-par", "parallel", WorkflowType::Parallel);
    for (i, id) in ids.iter().enumerate() {
        workflow = workflow.step(WorkflowStep::new(format!("p{}", i), id.clone(), "slow").parallel());
    }
    harness.orchestrator.register_workflow(workflow).unwrap();

    let started = std::time::Instant::now();
    let execution = harness
        .orchestrator
        .execute_workflow_sync("w-par", AgentData::new())
        .await
        .unwrap();

    assert!(execution.success);
    assert_eq!(execution.step_results.len(), 3);
    // Three 80ms steps in parallel finish well under the serial 240ms
    assert!(started.elapsed() < Duration::from_millis(220));

    harness.teardown().await;
}

#[tokio::test]
async fn test_failed_step_blocks_dependents_but_not_independents() {
    let harness = Harness::new();
    let agent = harness.create_agent("mixed");
    let agent_handle = harness.manager.get(&agent).unwrap();

    agent_handle.register_function(closure_function(
        FunctionSpec::new("fail", ""),
        |_params| async move { Err(TroupeError::internal("deliberate failure")) },
    ));
    agent_handle.register_function(closure_function(
        FunctionSpec::new("ok", ""),
        |_params| async move { Ok(AgentData::new().with("fine", true)) },
    ));

    let workflow = WorkflowDefinition::new("w-soft", "soft-fail", WorkflowType::Sequential)
        .step(WorkflowStep::new("bad", agent.clone(), "fail"))
        .step(WorkflowStep::new("blocked", agent.clone(), "ok").depends_on("bad"))
        .step(WorkflowStep::new("independent", agent, "ok"));
    harness.orchestrator.register_workflow(workflow).unwrap();

    let execution = harness
        .orchestrator
        .execute_workflow_sync("w-soft", AgentData::new())
        .await
        .unwrap();

    assert_eq!(execution.state, ExecutionState::Failed);
    assert!(!execution.success);
    // The independent step still ran; the blocked one never did
    assert!(execution.step_results.contains_key("independent"));
    assert!(!execution.step_results.contains_key("blocked"));
    assert!(execution.error.contains("bad"));

    // Soft-failure annotations on the failed step
    let bad = &execution.step_results["bad"];
    assert_eq!(
        bad.result.data.get_string("warning"),
        Some("Function failed but workflow continued")
    );
    assert_eq!(bad.result.data.get_string("step_id"), Some("bad"));

    harness.teardown().await;
}

#[tokio::test]
async fn test_optional_step_failure_keeps_workflow_successful() {
    let harness = Harness::new();
    let agent = harness.create_agent("opt");
    let handle = harness.manager.get(&agent).unwrap();
    handle.register_function(closure_function(FunctionSpec::new("fail", ""), |_p| async {
        Err(TroupeError::internal("optional blow-up"))
    }));
    handle.register_function(closure_function(FunctionSpec::new("ok", ""), |_p| async {
        Ok(AgentData::new())
    }));

    let workflow = WorkflowDefinition::new("w-opt", "optional", WorkflowType::Sequential)
        .step(WorkflowStep::new("maybe", agent.clone(), "fail").optional())
        .step(
            WorkflowStep::new("after", agent, "ok")
                .depends_on("maybe")
                .optional(),
        );
    harness.orchestrator.register_workflow(workflow).unwrap();

    let execution = harness
        .orchestrator
        .execute_workflow_sync("w-opt", AgentData::new())
        .await
        .unwrap();

    assert_eq!(execution.state, ExecutionState::Completed);
    assert!(execution.success);
    assert!(execution.step_results.contains_key("after"));

    harness.teardown().await;
}

#[tokio::test]
async fn test_step_retries() {
    let harness = Harness::new();
    let agent = harness.create_agent("flaky");
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = attempts.clone();
    harness.manager.get(&agent).unwrap().register_function(closure_function(
        FunctionSpec::new("flaky", ""),
        move |_params| {
            let attempts = attempts_clone.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TroupeError::internal("transient"))
                } else {
                    Ok(AgentData::new().with("ok", true))
                }
            }
        },
    ));

    let workflow = WorkflowDefinition::new("w-retry", "retry", WorkflowType::Sequential)
        .step(WorkflowStep::new("r", agent, "flaky").retries(2));
    harness.orchestrator.register_workflow(workflow).unwrap();

    let execution = harness
        .orchestrator
        .execute_workflow_sync("w-retry", AgentData::new())
        .await
        .unwrap();

    assert!(execution.success);
    assert_eq!(execution.step_results["r"].attempts, 3);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    harness.teardown().await;
}

#[tokio::test]
async fn test_step_timeout_records_failure() {
    let harness = Harness::new();
    let agent = harness.create_agent("sluggish");
    harness.manager.get(&agent).unwrap().register_function(closure_function(
        FunctionSpec::new("sleep_forever", ""),
        |_params| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(AgentData::new())
        },
    ));

    let workflow = WorkflowDefinition::new("w-timeout", "timeout", WorkflowType::Sequential)
        .step(WorkflowStep::new("t", agent, "sleep_forever").timeout_ms(60));
    harness.orchestrator.register_workflow(workflow).unwrap();

    let execution = harness
        .orchestrator
        .execute_workflow_sync("w-timeout", AgentData::new())
        .await
        .unwrap();

    assert!(!execution.success);
    assert!(execution.step_results["t"].result.error.contains("timeout"));

    harness.teardown().await;
}

#[tokio::test]
async fn test_function_substitution_web_search() {
    let harness = Harness::new();
    // Default function set includes text_processing but not web_search
    let agent = harness.create_agent("searcher");

    let workflow = WorkflowDefinition::new("w-sub", "substitution", WorkflowType::Sequential)
        .step(
            WorkflowStep::new("search", agent, "web_search")
                .with_parameters(AgentData::new().with("text", "rust orchestration")),
        );
    harness.orchestrator.register_workflow(workflow).unwrap();

    let execution = harness
        .orchestrator
        .execute_workflow_sync("w-sub", AgentData::new())
        .await
        .unwrap();

    assert!(execution.success);
    let record = &execution.step_results["search"];
    assert_eq!(record.function_name, "text_processing");
    assert_eq!(record.result.data.get_bool("simulated"), Some(true));

    harness.teardown().await;
}

#[tokio::test]
async fn test_unknown_function_on_bare_agent_lists_alternatives() {
    let harness = Harness::new();
    let mut settings = AgentSettings::new("bare");
    settings.functions = vec!["echo".to_string()];
    let agent = harness.manager.create(&settings).unwrap();

    let workflow = WorkflowDefinition::new("w-miss", "missing-fn", WorkflowType::Sequential)
        .step(WorkflowStep::new("m", agent, "data_analysis"));
    harness.orchestrator.register_workflow(workflow).unwrap();

    let execution = harness
        .orchestrator
        .execute_workflow_sync("w-miss", AgentData::new())
        .await
        .unwrap();

    assert!(!execution.success);
    let error = &execution.step_results["m"].result.error;
    assert!(error.contains("Function 'data_analysis' not available"));
    assert!(error.contains("Available:"));

    harness.teardown().await;
}

#[tokio::test]
async fn test_missing_agent_is_soft_failure() {
    let harness = Harness::new();
    let agent = harness.create_agent("exists");

    let workflow = WorkflowDefinition::new("w-ghost", "ghost-agent", WorkflowType::Sequential)
        .step(WorkflowStep::new("ghost", "agent_does_not_exist", "echo"))
        .step(WorkflowStep::new("real", agent, "echo"));
    harness.orchestrator.register_workflow(workflow).unwrap();

    let execution = harness
        .orchestrator
        .execute_workflow_sync("w-ghost", AgentData::new())
        .await
        .unwrap();

    assert!(!execution.success);
    assert!(execution.step_results["ghost"]
        .result
        .error
        .contains("not found"));
    // The other step still executed
    assert!(execution.step_results["real"].result.success);

    harness.teardown().await;
}

#[tokio::test]
async fn test_pause_resume_cancel_transitions() {
    let harness = Harness::new();
    let agent = harness.create_agent("pausable");
    harness.manager.get(&agent).unwrap().register_function(closure_function(
        FunctionSpec::new("slow", ""),
        |_params| async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            Ok(AgentData::new())
        },
    ));

    let mut workflow = WorkflowDefinition::new("w-pause", "pausable", WorkflowType::Sequential);
    for i in 0..4 {
        let mut step = WorkflowStep::new(format!("s{}", i), agent.clone(), "slow");
        if i > 0 {
            step = step.depends_on(format!("s{}", i - 1));
        }
        workflow = workflow.step(step);
    }
    harness.orchestrator.register_workflow(workflow).unwrap();

    let execution_id = harness
        .orchestrator
        .execute_workflow("w-pause", AgentData::new())
        .unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(harness.orchestrator.pause_execution(&execution_id));
    // Pausing a paused execution is a no-op
    assert!(!harness.orchestrator.pause_execution(&execution_id));

    tokio::time::sleep(Duration::from_millis(150)).await;
    let paused = harness.orchestrator.get_execution(&execution_id).unwrap();
    assert_eq!(paused.state, ExecutionState::Paused);
    // Progress halted while paused: at most the in-flight step finished
    assert!(paused.step_results.len() <= 2);

    assert!(harness.orchestrator.resume_execution(&execution_id));
    assert!(harness.orchestrator.cancel_execution(&execution_id));

    tokio::time::sleep(Duration::from_millis(200)).await;
    let cancelled = harness.orchestrator.get_execution(&execution_id).unwrap();
    assert_eq!(cancelled.state, ExecutionState::Cancelled);
    // Terminal states absorb further control calls
    assert!(!harness.orchestrator.resume_execution(&execution_id));
    assert!(!harness.orchestrator.cancel_execution(&execution_id));

    harness.teardown().await;
}

#[tokio::test]
async fn test_duplicate_workflow_registration_conflicts() {
    let harness = Harness::new();
    let agent = harness.create_agent("a");
    let workflow = WorkflowDefinition::new("w-dup", "dup", WorkflowType::Sequential)
        .step(WorkflowStep::new("s", agent, "echo"));

    harness.orchestrator.register_workflow(workflow.clone()).unwrap();
    assert!(matches!(
        harness.orchestrator.register_workflow(workflow),
        Err(TroupeError::Conflict(_))
    ));

    assert!(harness.orchestrator.remove_workflow("w-dup"));
    assert!(!harness.orchestrator.remove_workflow("w-dup"));

    harness.teardown().await;
}

#[tokio::test]
async fn test_execute_unknown_workflow_not_found() {
    let harness = Harness::new();
    let err = harness
        .orchestrator
        .execute_workflow("nope", AgentData::new())
        .unwrap_err();
    assert!(matches!(err, TroupeError::NotFound(_)));
    harness.teardown().await;
}
