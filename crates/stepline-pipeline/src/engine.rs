//! Workflow engine: sequential step execution.
//!
//! Each step moves Pending → Skipped, or Pending → Running → Succeeded |
//! Failed. Steps run strictly in declared order. A failing step is recorded
//! and the run continues with the next one.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connector::{ConnectorContext, ConnectorRegistry};
use crate::context::DataFlowContext;
use crate::definition::{StepSpec, WorkflowDefinition};
use crate::error::PipelineError;
use crate::registry::WorkflowRegistry;
use crate::result::{StepResult, StepStatus, WorkflowResult};

/// Default upper bound on a single step attempt.
pub const DEFAULT_STEP_TIMEOUT_CEILING: Duration = Duration::from_secs(300);

/// Error reported on a run that was cancelled.
pub const RUN_CANCELLED: &str = "workflow run cancelled";

/// Configuration for the workflow engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for steps without a timeout, and cap for steps with one.
    pub step_timeout_ceiling: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout_ceiling: DEFAULT_STEP_TIMEOUT_CEILING,
        }
    }
}

impl EngineConfig {
    pub fn with_step_timeout_ceiling(mut self, ceiling: Duration) -> Self {
        self.step_timeout_ceiling = ceiling;
        self
    }
}

/// Runs registered workflows against a set of connectors.
///
/// Cheap to share: many runs may execute concurrently against one engine,
/// each with its own [`DataFlowContext`].
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    workflows: Arc<WorkflowRegistry>,
    connectors: Arc<ConnectorRegistry>,
    config: EngineConfig,
}

impl WorkflowEngine {
    pub fn new(workflows: Arc<WorkflowRegistry>, connectors: Arc<ConnectorRegistry>) -> Self {
        Self {
            workflows,
            connectors,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn workflows(&self) -> &Arc<WorkflowRegistry> {
        &self.workflows
    }

    pub fn connectors(&self) -> &Arc<ConnectorRegistry> {
        &self.connectors
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a registered workflow by id.
    ///
    /// An unknown id yields an unsuccessful result rather than an error.
    pub async fn execute(
        &self,
        workflow_id: &str,
        session_id: &str,
        input: Map<String, Value>,
    ) -> WorkflowResult {
        self.execute_with_cancel(workflow_id, session_id, input, CancellationToken::new())
            .await
    }

    /// Run a registered workflow, stopping early when `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        workflow_id: &str,
        session_id: &str,
        input: Map<String, Value>,
        cancel: CancellationToken,
    ) -> WorkflowResult {
        let Some(definition) = self.workflows.get(workflow_id) else {
            warn!(workflow = %workflow_id, "workflow not found");
            return WorkflowResult::failure(
                PipelineError::WorkflowNotFound(workflow_id.to_string()).to_string(),
                0,
            );
        };
        self.run_definition(definition, session_id, input, &cancel)
            .await
    }

    /// Run an already resolved definition.
    ///
    /// `input` is the final, defaulted parameter bag; it is not validated here.
    pub async fn run_definition(
        &self,
        definition: Arc<WorkflowDefinition>,
        session_id: &str,
        input: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> WorkflowResult {
        let started = Instant::now();
        info!(
            workflow = %definition.id,
            session = %session_id,
            steps = definition.steps.len(),
            "workflow run started"
        );

        let mut ctx = DataFlowContext::new(session_id, input);
        let mut step_results = Vec::with_capacity(definition.steps.len());
        let mut cancelled = false;

        for step in &definition.steps {
            if cancelled || cancel.is_cancelled() {
                cancelled = true;
                debug!(workflow = %definition.id, step = %step.id, "run cancelled, skipping");
                step_results.push(StepResult::skipped(&step.id));
                continue;
            }

            if !ctx.resolver().condition_holds(step.condition.as_deref()) {
                debug!(
                    workflow = %definition.id,
                    step = %step.id,
                    condition = step.condition.as_deref().unwrap_or_default(),
                    "condition not met, skipping"
                );
                step_results.push(StepResult::skipped(&step.id));
                continue;
            }

            let params = ctx.resolver().resolve_map(&step.parameters);
            let (result, was_cancelled) =
                self.run_step(&definition, step, &params, &ctx, cancel).await;
            cancelled = was_cancelled;

            ctx.record(result.clone());
            step_results.push(result);
        }

        let outputs = resolve_outputs(&definition, &ctx);
        let mut result = WorkflowResult {
            is_success: !cancelled,
            execution_time_ms: elapsed_ms(started),
            outputs,
            metadata: Map::new(),
            step_results,
            error: cancelled.then(|| RUN_CANCELLED.to_string()),
        };
        result.metadata = run_metadata(&definition, session_id, &result);

        info!(
            workflow = %definition.id,
            session = %session_id,
            succeeded = result.count(StepStatus::Succeeded),
            failed = result.count(StepStatus::Failed),
            skipped = result.count(StepStatus::Skipped),
            duration_ms = result.execution_time_ms,
            cancelled,
            "workflow run finished"
        );
        result
    }

    /// Attempt loop for one step. The flag reports cancellation.
    async fn run_step(
        &self,
        definition: &WorkflowDefinition,
        step: &StepSpec,
        params: &Map<String, Value>,
        ctx: &DataFlowContext,
        cancel: &CancellationToken,
    ) -> (StepResult, bool) {
        let policy = step.retry();
        let max_attempts = policy.max_attempts.max(1);
        let deadline = step.effective_timeout(self.config.step_timeout_ceiling);
        let started = Instant::now();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let connector_ctx = ConnectorContext {
                session_id: ctx.session_id().to_string(),
                workflow_id: definition.id.clone(),
                step_id: step.id.clone(),
                attempt,
                cancellation: cancel.clone(),
            };

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(PipelineError::Cancelled),
                res = tokio::time::timeout(
                    deadline,
                    self.connectors.invoke(&step.connector, &step.operation, params, &connector_ctx),
                ) => match res {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(PipelineError::from(e)),
                    Err(_) => Err(PipelineError::Timeout(deadline)),
                },
            };

            let error = match outcome {
                Ok(value) => {
                    debug!(
                        workflow = %definition.id,
                        step = %step.id,
                        attempt,
                        duration_ms = elapsed_ms(started),
                        "step succeeded"
                    );
                    return (
                        StepResult::succeeded(&step.id, value, elapsed_ms(started), attempt),
                        false,
                    );
                }
                Err(PipelineError::Cancelled) => return cancelled_step(step, started, attempt),
                Err(e) => e,
            };

            if attempt < max_attempts {
                let delay = policy.delay_after(attempt);
                warn!(
                    workflow = %definition.id,
                    step = %step.id,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "step attempt failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return cancelled_step(step, started, attempt),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            } else {
                warn!(
                    workflow = %definition.id,
                    step = %step.id,
                    attempts = attempt,
                    error = %error,
                    "step failed"
                );
            }
            last_error = Some(error);
        }

        let message = last_error.map(|e| e.to_string()).unwrap_or_default();
        (
            StepResult::failed(&step.id, message, elapsed_ms(started), max_attempts),
            false,
        )
    }
}

fn cancelled_step(step: &StepSpec, started: Instant, attempt: u32) -> (StepResult, bool) {
    let result = StepResult::failed(
        &step.id,
        PipelineError::Cancelled.to_string(),
        elapsed_ms(started),
        attempt,
    );
    (result, true)
}

/// Outputs whose source resolves to a defined value.
fn resolve_outputs(definition: &WorkflowDefinition, ctx: &DataFlowContext) -> Map<String, Value> {
    let resolver = ctx.resolver();
    definition
        .outputs
        .iter()
        .filter_map(|(name, spec)| {
            resolver
                .resolve_str(&spec.source)
                .map(|value| (name.clone(), value))
        })
        .collect()
}

fn run_metadata(
    definition: &WorkflowDefinition,
    session_id: &str,
    result: &WorkflowResult,
) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("workflowId".into(), json!(definition.id));
    metadata.insert("workflowVersion".into(), json!(definition.version));
    metadata.insert("sessionId".into(), json!(session_id));
    metadata.insert(
        "stepsSucceeded".into(),
        json!(result.count(StepStatus::Succeeded)),
    );
    metadata.insert("stepsFailed".into(), json!(result.count(StepStatus::Failed)));
    metadata.insert(
        "stepsSkipped".into(),
        json!(result.count(StepStatus::Skipped)),
    );
    metadata
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{Connector, ConnectorError, ConnectorResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `fail_first` calls, optionally sleeping per call.
    struct ScriptedConnector {
        name: String,
        calls: Arc<AtomicU32>,
        fail_first: u32,
        delay: Option<Duration>,
    }

    impl ScriptedConnector {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                calls: Arc::new(AtomicU32::new(0)),
                fail_first: 0,
                delay: None,
            }
        }

        fn failing(mut self, n: u32) -> Self {
            self.fail_first = n;
            self
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> Arc<AtomicU32> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        fn name(&self) -> &str {
            &self.name
        }

        async fn invoke(
            &self,
            operation: &str,
            params: &Map<String, Value>,
            _ctx: &ConnectorContext,
        ) -> ConnectorResult {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if n <= self.fail_first {
                return Err(ConnectorError::failed(format!("attempt {} failed", n)));
            }
            Ok(json!({"operation": operation, "params": params, "call": n}))
        }
    }

    fn engine(definitions: &[&str], connectors: Vec<ScriptedConnector>) -> WorkflowEngine {
        let workflows = Arc::new(WorkflowRegistry::new());
        for def in definitions {
            workflows
                .register(WorkflowDefinition::from_json(def).unwrap())
                .unwrap();
        }
        let mut registry = ConnectorRegistry::new();
        for c in connectors {
            registry.register(c);
        }
        WorkflowEngine::new(workflows, Arc::new(registry))
    }

    fn input(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    const CHAIN: &str = r#"{
        "id": "chain",
        "version": "2.0",
        "steps": [
            {"id": "first", "connector": "svc", "operation": "lookup",
             "parameters": {"name": "${input.name}"}},
            {"id": "second", "connector": "svc", "operation": "greet",
             "parameters": {"who": "${first.result.params.name}", "greeting": "Hi ${input.name}"}}
        ],
        "outputs": {
            "greeting": {"source": "${second.result.params.greeting}"},
            "firstCall": {"source": "${first.result.call}"},
            "missing": {"source": "${first.result.nope}"}
        }
    }"#;

    #[tokio::test]
    async fn test_steps_feed_later_steps() {
        let engine = engine(&[CHAIN], vec![ScriptedConnector::new("svc")]);
        let result = engine
            .execute("chain", "s1", input(&[("name", json!("Ada"))]))
            .await;

        assert!(result.is_success);
        assert_eq!(result.step_results.len(), 2);
        assert_eq!(
            result.step("second").and_then(|r| r.result.clone()),
            Some(json!({
                "operation": "greet",
                "params": {"who": "Ada", "greeting": "Hi Ada"},
                "call": 2
            }))
        );
        assert_eq!(result.outputs["greeting"], json!("Hi Ada"));
        assert_eq!(result.outputs["firstCall"], json!(1));
        assert!(!result.outputs.contains_key("missing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_runs_have_isolated_contexts() {
        let engine = engine(
            &[CHAIN],
            vec![ScriptedConnector::new("svc").slow(Duration::from_millis(100))],
        );

        let started = Instant::now();
        let (ada, bob) = tokio::join!(
            engine.execute("chain", "run-ada", input(&[("name", json!("Ada"))])),
            engine.execute("chain", "run-bob", input(&[("name", json!("Bob"))])),
        );

        // Two steps of 100ms each; the runs overlap instead of queueing.
        assert!(started.elapsed() < Duration::from_millis(400));

        for (result, name, session) in [(&ada, "Ada", "run-ada"), (&bob, "Bob", "run-bob")] {
            assert!(result.is_success);
            assert_eq!(result.outputs["greeting"], json!(format!("Hi {name}")));
            assert_eq!(result.metadata["sessionId"], json!(session));
            let second = result.step("second").and_then(|r| r.result.clone()).unwrap();
            assert_eq!(second["params"]["who"], json!(name));
            let first = result.step("first").and_then(|r| r.result.clone()).unwrap();
            assert_eq!(first["params"], json!({"name": name}));
        }
    }

    #[tokio::test]
    async fn test_metadata() {
        let engine = engine(&[CHAIN], vec![ScriptedConnector::new("svc")]);
        let result = engine.execute("chain", "s9", Map::new()).await;

        assert_eq!(result.metadata["workflowId"], json!("chain"));
        assert_eq!(result.metadata["workflowVersion"], json!("2.0"));
        assert_eq!(result.metadata["sessionId"], json!("s9"));
        assert_eq!(result.metadata["stepsSucceeded"], json!(2));
        assert_eq!(result.metadata["stepsFailed"], json!(0));
        assert_eq!(result.metadata["stepsSkipped"], json!(0));
    }

    #[tokio::test]
    async fn test_unknown_workflow() {
        let engine = engine(&[], vec![]);
        let result = engine.execute("ghost", "s1", Map::new()).await;
        assert!(!result.is_success);
        assert_eq!(result.error.as_deref(), Some("Workflow not found: ghost"));
        assert!(result.step_results.is_empty());
    }

    const FIND_BIND: &str = r#"{
        "id": "find_bind",
        "steps": [
            {"id": "find", "connector": "scene", "operation": "find",
             "parameters": {"name": "${input.characterName}"}},
            {"id": "bind", "connector": "binder", "operation": "bind",
             "parameters": {"target": "${find.result}"},
             "condition": "${find.success}"}
        ],
        "outputs": {"bindingResult": {"source": "${bind.result}"}}
    }"#;

    #[tokio::test]
    async fn test_failed_step_skips_conditional_dependent() {
        let binder = ScriptedConnector::new("binder");
        let binder_calls = binder.calls();
        let engine = engine(
            &[FIND_BIND],
            vec![ScriptedConnector::new("scene").failing(1), binder],
        );

        let result = engine
            .execute("find_bind", "s1", input(&[("characterName", json!("Hero"))]))
            .await;

        assert!(result.is_success);
        assert_eq!(result.step_results.len(), 2);
        assert_eq!(result.step_results[0].status, StepStatus::Failed);
        assert_eq!(result.step_results[1].status, StepStatus::Skipped);
        assert_eq!(binder_calls.load(Ordering::SeqCst), 0);
        assert!(!result.outputs.contains_key("bindingResult"));
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_run() {
        let def = r#"{
            "id": "keep_going",
            "steps": [
                {"id": "a", "connector": "bad", "operation": "x"},
                {"id": "b", "connector": "good", "operation": "y",
                 "parameters": {"prev": "${a.error}", "gone": "${a.result}"}}
            ]
        }"#;
        let engine = engine(
            &[def],
            vec![
                ScriptedConnector::new("bad").failing(10),
                ScriptedConnector::new("good"),
            ],
        );

        let result = engine.execute("keep_going", "s1", Map::new()).await;
        let a = result.step("a").unwrap();
        assert_eq!(a.status, StepStatus::Failed);
        assert_eq!(a.error.as_deref(), Some("Connector error: attempt 1 failed"));

        let b = result.step("b").unwrap();
        assert_eq!(b.status, StepStatus::Succeeded);
        assert_eq!(
            b.result.as_ref().unwrap()["params"],
            json!({"prev": "Connector error: attempt 1 failed"})
        );
    }

    #[tokio::test]
    async fn test_unregistered_connector_fails_step() {
        let def = r#"{"id": "w", "steps": [{"id": "a", "connector": "nope", "operation": "x"}]}"#;
        let engine = engine(&[def], vec![]);
        let result = engine.execute("w", "s1", Map::new()).await;
        assert!(result.is_success);
        assert_eq!(
            result.step_results[0].error.as_deref(),
            Some("Connector not found: nope")
        );
    }

    fn retrying(strategy: &str, max_attempts: u32) -> String {
        format!(
            r#"{{"id": "retry", "steps": [{{"id": "flaky", "connector": "flaky", "operation": "go",
                 "retryPolicy": {{"maxAttempts": {}, "delaySeconds": 2, "backoffStrategy": "{}"}}}}]}}"#,
            max_attempts, strategy
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let flaky = ScriptedConnector::new("flaky").failing(2);
        let calls = flaky.calls();
        let engine = engine(&[retrying("linear", 3).as_str()], vec![flaky]);

        let started = Instant::now();
        let result = engine.execute("retry", "s1", Map::new()).await;
        let step = &result.step_results[0];

        assert_eq!(step.status, StepStatus::Succeeded);
        assert_eq!(step.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // linear: 2s after attempt 1, 4s after attempt 2
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(6), "waited {:?}", waited);
        assert!(waited < Duration::from_secs(7), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_keeps_last_error() {
        let flaky = ScriptedConnector::new("flaky").failing(100);
        let calls = flaky.calls();
        let engine = engine(&[retrying("exponential", 3).as_str()], vec![flaky]);

        let started = Instant::now();
        let result = engine.execute("retry", "s1", Map::new()).await;
        let step = &result.step_results[0];

        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.attempts, 3);
        assert_eq!(step.error.as_deref(), Some("Connector error: attempt 3 failed"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // exponential: 2s then 4s
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(6) && waited < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_backoff_single_attempt_has_no_wait() {
        let flaky = ScriptedConnector::new("flaky").failing(100);
        let engine = engine(&[retrying("fixed", 1).as_str()], vec![flaky]);

        let started = Instant::now();
        let result = engine.execute("retry", "s1", Map::new()).await;
        assert_eq!(result.step_results[0].attempts, 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_timeout() {
        let def = r#"{"id": "slow", "steps": [
            {"id": "wait", "connector": "slow", "operation": "go", "timeoutSeconds": 1}
        ]}"#;
        let engine = engine(
            &[def],
            vec![ScriptedConnector::new("slow").slow(Duration::from_secs(10))],
        );

        let result = engine.execute("slow", "s1", Map::new()).await;
        let step = &result.step_results[0];
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error.as_deref(), Some("Step timed out after 1s"));
        assert!(result.execution_time_ms < 2000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_ceiling_applies_without_step_timeout() {
        let def = r#"{"id": "slow", "steps": [
            {"id": "wait", "connector": "slow", "operation": "go"}
        ]}"#;
        let engine = engine(
            &[def],
            vec![ScriptedConnector::new("slow").slow(Duration::from_secs(3600))],
        )
        .with_config(EngineConfig::default().with_step_timeout_ceiling(Duration::from_secs(2)));

        let result = engine.execute("slow", "s1", Map::new()).await;
        assert_eq!(
            result.step_results[0].error.as_deref(),
            Some("Step timed out after 2s")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let def = r#"{"id": "cancel_me", "steps": [
            {"id": "flaky", "connector": "flaky", "operation": "go",
             "retryPolicy": {"maxAttempts": 5, "delaySeconds": 30}},
            {"id": "after", "connector": "flaky", "operation": "go"}
        ]}"#;
        let flaky = ScriptedConnector::new("flaky").failing(100);
        let calls = flaky.calls();
        let engine = engine(&[def], vec![flaky]);

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let result = engine
            .execute_with_cancel("cancel_me", "s1", Map::new(), token)
            .await;

        assert!(!result.is_success);
        assert_eq!(result.error.as_deref(), Some(RUN_CANCELLED));
        assert_eq!(result.step_results[0].status, StepStatus::Failed);
        assert_eq!(result.step_results[0].error.as_deref(), Some("cancelled"));
        assert_eq!(result.step_results[1].status, StepStatus::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.metadata["stepsSkipped"], json!(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_attempt() {
        let def = r#"{"id": "cancel_me", "steps": [
            {"id": "slow", "connector": "slow", "operation": "go"}
        ]}"#;
        let engine = engine(
            &[def],
            vec![ScriptedConnector::new("slow").slow(Duration::from_secs(60))],
        );

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = engine
            .execute_with_cancel("cancel_me", "s1", Map::new(), token)
            .await;
        assert!(!result.is_success);
        assert_eq!(result.step_results[0].error.as_deref(), Some("cancelled"));
        assert!(result.execution_time_ms < 2000);
    }

    #[tokio::test]
    async fn test_already_cancelled_runs_nothing() {
        let svc = ScriptedConnector::new("svc");
        let calls = svc.calls();
        let engine = engine(&[CHAIN], vec![svc]);
        let token = CancellationToken::new();
        token.cancel();

        let result = engine
            .execute_with_cancel("chain", "s1", Map::new(), token)
            .await;
        assert!(!result.is_success);
        assert_eq!(result.count(StepStatus::Skipped), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
