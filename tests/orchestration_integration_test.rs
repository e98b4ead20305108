//! 编排集成测试：编排工作流 + 锁步规划器 + 进程内规划循环

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use durable_agents::config::AppConfig;
use durable_agents::core::{AgentError, DurableError, DurableServices, EngineError};
use durable_agents::engine::{InstanceState, LocalWorkflowRuntime, RuntimeStatus, WorkflowClient};
use durable_agents::orchestration::{
    Action, Agent, AgentScope, OrchestrationBuilder, OrchestrationPlanner, PlannerRegistry, Topology,
};
use durable_agents::run::{RoutingContext, RunId, RunOutput, RUN_WORKFLOW};
use durable_agents::tools::{EchoTool, ToolRegistry};

/// 记录自己执行过，并可选地经（装饰后的）工具回显自己的名字
struct Step {
    name: String,
    tools: Option<ToolRegistry>,
    delay: Duration,
}

impl Step {
    fn new(name: &str) -> Arc<dyn Agent> {
        Arc::new(Self {
            name: name.to_string(),
            tools: None,
            delay: Duration::ZERO,
        })
    }

    fn with_tools(name: &str, tools: ToolRegistry) -> Arc<dyn Agent> {
        Self::slow(name, tools, Duration::ZERO)
    }

    /// 先等待 delay 再调用工具
    fn slow(name: &str, tools: ToolRegistry, delay: Duration) -> Arc<dyn Agent> {
        Arc::new(Self {
            name: name.to_string(),
            tools: Some(tools),
            delay,
        })
    }
}

#[async_trait]
impl Agent for Step {
    fn name(&self) -> &str {
        &self.name
    }

    fn user_message(&self) -> Option<&str> {
        Some("run step")
    }

    async fn invoke(&self, scope: &AgentScope) -> Result<(), AgentError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let value = match &self.tools {
            Some(tools) => tools
                .execute("echo", json!({ "text": format!("{} done", self.name) }))
                .await
                .map_err(AgentError::ToolExecutionFailed)?,
            None => format!("{} done", self.name),
        };
        scope.set(self.name.clone(), value);
        Ok(())
    }
}

/// 每次执行把 count 加一
struct Counter;

#[async_trait]
impl Agent for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    async fn invoke(&self, scope: &AgentScope) -> Result<(), AgentError> {
        let count = scope.get("count").and_then(|v| v.as_u64()).unwrap_or(0);
        scope.set("count", count + 1);
        Ok(())
    }
}

struct Failing;

#[async_trait]
impl Agent for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    async fn invoke(&self, _scope: &AgentScope) -> Result<(), AgentError> {
        Err(AgentError::LlmError("model unavailable".into()))
    }
}

/// 拒绝调度 RunWorkflow 的引擎客户端，其余转发给运行时
struct RejectRuns {
    runtime: LocalWorkflowRuntime,
}

#[async_trait]
impl WorkflowClient for RejectRuns {
    async fn schedule_new_workflow(
        &self,
        workflow: &str,
        input: Value,
        instance_id: &str,
    ) -> Result<(), EngineError> {
        if workflow == RUN_WORKFLOW {
            return Err(EngineError::WorkflowNotRegistered(workflow.to_string()));
        }
        self.runtime
            .schedule_new_workflow(workflow, input, instance_id)
            .await
    }

    async fn raise_event(
        &self,
        instance_id: &str,
        event_name: &str,
        payload: Value,
    ) -> Result<(), EngineError> {
        self.runtime.raise_event(instance_id, event_name, payload).await
    }
}

fn local_services() -> (DurableServices, LocalWorkflowRuntime) {
    DurableServices::with_local_runtime(&AppConfig::default())
}

/// 等待 Run 结束并取出它的 RunOutput
async fn run_output(runtime: &LocalWorkflowRuntime, run_id: &RunId) -> RunOutput {
    let state = runtime
        .wait_for_completion(run_id.as_str(), Duration::from_secs(5))
        .await
        .unwrap();
    serde_json::from_value(state.custom_status.unwrap()).unwrap()
}

async fn finished(runtime: &LocalWorkflowRuntime, workflow: &str) -> InstanceState {
    let instances = runtime.instances_of(workflow);
    assert_eq!(instances.len(), 1, "expected exactly one {workflow} instance");
    runtime
        .wait_for_completion(&instances[0].instance_id, Duration::from_secs(5))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_parallel_batch_requires_one_advance_per_agent() {
    struct NullClient;

    #[async_trait]
    impl WorkflowClient for NullClient {
        async fn schedule_new_workflow(&self, _: &str, _: Value, _: &str) -> Result<(), EngineError> {
            Ok(())
        }

        async fn raise_event(&self, _: &str, _: &str, _: Value) -> Result<(), EngineError> {
            Ok(())
        }
    }

    let orchestration = OrchestrationBuilder::parallel("fan-out")
        .agents([Step::new("a"), Step::new("b"), Step::new("c")])
        .build()
        .unwrap();
    let planners = Arc::new(PlannerRegistry::new());
    let planner = OrchestrationPlanner::new(
        &orchestration,
        AgentScope::new(),
        Arc::new(NullClient),
        planners.clone(),
    );
    planners.register(planner.clone());

    let mut turns = Vec::new();
    for index in 0..3 {
        let agent = planner.agent(index).unwrap();
        let run_id = RunId::for_agent(planner.planner_id(), index, 0);
        turns.push(tokio::spawn(planner.execute_agent(agent, run_id).unwrap().wait()));
    }

    match planner.first_action().await.unwrap() {
        Action::Call(batch) => assert_eq!(batch.len(), 3),
        _ => panic!("expected a batch of three"),
    }

    let mut turns = turns.into_iter();
    for _ in 0..2 {
        assert!(matches!(planner.next_action().await, Action::NoOp));
        let turn = turns.next().unwrap();
        turn.await.unwrap().unwrap();
        assert!(turns.as_slice().iter().all(|t| !t.is_finished()));
    }

    planner.signal_workflow_complete(None).unwrap();
    assert!(matches!(planner.next_action().await, Action::Done { failure: None }));
    turns.next().unwrap().await.unwrap().unwrap();
    assert!(planners.registered_ids().is_empty());
}

#[tokio::test]
async fn test_sequence_attributes_calls_to_each_agent_run() {
    let (services, runtime) = local_services();
    let ctx = RoutingContext::new();
    let mut tools = ToolRegistry::new();
    tools.register(EchoTool);
    let tools = services.durable_tools(tools, &ctx);

    let orchestration = services
        .orchestration("pipeline", Topology::Sequence)
        .agent(Step::with_tools("research", tools.clone()))
        .agent(Step::with_tools("write", tools))
        .build()
        .unwrap();
    let scope = orchestration
        .invoke(&services, AgentScope::new())
        .await
        .unwrap();
    assert_eq!(scope.get_text("research").as_deref(), Some("research done"));
    assert_eq!(scope.get_text("write").as_deref(), Some("write done"));
    assert!(ctx.current().is_none());
    assert!(services.planners().registered_ids().is_empty());

    let workflow = finished(&runtime, Topology::Sequence.workflow_name()).await;
    assert_eq!(workflow.status, RuntimeStatus::Completed);
    assert_eq!(workflow.output.unwrap()["executedSteps"], 2);

    let planner_id = workflow.instance_id;
    for (index, name) in ["research", "write"].into_iter().enumerate() {
        let run_id = RunId::for_agent(&planner_id, index, 0);
        let state = runtime
            .wait_for_completion(run_id.as_str(), Duration::from_secs(5))
            .await
            .unwrap();
        let output: RunOutput = serde_json::from_value(state.custom_status.unwrap()).unwrap();
        assert_eq!(output.agent_name, name);
        assert_eq!(output.calls.len(), 1);
        assert_eq!(output.calls[0].output, format!("{name} done"));
    }
    assert!(services.runs().registered_ids().is_empty());
    runtime.shutdown();
}

#[tokio::test]
async fn test_parallel_orchestration_runs_every_agent() {
    let (services, runtime) = local_services();
    let ctx = RoutingContext::new();
    let mut tools = ToolRegistry::new();
    tools.register(EchoTool);
    let tools = services.durable_tools(tools, &ctx);

    let orchestration = services
        .orchestration("fan-out", Topology::Parallel)
        .agents([
            Step::slow("a", tools.clone(), Duration::from_millis(30)),
            Step::slow("b", tools.clone(), Duration::from_millis(10)),
            Step::with_tools("c", tools),
        ])
        .build()
        .unwrap();
    let scope = orchestration
        .invoke(&services, AgentScope::new())
        .await
        .unwrap();
    for name in ["a", "b", "c"] {
        assert_eq!(scope.get_text(name), Some(format!("{name} done")));
    }

    let workflow = finished(&runtime, Topology::Parallel.workflow_name()).await;
    assert_eq!(workflow.output.unwrap()["executedSteps"], 3);

    // 同一批次内的智能体各自的调用落在各自的 Run 中
    for (index, name) in ["a", "b", "c"].into_iter().enumerate() {
        let output = run_output(&runtime, &RunId::for_agent(&workflow.instance_id, index, 0)).await;
        assert_eq!(output.agent_name, name);
        assert_eq!(output.calls.len(), 1);
        assert_eq!(output.calls[0].output, format!("{name} done"));
    }
    runtime.shutdown();
}

#[tokio::test]
async fn test_concurrent_orchestrations_on_shared_context_keep_their_runs() {
    let (services, runtime) = local_services();
    let ctx = RoutingContext::new();
    let mut tools = ToolRegistry::new();
    tools.register(EchoTool);
    let tools = services.durable_tools(tools, &ctx);

    let slow = services
        .orchestration("slow", Topology::Sequence)
        .agent(Step::slow("tortoise", tools.clone(), Duration::from_millis(60)))
        .build()
        .unwrap();
    let fast = services
        .orchestration("fast", Topology::Sequence)
        .agent(Step::slow("hare", tools, Duration::from_millis(10)))
        .build()
        .unwrap();

    let (left, right) = tokio::join!(
        slow.invoke(&services, AgentScope::new()),
        fast.invoke(&services, AgentScope::new())
    );
    assert_eq!(left.unwrap().get_text("tortoise").as_deref(), Some("tortoise done"));
    assert_eq!(right.unwrap().get_text("hare").as_deref(), Some("hare done"));
    assert!(ctx.current().is_none());

    let workflows = runtime.instances_of(Topology::Sequence.workflow_name());
    assert_eq!(workflows.len(), 2);
    let mut agents = Vec::new();
    for workflow in workflows {
        let output = run_output(&runtime, &RunId::for_agent(&workflow.instance_id, 0, 0)).await;
        assert_eq!(output.calls.len(), 1, "run of {} recorded {:?}", output.agent_name, output.calls);
        assert_eq!(output.calls[0].output, format!("{} done", output.agent_name));
        agents.push(output.agent_name);
    }
    agents.sort();
    assert_eq!(agents, vec!["hare", "tortoise"]);
    assert!(services.runs().registered_ids().is_empty());
    runtime.shutdown();
}

#[tokio::test]
async fn test_loop_checks_exit_after_each_agent() {
    let (services, runtime) = local_services();
    let orchestration = services
        .orchestration("refine", Topology::Loop)
        .agent(Arc::new(Counter))
        .agent(Step::new("review"))
        .exit_condition(|scope, _| scope.get("count").and_then(|v| v.as_u64()) >= Some(2))
        .build()
        .unwrap();
    let scope = orchestration
        .invoke(&services, AgentScope::new())
        .await
        .unwrap();
    assert_eq!(scope.get("count"), Some(json!(2)));

    let workflow = finished(&runtime, Topology::Loop.workflow_name()).await;
    // 第 0 轮 counter + review，第 1 轮 counter 后即退出
    assert_eq!(workflow.output.unwrap()["executedSteps"], 3);

    let mut run_ids: Vec<String> = runtime
        .instances_of(RUN_WORKFLOW)
        .into_iter()
        .map(|s| s.instance_id)
        .collect();
    run_ids.sort();
    let planner_id = workflow.instance_id;
    let mut expected = vec![
        RunId::for_agent(&planner_id, 0, 0).to_string(),
        RunId::for_agent(&planner_id, 0, 1).to_string(),
        RunId::for_agent(&planner_id, 1, 0).to_string(),
    ];
    expected.sort();
    assert_eq!(run_ids, expected);
    runtime.shutdown();
}

#[tokio::test]
async fn test_loop_checks_exit_at_iteration_end() {
    let (services, runtime) = local_services();
    let orchestration = services
        .orchestration("refine", Topology::Loop)
        .agent(Arc::new(Counter))
        .agent(Arc::new(Counter))
        .exit_condition(|scope, _| scope.get("count").and_then(|v| v.as_u64()) >= Some(3))
        .test_exit_at_loop_end(true)
        .build()
        .unwrap();
    let scope = orchestration
        .invoke(&services, AgentScope::new())
        .await
        .unwrap();
    assert_eq!(scope.get("count"), Some(json!(4)));
    runtime.shutdown();
}

#[tokio::test]
async fn test_loop_bounded_by_max_iterations() {
    let (services, runtime) = local_services();
    let orchestration = services
        .orchestration("spin", Topology::Loop)
        .agent(Arc::new(Counter))
        .max_iterations(3)
        .build()
        .unwrap();
    let scope = orchestration
        .invoke(&services, AgentScope::new())
        .await
        .unwrap();
    assert_eq!(scope.get("count"), Some(json!(3)));
    runtime.shutdown();
}

#[tokio::test]
async fn test_conditional_skips_agents_whose_condition_fails() {
    let (services, runtime) = local_services();
    let orchestration = services
        .orchestration("branch", Topology::Conditional)
        .agent(Step::new("always"))
        .conditional_agent(|scope| scope.contains("escalate"), Step::new("escalation"))
        .conditional_agent(|scope| scope.contains("always"), Step::new("follow-up"))
        .build()
        .unwrap();
    let scope = orchestration
        .invoke(&services, AgentScope::new())
        .await
        .unwrap();
    assert!(scope.contains("always"));
    assert!(!scope.contains("escalation"));
    assert!(scope.contains("follow-up"));

    let workflow = finished(&runtime, Topology::Conditional.workflow_name()).await;
    assert_eq!(workflow.output.unwrap()["executedSteps"], 2);
    runtime.shutdown();
}

#[tokio::test]
async fn test_agent_failure_aborts_orchestration() {
    let (services, runtime) = local_services();
    let orchestration = services
        .orchestration("broken", Topology::Sequence)
        .agent(Step::new("first"))
        .agent(Arc::new(Failing))
        .agent(Step::new("never"))
        .build()
        .unwrap();
    let scope = AgentScope::new();
    let err = orchestration
        .invoke(&services, scope.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::LlmError(ref m) if m == "model unavailable"));
    assert!(scope.contains("first"));
    assert!(!scope.contains("never"));
    assert!(services.planners().registered_ids().is_empty());

    let workflow = finished(&runtime, Topology::Sequence.workflow_name()).await;
    assert_eq!(workflow.status, RuntimeStatus::Failed);
    assert!(workflow.error.unwrap().contains("closed"));
    runtime.shutdown();
}

#[tokio::test]
async fn test_workflow_failure_reported_to_planning_loop() {
    let config = AppConfig::default();
    let runtime = LocalWorkflowRuntime::from_config(&config.engine);
    let services = DurableServices::new(
        &config,
        Arc::new(RejectRuns {
            runtime: runtime.clone(),
        }),
    );
    services.register_with(&runtime);

    let orchestration = services
        .orchestration("unschedulable", Topology::Sequence)
        .agent(Step::new("only"))
        .build()
        .unwrap();
    let err = orchestration
        .invoke(&services, AgentScope::new())
        .await
        .unwrap_err();
    match err {
        AgentError::Durable(DurableError::OrchestrationFailed { message, .. }) => {
            assert!(message.contains(RUN_WORKFLOW));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(services.planners().registered_ids().is_empty());
    runtime.shutdown();
}

#[tokio::test]
async fn test_unknown_planner_fails_workflow_with_its_id() {
    let (_services, runtime) = local_services();
    runtime
        .schedule_new_workflow(
            Topology::Sequence.workflow_name(),
            json!({
                "plannerId": "nonexistent-planner",
                "agentCount": 1,
                "maxIterations": 1,
                "testExitAtLoopEnd": false,
            }),
            "nonexistent-planner",
        )
        .await
        .unwrap();
    let state = runtime
        .wait_for_completion("nonexistent-planner", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(state.status, RuntimeStatus::Failed);
    assert!(state
        .error
        .unwrap()
        .contains("No planner found for ID: nonexistent-planner"));
    runtime.shutdown();
}
