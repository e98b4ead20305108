//! durable-agents 演示
//!
//! 在进程内运行时上跑一个两步 sequence 编排（researcher → writer）和一次请求级惰性 Run，
//! 每次模型调用与工具调用都经持久化工作流执行，最后打印每个 Run 的 RunOutput。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use durable_agents::config::load_config;
use durable_agents::core::DurableServices;
use durable_agents::llm::{LlmClient, MockLlmClient};
use durable_agents::observability;
use durable_agents::orchestration::{AgentScope, Topology};
use durable_agents::react::ReactAgent;
use durable_agents::run::{RoutingContext, RunOutput, RUN_WORKFLOW};
use durable_agents::tools::{EchoTool, ToolRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config = load_config(None).context("Failed to load configuration")?;
    let (services, runtime) = DurableServices::with_local_runtime(&config);

    let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new());
    let mut tools = ToolRegistry::new();
    tools.register(EchoTool);

    // 编排：两个智能体共享同一个路由上下文，规划循环把每个智能体的调用绑定到它自己的 Run
    let ctx = RoutingContext::new();
    let durable_llm = services.durable_llm(llm.clone(), &ctx);
    let durable_tools = services.durable_tools(tools.clone(), &ctx);
    let researcher = ReactAgent::new(
        "researcher",
        durable_llm.clone(),
        durable_tools.clone(),
        "Collect facts about {{topic}}",
    )
    .with_system_prompt("You are a careful researcher.")
    .with_output_key("notes")
    .with_config(&config.agent);
    let writer = ReactAgent::new("writer", durable_llm, durable_tools, "Summarize: {{notes}}")
        .with_system_prompt("You write one-line summaries.")
        .with_output_key("summary")
        .with_config(&config.agent);

    let orchestration = services
        .orchestration("research-pipeline", Topology::Sequence)
        .agent(Arc::new(researcher))
        .agent(Arc::new(writer))
        .build()
        .context("Invalid orchestration")?;
    let scope = orchestration
        .invoke(&services, AgentScope::new().with("topic", "the Rhine"))
        .await
        .context("Orchestration failed")?;
    println!("summary: {}", scope.get_text("summary").unwrap_or_default());

    // 请求级 Run：第一次被路由的调用才启动 Run
    let request = services.request_run();
    let request_ctx = request.routing_context();
    let standalone = ReactAgent::new(
        "standalone",
        services.durable_llm(llm, &request_ctx),
        services.durable_tools(tools, &request_ctx),
        "",
    )
    .with_config(&config.agent);
    let answer = standalone.run("ping").await;
    request.close(&request_ctx).await;
    println!("standalone: {}", answer.context("Standalone agent failed")?);

    for state in runtime.instances_of(RUN_WORKFLOW) {
        let state = runtime
            .wait_for_completion(&state.instance_id, Duration::from_secs(5))
            .await
            .with_context(|| format!("Run {} did not complete", state.instance_id))?;
        let Some(status) = state.custom_status else {
            continue;
        };
        let output: RunOutput = serde_json::from_value(status)?;
        println!("run {} ({:?}) agent={}", state.instance_id, state.status, output.agent_name);
        for call in &output.calls {
            println!("  {:?} {} -> {}", call.kind, call.name, call.output);
        }
    }

    runtime.shutdown();
    Ok(())
}
