//! 调用路由：每次工具调用 / 模型调用都经过这里，决定走持久化引擎还是直接执行
//!
//! 1. 重入保护置位（Activity 的真实执行）→ 直接执行
//! 2. 无活动 Run：有激活钩子则惰性启动一个 Run，否则直接执行（不追踪）
//! 3. 活动 Run 不在注册表中（已清理 / 竞争）→ 直接执行
//! 4. 否则登记挂起调用、向 RunWorkflow 投递事件，并等待结果槽被完成
//!
//! 被路由调用的失败原样返回给调用方，不包装成路由错误。

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::RoutingSection;
use crate::core::{CallFailure, DurableError};
use crate::engine::WorkflowClient;
use crate::observability::preview;
use crate::run::call::{CallTarget, Operation};
use crate::run::context::{RoutingContext, RunMetadata};
use crate::run::guard::ReentrancyGuard;
use crate::run::ids::{CallId, RunId};
use crate::run::registry::RunRegistry;
use crate::run::workflow::{AgentEvent, AGENT_EVENT};

pub struct CallRouter {
    runs: Arc<RunRegistry>,
    client: Arc<dyn WorkflowClient>,
    call_timeout: Option<Duration>,
    preview_chars: usize,
}

impl CallRouter {
    pub fn new(runs: Arc<RunRegistry>, client: Arc<dyn WorkflowClient>) -> Self {
        Self::with_config(runs, client, &RoutingSection::default())
    }

    pub fn with_config(
        runs: Arc<RunRegistry>,
        client: Arc<dyn WorkflowClient>,
        section: &RoutingSection,
    ) -> Self {
        Self {
            runs,
            client,
            call_timeout: section.call_timeout(),
            preview_chars: section.preview_chars,
        }
    }

    pub fn runs(&self) -> &Arc<RunRegistry> {
        &self.runs
    }

    /// 路由一次调用并返回其结果（对调用方表现为同步调用）
    pub async fn route(
        &self,
        ctx: &RoutingContext,
        target: CallTarget,
        op: Operation,
    ) -> Result<Value, CallFailure> {
        if ReentrancyGuard::is_active() {
            debug!(operation = %op.name, "activity re-entry, executing directly");
            return target.invoke_direct(&op).await;
        }

        let Some(run_id) = self.resolve_run(ctx, &op).await else {
            debug!(operation = %op.name, "no active run, executing directly");
            return target.invoke_direct(&op).await;
        };

        let Some(table) = self.runs.get(&run_id) else {
            debug!(run_id = %run_id, operation = %op.name, "run not tracked, executing directly");
            return target.invoke_direct(&op).await;
        };

        let call_id = CallId::new();
        let payload = op.payload();
        let event = AgentEvent::call(op.kind, call_id.clone(), &op.name, payload.clone());
        let pending = table
            .register(call_id.clone(), target, op.clone())
            .map_err(|e| Arc::new(e) as CallFailure)?;

        info!(
            run_id = %run_id,
            call_id = %call_id,
            kind = ?op.kind,
            operation = %op.name,
            args = %preview(&payload, self.preview_chars),
            "routing call through workflow"
        );

        let event = serde_json::to_value(&event).map_err(|e| {
            table.remove(&call_id);
            Arc::new(DurableError::from(e)) as CallFailure
        })?;
        if let Err(e) = self
            .client
            .raise_event(run_id.as_str(), AGENT_EVENT, event)
            .await
        {
            warn!(run_id = %run_id, call_id = %call_id, error = %e, "failed to raise agent event");
            table.remove(&call_id);
            return Err(Arc::new(DurableError::from(e)));
        }

        // 等待期间不持有表的强引用，Run 被清理后挂起调用即被放弃
        let weak_table = Arc::downgrade(&table);
        drop(table);
        match self.call_timeout {
            None => pending.wait().await,
            Some(limit) => match tokio::time::timeout(limit, pending.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    if let Some(table) = weak_table.upgrade() {
                        table.remove(&call_id);
                    }
                    warn!(run_id = %run_id, call_id = %call_id, "pending call timed out");
                    Err(Arc::new(DurableError::CallTimeout {
                        run_id: run_id.to_string(),
                        call_id: call_id.to_string(),
                        timeout_ms: limit.as_millis() as u64,
                    }))
                }
            },
        }
    }

    async fn resolve_run(&self, ctx: &RoutingContext, op: &Operation) -> Option<RunId> {
        if let Some(run_id) = ctx.current() {
            return Some(run_id);
        }
        let activator = ctx.activator()?;
        match activator.activate(ctx, RunMetadata::from_operation(op)).await {
            Ok(run_id) => {
                info!(run_id = %run_id, operation = %op.name, "lazy run activation triggered by first call");
                Some(run_id)
            }
            Err(e) => {
                debug!(operation = %op.name, error = %e, "lazy run activation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::core::EngineError;
    use crate::run::call::Invocable;

    #[derive(Default)]
    struct RecordingClient {
        events: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl WorkflowClient for RecordingClient {
        async fn schedule_new_workflow(
            &self,
            _workflow: &str,
            _input: Value,
            _instance_id: &str,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        async fn raise_event(
            &self,
            instance_id: &str,
            _event_name: &str,
            payload: Value,
        ) -> Result<(), EngineError> {
            self.events
                .lock()
                .unwrap()
                .push((instance_id.to_string(), payload));
            Ok(())
        }
    }

    struct Capital;

    #[async_trait]
    impl Invocable for Capital {
        async fn invoke_direct(&self, _op: &Operation) -> Result<Value, CallFailure> {
            Ok(json!("Paris"))
        }
    }

    fn router(client: Arc<RecordingClient>) -> (CallRouter, Arc<RunRegistry>) {
        let runs = Arc::new(RunRegistry::new());
        (CallRouter::new(runs.clone(), client), runs)
    }

    #[tokio::test]
    async fn test_no_active_run_executes_directly() {
        let client = Arc::new(RecordingClient::default());
        let (router, runs) = router(client.clone());
        let ctx = RoutingContext::new();

        let result = router
            .route(&ctx, Arc::new(Capital), Operation::tool("get_capital", json!("France")))
            .await
            .unwrap();
        assert_eq!(result, json!("Paris"));
        assert!(client.events.lock().unwrap().is_empty());
        assert!(runs.registered_ids().is_empty());
    }

    #[tokio::test]
    async fn test_untracked_run_executes_directly() {
        let client = Arc::new(RecordingClient::default());
        let (router, _runs) = router(client.clone());
        let ctx = RoutingContext::new();
        ctx.set(RunId::from("gone"));

        let result = router
            .route(&ctx, Arc::new(Capital), Operation::tool("get_capital", json!("France")))
            .await
            .unwrap();
        assert_eq!(result, json!("Paris"));
        assert!(client.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_guard_bypasses_routing() {
        let client = Arc::new(RecordingClient::default());
        let (router, runs) = router(client.clone());
        let table = runs.register(RunId::from("r1"));
        let ctx = RoutingContext::new();
        ctx.set(RunId::from("r1"));

        let result = ReentrancyGuard::scope(router.route(
            &ctx,
            Arc::new(Capital),
            Operation::tool("get_capital", json!("France")),
        ))
        .await
        .unwrap();
        assert_eq!(result, json!("Paris"));
        assert!(table.is_empty());
        assert!(client.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tracked_call_raises_event_and_waits() {
        let client = Arc::new(RecordingClient::default());
        let (router, runs) = router(client.clone());
        let table = runs.register(RunId::from("r1"));
        let ctx = RoutingContext::new();
        ctx.set(RunId::from("r1"));
        let router = Arc::new(router);

        let caller = {
            let router = router.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                router
                    .route(&ctx, Arc::new(Capital), Operation::tool("get_capital", json!("France")))
                    .await
            })
        };

        let call_id = loop {
            if let Some(id) = table.call_ids().pop() {
                break id;
            }
            tokio::task::yield_now().await;
        };
        assert!(table.complete(&call_id, json!("Lyon")));
        assert_eq!(caller.await.unwrap().unwrap(), json!("Lyon"));

        let events = client.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "r1");
        assert_eq!(events[0].1["type"], "tool-call");
        assert_eq!(events[0].1["callId"], call_id.as_str());
        assert_eq!(events[0].1["payload"], "France");
    }

    #[tokio::test]
    async fn test_timeout_removes_pending_entry() {
        let client = Arc::new(RecordingClient::default());
        let runs = Arc::new(RunRegistry::new());
        let section = RoutingSection {
            call_timeout_secs: None,
            preview_chars: 40,
        };
        let mut router = CallRouter::with_config(runs.clone(), client, &section);
        router.call_timeout = Some(Duration::from_millis(20));
        let table = runs.register(RunId::from("r1"));
        let ctx = RoutingContext::new();
        ctx.set(RunId::from("r1"));

        let err = router
            .route(&ctx, Arc::new(Capital), Operation::tool("get_capital", json!("France")))
            .await
            .unwrap_err();
        assert!(matches!(
            (*err).downcast_ref::<DurableError>(),
            Some(DurableError::CallTimeout { .. })
        ));
        assert!(table.is_empty());
    }
}
