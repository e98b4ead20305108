//! CallExecutionActivity：代表 RunWorkflow 执行一次被挂起的调用
//!
//! 找不到 Run 或挂起调用是致命且不可重试的（生命周期 bug）。执行期间置位重入保护，
//! 目标重新进入调用路径时直接执行；成功则完成挂起调用并返回记录。失败时返回可重试的包装错误：
//! 引擎还会重试时挂起调用保持不动，最后一次尝试失败才以原始原因失败挂起调用。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::core::{CallFailure, DurableError, OperationError};
use crate::engine::{ActivityAttempt, WorkflowActivity};
use crate::run::call::result_text;
use crate::run::guard::ReentrancyGuard;
use crate::run::registry::RunRegistry;
use crate::run::workflow::{CallActivityInput, CallActivityOutput, CALL_EXECUTION_ACTIVITY};

pub struct CallExecutionActivity {
    runs: Arc<RunRegistry>,
}

impl CallExecutionActivity {
    pub fn new(runs: Arc<RunRegistry>) -> Self {
        Self { runs }
    }
}

#[async_trait]
impl WorkflowActivity for CallExecutionActivity {
    fn name(&self) -> &str {
        CALL_EXECUTION_ACTIVITY
    }

    async fn run(&self, input: Value) -> Result<Value, DurableError> {
        self.run_attempt(input, ActivityAttempt::single()).await
    }

    async fn run_attempt(
        &self,
        input: Value,
        attempt: ActivityAttempt,
    ) -> Result<Value, DurableError> {
        let input: CallActivityInput = serde_json::from_value(input)?;
        let run_id = input.run_id.clone();
        let call_id = input.call_id.clone();

        let table = self
            .runs
            .get(&run_id)
            .ok_or_else(|| DurableError::RunNotFound {
                run_id: run_id.to_string(),
                registered: self.runs.registered_ids(),
            })?;
        let pending = table
            .get(&call_id)
            .ok_or_else(|| DurableError::PendingCallNotFound {
                run_id: run_id.to_string(),
                call_id: call_id.to_string(),
            })?;

        info!(
            run_id = %run_id,
            call_id = %call_id,
            operation = %pending.operation.name,
            attempt = attempt.number,
            "executing pending call"
        );

        let invocation = pending.target.invoke(&pending.operation);
        let outcome = ReentrancyGuard::scope(AssertUnwindSafe(invocation).catch_unwind())
            .await
            .unwrap_or_else(|panic| Err(OperationError::failure(panic_message(panic))));

        match outcome {
            Ok(value) => {
                let output = CallActivityOutput {
                    operation_name: input.operation_name,
                    payload: input.payload,
                    result_text: result_text(&value),
                };
                table.complete(&call_id, value);
                info!(run_id = %run_id, call_id = %call_id, "pending call completed");
                Ok(serde_json::to_value(output)?)
            }
            Err(failure) => {
                let cause = root_cause(failure);
                if !attempt.is_final() {
                    warn!(
                        run_id = %run_id,
                        call_id = %call_id,
                        operation = %pending.operation.name,
                        attempt = attempt.number,
                        max_attempts = attempt.max_attempts,
                        error = %cause,
                        "pending call attempt failed, left pending for retry"
                    );
                    return Err(DurableError::OperationFailed {
                        operation: pending.operation.name,
                        source: cause,
                    });
                }
                error!(
                    run_id = %run_id,
                    call_id = %call_id,
                    operation = %pending.operation.name,
                    error = %cause,
                    "pending call failed"
                );
                table.fail(&call_id, cause.clone());
                Err(DurableError::OperationFailed {
                    operation: pending.operation.name,
                    source: cause,
                })
            }
        }
    }
}

/// 剥掉桥接层的 OperationFailed 包装，得到最初的失败原因
pub fn root_cause(mut failure: CallFailure) -> CallFailure {
    loop {
        let inner = match (*failure).downcast_ref::<DurableError>() {
            Some(DurableError::OperationFailed { source, .. }) => source.clone(),
            _ => return failure,
        };
        failure = inner;
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("operation panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("operation panicked: {s}")
    } else {
        "operation panicked".to_string()
    }
}
