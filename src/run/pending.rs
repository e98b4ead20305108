//! 挂起调用表（每个 Run 一张）
//!
//! 调用方 register 得到 PendingResult 并等待；执行该调用的 Activity 通过 get 取回目标与操作，
//! 执行后 complete / fail。每个条目只会被完成一次，完成即移除；对不存在的条目完成是无操作（容忍重复或迟到的信号）。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::core::{CallFailure, DurableError};
use crate::run::call::{CallTarget, Operation};
use crate::run::ids::{CallId, RunId};

type ResultSender = oneshot::Sender<Result<Value, CallFailure>>;

/// 挂起调用：目标 + 操作（Activity 执行时使用）
#[derive(Clone)]
pub struct PendingCall {
    pub call_id: CallId,
    pub target: CallTarget,
    pub operation: Operation,
}

struct Slot {
    call: PendingCall,
    result: ResultSender,
}

/// 挂起调用表
pub struct PendingCallTable {
    run_id: RunId,
    calls: Mutex<HashMap<CallId, Slot>>,
}

impl PendingCallTable {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// 登记一次调用，返回结果槽；CallId 重复时报错
    pub fn register(
        &self,
        call_id: CallId,
        target: CallTarget,
        operation: Operation,
    ) -> Result<PendingResult, DurableError> {
        let mut calls = self.lock();
        if calls.contains_key(&call_id) {
            return Err(DurableError::DuplicateCallId {
                run_id: self.run_id.to_string(),
                call_id: call_id.to_string(),
            });
        }
        let (tx, rx) = oneshot::channel();
        calls.insert(
            call_id.clone(),
            Slot {
                call: PendingCall {
                    call_id: call_id.clone(),
                    target,
                    operation,
                },
                result: tx,
            },
        );
        Ok(PendingResult {
            run_id: self.run_id.clone(),
            call_id,
            rx,
        })
    }

    pub fn get(&self, call_id: &CallId) -> Option<PendingCall> {
        self.lock().get(call_id).map(|slot| slot.call.clone())
    }

    /// 以成功结果完成；条目不存在时返回 false
    pub fn complete(&self, call_id: &CallId, value: Value) -> bool {
        self.settle(call_id, Ok(value))
    }

    /// 以失败原因完成；条目不存在时返回 false
    pub fn fail(&self, call_id: &CallId, cause: CallFailure) -> bool {
        self.settle(call_id, Err(cause))
    }

    /// 直接移除（调用方放弃等待时）
    pub fn remove(&self, call_id: &CallId) -> bool {
        self.lock().remove(call_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn call_ids(&self) -> Vec<CallId> {
        self.lock().keys().cloned().collect()
    }

    fn settle(&self, call_id: &CallId, result: Result<Value, CallFailure>) -> bool {
        let Some(slot) = self.lock().remove(call_id) else {
            debug!(run_id = %self.run_id, call_id = %call_id, "completion for unknown call ignored");
            return false;
        };
        if slot.result.send(result).is_err() {
            debug!(run_id = %self.run_id, call_id = %call_id, "caller no longer waiting");
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CallId, Slot>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 调用方持有的结果槽
pub struct PendingResult {
    run_id: RunId,
    call_id: CallId,
    rx: oneshot::Receiver<Result<Value, CallFailure>>,
}

impl PendingResult {
    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    /// 等待结果；条目在完成前被丢弃则返回 CallAbandoned
    pub async fn wait(self) -> Result<Value, CallFailure> {
        let Self { run_id, call_id, rx } = self;
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(abandoned(run_id, call_id)),
        }
    }

    /// 同步线程上的阻塞等待（不可在异步运行时线程中调用）
    pub fn blocking_wait(self) -> Result<Value, CallFailure> {
        let Self { run_id, call_id, rx } = self;
        match rx.blocking_recv() {
            Ok(result) => result,
            Err(_) => Err(abandoned(run_id, call_id)),
        }
    }
}

fn abandoned(run_id: RunId, call_id: CallId) -> CallFailure {
    std::sync::Arc::new(DurableError::CallAbandoned {
        run_id: run_id.to_string(),
        call_id: call_id.to_string(),
    })
}
