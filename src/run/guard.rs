//! 重入保护：区分“首次拦截”与“Activity 重新进入调用路径执行真实调用”
//!
//! 标志是任务局部的，只在 `scope` 包裹的 future 内可见，退出（含失败 / panic）即消失，
//! 不会泄漏到原调用方任务或其他任务。

use std::future::Future;

tokio::task_local! {
    static ACTIVITY_CALL: bool;
}

pub struct ReentrancyGuard;

impl ReentrancyGuard {
    /// 在保护标志置位的情况下执行 fut
    pub async fn scope<F: Future>(fut: F) -> F::Output {
        ACTIVITY_CALL.scope(true, fut).await
    }

    /// 当前任务是否处于 Activity 的真实执行中
    pub fn is_active() -> bool {
        ACTIVITY_CALL.try_with(|flag| *flag).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::FutureExt;

    use super::*;

    #[tokio::test]
    async fn test_flag_scoped_to_future() {
        assert!(!ReentrancyGuard::is_active());
        let inside = ReentrancyGuard::scope(async { ReentrancyGuard::is_active() }).await;
        assert!(inside);
        assert!(!ReentrancyGuard::is_active());
    }

    #[tokio::test]
    async fn test_flag_cleared_after_failure() {
        let result: Result<(), String> =
            ReentrancyGuard::scope(async { Err("tool failed".to_string()) }).await;
        assert!(result.is_err());
        assert!(!ReentrancyGuard::is_active());

        let panicked = std::panic::AssertUnwindSafe(ReentrancyGuard::scope(async {
            panic!("tool panicked");
        }))
        .catch_unwind()
        .await;
        assert!(panicked.is_err());
        assert!(!ReentrancyGuard::is_active());
    }

    #[tokio::test]
    async fn test_flag_not_visible_to_other_tasks() {
        let spawned = ReentrancyGuard::scope(async {
            tokio::spawn(async { ReentrancyGuard::is_active() }).await
        })
        .await
        .unwrap();
        assert!(!spawned);
    }
}
