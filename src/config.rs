//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `DURABLE__*` 覆盖（双下划线表示嵌套，如 `DURABLE__ROUTING__CALL_TIMEOUT_SECS=30`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub routing: RoutingSection,
    #[serde(default)]
    pub orchestration: OrchestrationSection,
    #[serde(default)]
    pub agent: AgentSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [engine] 段：本地工作流运行时的 Activity 重试策略
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// 单个 Activity 最多尝试次数（含首次）；仅对可重试错误生效
    #[serde(default = "default_activity_max_attempts")]
    pub activity_max_attempts: u32,
    #[serde(default = "default_activity_retry_backoff_ms")]
    pub activity_retry_backoff_ms: u64,
    /// 实例结束后在运行时中保留的秒数（之后调度新实例时被清理）
    #[serde(default = "default_finished_retention_secs")]
    pub finished_retention_secs: u64,
}

fn default_activity_max_attempts() -> u32 {
    1
}

fn default_activity_retry_backoff_ms() -> u64 {
    200
}

fn default_finished_retention_secs() -> u64 {
    300
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            activity_max_attempts: default_activity_max_attempts(),
            activity_retry_backoff_ms: default_activity_retry_backoff_ms(),
            finished_retention_secs: default_finished_retention_secs(),
        }
    }
}

impl EngineSection {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.activity_retry_backoff_ms)
    }

    pub fn finished_retention(&self) -> Duration {
        Duration::from_secs(self.finished_retention_secs)
    }
}

/// [routing] 段：调用路由（会合）相关
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingSection {
    /// 调用方等待挂起调用结果的超时（秒）；不设置则无限等待
    #[serde(default)]
    pub call_timeout_secs: Option<u64>,
    /// 日志中 payload 预览的最大字符数
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

fn default_preview_chars() -> usize {
    120
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            call_timeout_secs: None,
            preview_chars: default_preview_chars(),
        }
    }
}

impl RoutingSection {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }
}

/// [orchestration] 段
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestrationSection {
    /// loop 编排未显式设置 max_iterations 时的上限
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: u32,
}

fn default_max_iterations() -> u32 {
    10
}

impl Default for OrchestrationSection {
    fn default() -> Self {
        Self {
            default_max_iterations: default_max_iterations(),
        }
    }
}

/// [agent] 段：ReAct 智能体步数与对话保留轮数
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
}

fn default_max_steps() -> usize {
    8
}

fn default_max_context_turns() -> usize {
    20
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_context_turns: default_max_context_turns(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 DURABLE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 DURABLE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("DURABLE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.activity_max_attempts, 1);
        assert_eq!(cfg.engine.finished_retention(), Duration::from_secs(300));
        assert!(cfg.routing.call_timeout().is_none());
        assert_eq!(cfg.routing.preview_chars, 120);
        assert_eq!(cfg.orchestration.default_max_iterations, 10);
        assert_eq!(cfg.agent.max_steps, 8);
    }

    #[test]
    fn test_load_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[routing]\ncall_timeout_secs = 5\n\n[engine]\nactivity_max_attempts = 3\n"
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.routing.call_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(cfg.engine.activity_max_attempts, 3);
        assert_eq!(cfg.agent.max_context_turns, 20);
    }
}
