//! 智能体共享作用域：编排中各智能体读写的键值状态，条件谓词也在其上求值

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

/// loop 退出条件：(scope, 轮次) → 是否退出
pub type ExitCondition = Arc<dyn Fn(&AgentScope, u32) -> bool + Send + Sync>;

/// conditional 执行条件：scope → 是否执行该智能体
pub type AgentCondition = Arc<dyn Fn(&AgentScope) -> bool + Send + Sync>;

#[derive(Clone, Default, Debug)]
pub struct AgentScope {
    state: Arc<RwLock<HashMap<String, Value>>>,
}

impl AgentScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// 字符串值原样返回，其余值取 JSON 文本
    pub fn get_text(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 用作用域中的值替换模板里的 {{key}}；缺失的键保留原样
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start + 2..].find("}}") else {
                break;
            };
            let key = rest[start + 2..start + 2 + len].trim();
            out.push_str(&rest[..start]);
            match self.get_text(key) {
                Some(value) => out.push_str(&value),
                None => out.push_str(&rest[start..start + 2 + len + 2]),
            }
            rest = &rest[start + 2 + len + 2..];
        }
        out.push_str(rest);
        out
    }
}
