//! 编排构建器
//!
//! 提供流畅的 API 构建 sequence / parallel / loop / conditional 编排，build 时校验配置。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::OrchestrationSection;
use crate::core::{AgentError, DurableServices};
use crate::orchestration::agent::Agent;
use crate::orchestration::planner::OrchestrationPlanner;
use crate::orchestration::planning_loop::run_planning_loop;
use crate::orchestration::scope::{AgentCondition, AgentScope, ExitCondition};
use crate::orchestration::types::{OrchestrationError, Topology};

/// 构建完成的编排定义（可多次 invoke，每次创建新的规划器）
pub struct Orchestration {
    pub(crate) name: String,
    pub(crate) topology: Topology,
    pub(crate) agents: Vec<Arc<dyn Agent>>,
    pub(crate) max_iterations: u32,
    pub(crate) test_exit_at_loop_end: bool,
    pub(crate) exit_condition: Option<ExitCondition>,
    pub(crate) conditions: HashMap<usize, AgentCondition>,
}

impl Orchestration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// 创建并登记规划器，运行进程内规划循环直到编排工作流结束，返回共享作用域
    ///
    /// 每次调用有独立的规划器与 RunId，同一编排可在同一路由上下文上并发调用。
    pub async fn invoke(
        &self,
        services: &DurableServices,
        scope: AgentScope,
    ) -> Result<AgentScope, AgentError> {
        let planner = OrchestrationPlanner::new(
            self,
            scope.clone(),
            services.client(),
            services.planners().clone(),
        );
        services.planners().register(planner.clone());
        info!(
            planner_id = %planner.planner_id(),
            orchestration = %self.name,
            "orchestration invoked"
        );
        run_planning_loop(planner).await?;
        Ok(scope)
    }
}

impl fmt::Debug for Orchestration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestration")
            .field("name", &self.name)
            .field("topology", &self.topology)
            .field("agents", &self.agents.iter().map(|a| a.name()).collect::<Vec<_>>())
            .field("max_iterations", &self.max_iterations)
            .field("test_exit_at_loop_end", &self.test_exit_at_loop_end)
            .finish()
    }
}

/// 编排构建器
pub struct OrchestrationBuilder {
    name: String,
    topology: Topology,
    agents: Vec<Arc<dyn Agent>>,
    max_iterations: u32,
    test_exit_at_loop_end: bool,
    exit_condition: Option<ExitCondition>,
    conditions: HashMap<usize, AgentCondition>,
}

impl OrchestrationBuilder {
    pub fn new(name: impl Into<String>, topology: Topology) -> Self {
        Self {
            name: name.into(),
            topology,
            agents: Vec::new(),
            max_iterations: OrchestrationSection::default().default_max_iterations,
            test_exit_at_loop_end: false,
            exit_condition: None,
            conditions: HashMap::new(),
        }
    }

    pub fn sequence(name: impl Into<String>) -> Self {
        Self::new(name, Topology::Sequence)
    }

    pub fn parallel(name: impl Into<String>) -> Self {
        Self::new(name, Topology::Parallel)
    }

    pub fn repeat(name: impl Into<String>) -> Self {
        Self::new(name, Topology::Loop)
    }

    pub fn conditional(name: impl Into<String>) -> Self {
        Self::new(name, Topology::Conditional)
    }

    /// 采用配置中的默认值
    pub fn with_config(mut self, section: &OrchestrationSection) -> Self {
        self.max_iterations = section.default_max_iterations;
        self
    }

    pub fn agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn agents(mut self, agents: impl IntoIterator<Item = Arc<dyn Agent>>) -> Self {
        self.agents.extend(agents);
        self
    }

    /// 追加一个带执行条件的智能体（conditional）
    pub fn conditional_agent<F>(mut self, condition: F, agent: Arc<dyn Agent>) -> Self
    where
        F: Fn(&AgentScope) -> bool + Send + Sync + 'static,
    {
        self.conditions.insert(self.agents.len(), Arc::new(condition));
        self.agents.push(agent);
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// loop 退出条件：(scope, 轮次 0 起) → 是否退出
    pub fn exit_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&AgentScope, u32) -> bool + Send + Sync + 'static,
    {
        self.exit_condition = Some(Arc::new(condition));
        self
    }

    /// 只在每轮结束时检查退出条件（默认每个智能体之后检查）
    pub fn test_exit_at_loop_end(mut self, at_end: bool) -> Self {
        self.test_exit_at_loop_end = at_end;
        self
    }

    pub fn build(self) -> Result<Orchestration, OrchestrationError> {
        if self.agents.is_empty() {
            return Err(OrchestrationError::NoAgents(self.name));
        }
        if self.topology == Topology::Loop && self.max_iterations == 0 {
            return Err(OrchestrationError::InvalidConfiguration(
                "loop orchestration requires max_iterations > 0".to_string(),
            ));
        }
        if self.topology != Topology::Loop && self.exit_condition.is_some() {
            return Err(OrchestrationError::InvalidConfiguration(
                "exit condition is only valid for loop orchestrations".to_string(),
            ));
        }
        if self.topology != Topology::Conditional && !self.conditions.is_empty() {
            return Err(OrchestrationError::InvalidConfiguration(
                "agent conditions are only valid for conditional orchestrations".to_string(),
            ));
        }

        Ok(Orchestration {
            name: self.name,
            topology: self.topology,
            agents: self.agents,
            max_iterations: self.max_iterations,
            test_exit_at_loop_end: self.test_exit_at_loop_end,
            exit_condition: self.exit_condition,
            conditions: self.conditions,
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct Noop;

    #[async_trait]
    impl Agent for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        async fn invoke(&self, _scope: &AgentScope) -> Result<(), AgentError> {
            Ok(())
        }
    }

    #[test]
    fn test_build_validates_configuration() {
        assert_eq!(
            OrchestrationBuilder::sequence("empty").build().err(),
            Some(OrchestrationError::NoAgents("empty".into()))
        );

        let err = OrchestrationBuilder::sequence("seq")
            .agent(Arc::new(Noop))
            .exit_condition(|_, _| true)
            .build()
            .err();
        assert!(matches!(err, Some(OrchestrationError::InvalidConfiguration(_))));

        let err = OrchestrationBuilder::repeat("loop")
            .agent(Arc::new(Noop))
            .max_iterations(0)
            .build()
            .err();
        assert!(matches!(err, Some(OrchestrationError::InvalidConfiguration(_))));

        let err = OrchestrationBuilder::parallel("par")
            .conditional_agent(|_| true, Arc::new(Noop))
            .build()
            .err();
        assert!(matches!(err, Some(OrchestrationError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_conditional_agents_indexed_in_order() {
        let orchestration = OrchestrationBuilder::conditional("cond")
            .agent(Arc::new(Noop))
            .conditional_agent(|scope| scope.contains("go"), Arc::new(Noop))
            .with_config(&OrchestrationSection {
                default_max_iterations: 3,
            })
            .build()
            .unwrap();
        assert_eq!(orchestration.agent_count(), 2);
        assert_eq!(orchestration.max_iterations(), 3);
        assert!(orchestration.conditions.contains_key(&1));
        assert!(!orchestration.conditions.contains_key(&0));
    }
}
