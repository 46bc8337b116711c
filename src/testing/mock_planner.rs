use super::{Script, lock};
use crate::error::{CollaboratorError, Result};
use crate::memory::Insight;
use crate::planner::Planner;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// 可脚本化的 planner
///
/// 没有任何预设时返回单步计划 `["mock step"]`。
#[derive(Clone, Default)]
pub struct MockPlanner {
    responses: Arc<Mutex<Script<std::result::Result<Vec<String>, String>>>>,
    /// 每次调用的 (任务目标, 经验 outcome 列表)
    calls: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl MockPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一份计划
    pub fn with_plan(self, steps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let steps = steps.into_iter().map(Into::into).collect();
        lock(&self.responses).push(Ok(steps));
        self
    }

    /// 追加一次 `PlannerUnavailable`
    pub fn with_failure(self, msg: impl Into<String>) -> Self {
        lock(&self.responses).push(Err(msg.into()));
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Planner for MockPlanner {
    async fn plan(&self, description: &str, insights: &[Insight]) -> Result<Vec<String>> {
        let outcomes = insights.iter().map(|i| i.outcome.clone()).collect();
        lock(&self.calls).push((description.to_string(), outcomes));
        match lock(&self.responses).next() {
            Some(Ok(steps)) => Ok(steps),
            Some(Err(msg)) => Err(CollaboratorError::PlannerUnavailable(msg).into()),
            None => Ok(vec!["mock step".to_string()]),
        }
    }
}
