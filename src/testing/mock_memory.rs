use super::lock;
use crate::error::{CollaboratorError, Result};
use crate::memory::{Insight, MemoryStore};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// 记录所有读写的记忆存储
///
/// `query` 不做相关度排序，按写入顺序返回前 `limit` 条。
#[derive(Clone, Default)]
pub struct MockMemory {
    insights: Arc<Mutex<Vec<Insight>>>,
    queries: Arc<Mutex<Vec<String>>>,
    recorded: Arc<Mutex<Vec<Insight>>>,
    unavailable: bool,
}

impl MockMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置可被检索到的经验
    pub fn with_insights(self, insights: Vec<Insight>) -> Self {
        lock(&self.insights).extend(insights);
        self
    }

    /// 所有读写都返回 `MemoryUnavailable`
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }

    pub fn recorded(&self) -> Vec<Insight> {
        lock(&self.recorded).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.queries).len() + lock(&self.recorded).len()
    }
}

#[async_trait]
impl MemoryStore for MockMemory {
    async fn record(&self, insight: Insight) -> Result<()> {
        if self.unavailable {
            return Err(CollaboratorError::MemoryUnavailable("mock memory is down".into()).into());
        }
        lock(&self.recorded).push(insight.clone());
        lock(&self.insights).push(insight);
        Ok(())
    }

    async fn query(&self, topic: &str, limit: usize) -> Result<Vec<Insight>> {
        lock(&self.queries).push(topic.to_string());
        if self.unavailable {
            return Err(CollaboratorError::MemoryUnavailable("mock memory is down".into()).into());
        }
        Ok(lock(&self.insights).iter().take(limit).cloned().collect())
    }
}
