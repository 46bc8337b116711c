//! 规划协作者
//!
//! 给定任务目标和相关的历史经验，返回有序的步骤描述列表。

mod heuristic;

pub use heuristic::HeuristicPlanner;

use crate::error::Result;
use crate::memory::Insight;
use async_trait::async_trait;

/// 规划接口，不可用时返回 [`CollaboratorError::PlannerUnavailable`](crate::error::CollaboratorError)
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, description: &str, insights: &[Insight]) -> Result<Vec<String>>;
}
