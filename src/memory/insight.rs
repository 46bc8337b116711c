use crate::tasks::TaskCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 一次任务运行沉淀下来的经验
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub category: TaskCategory,
    /// 原任务目标
    pub description: String,
    /// 运行结果摘要（来自 Reflecting 阶段）
    pub outcome: String,
    pub step_count: usize,
    pub duration_secs: i64,
    pub recorded_at: DateTime<Utc>,
}

impl Insight {
    pub fn new(
        description: impl Into<String>,
        outcome: impl Into<String>,
        step_count: usize,
        duration_secs: i64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let description = description.into();
        Self {
            id: Uuid::new_v4().to_string(),
            category: TaskCategory::classify(&description),
            description,
            outcome: outcome.into(),
            step_count,
            duration_secs,
            recorded_at,
        }
    }

    /// 参与关键词检索的文本
    pub(crate) fn searchable_text(&self) -> String {
        format!("{} {} {}", self.category, self.description, self.outcome).to_lowercase()
    }
}
