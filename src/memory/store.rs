//! 经验存储
//!
//! 检索按关键词命中率打分（命中关键词数 / 总关键词数），主题所属类别与经验类别一致时额外加分。

use super::insight::Insight;
use crate::error::{CollaboratorError, Result};
use crate::tasks::TaskCategory;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 类别一致时的加分
const CATEGORY_BONUS: f32 = 0.5;

/// 长期记忆的统一接口
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// 写入一条经验
    async fn record(&self, insight: Insight) -> Result<()>;

    /// 按主题检索，返回最多 `limit` 条（按相关度、时间倒序）
    async fn query(&self, topic: &str, limit: usize) -> Result<Vec<Insight>>;
}

// ── InMemoryInsightStore ──────────────────────────────────────────────────────

/// 进程内存实现，不持久化
#[derive(Default)]
pub struct InMemoryInsightStore {
    insights: RwLock<Vec<Insight>>,
}

impl InMemoryInsightStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.insights.read().await.len()
    }
}

#[async_trait]
impl MemoryStore for InMemoryInsightStore {
    async fn record(&self, insight: Insight) -> Result<()> {
        self.insights.write().await.push(insight);
        Ok(())
    }

    async fn query(&self, topic: &str, limit: usize) -> Result<Vec<Insight>> {
        let insights = self.insights.read().await;
        Ok(rank(&insights, topic, limit))
    }
}

// ── FileInsightStore ──────────────────────────────────────────────────────────

/// 基于 JSON 文件的经验存储，文件内容是 [`Insight`] 数组
pub struct FileInsightStore {
    path: PathBuf,
    insights: RwLock<Vec<Insight>>,
}

impl FileInsightStore {
    /// 打开或创建经验文件，自动建父目录；文件损坏时从空状态开始
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = crate::config::expand_tilde(path.as_ref());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CollaboratorError::MemoryUnavailable(format!("创建目录失败: {e}"))
            })?;
        }
        let insights: Vec<Insight> = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                CollaboratorError::MemoryUnavailable(format!("读取经验文件失败: {e}"))
            })?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("经验文件解析失败，从空状态开始: {e}");
                Vec::new()
            })
        } else {
            Vec::new()
        };
        info!(path = %path.display(), insights = insights.len(), "🧠 FileInsightStore 初始化");
        Ok(Self {
            path,
            insights: RwLock::new(insights),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self) -> Result<()> {
        let insights = self.insights.read().await;
        let json = serde_json::to_string_pretty(&*insights)
            .map_err(|e| CollaboratorError::MemoryUnavailable(e.to_string()))?;
        // 先写临时文件再改名，中断时旧文件保持完整
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(|e| {
            CollaboratorError::MemoryUnavailable(format!("写入经验文件失败: {e}"))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            CollaboratorError::MemoryUnavailable(format!("替换经验文件失败: {e}"))
        })?;
        debug!(path = %self.path.display(), "💾 经验已持久化");
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for FileInsightStore {
    async fn record(&self, insight: Insight) -> Result<()> {
        self.insights.write().await.push(insight);
        self.flush().await
    }

    async fn query(&self, topic: &str, limit: usize) -> Result<Vec<Insight>> {
        let insights = self.insights.read().await;
        let hits = rank(&insights, topic, limit);
        debug!(topic = %topic, hits = hits.len(), "🔍 经验检索");
        Ok(hits)
    }
}

// ── 私有工具函数 ──────────────────────────────────────────────────────────────

fn rank(insights: &[Insight], topic: &str, limit: usize) -> Vec<Insight> {
    let keywords = tokenize(topic);
    let category = TaskCategory::classify(topic);
    let mut scored: Vec<(f32, &Insight)> = insights
        .iter()
        .filter_map(|insight| {
            let mut score = relevance_score(&insight.searchable_text(), &keywords);
            if score > 0.0 && category != TaskCategory::General && insight.category == category {
                score += CATEGORY_BONUS;
            }
            (score > 0.0).then_some((score, insight))
        })
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.1.recorded_at.cmp(&a.1.recorded_at))
    });
    scored
        .into_iter()
        .take(limit)
        .map(|(_, insight)| insight.clone())
        .collect()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || "，。！？、；：,.!?;: ".contains(c))
        .filter(|s| !s.is_empty() && s.len() > 1)
        .map(|s| s.to_lowercase())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect()
}

/// 命中关键词数 / 总关键词数；没有关键词时全部视为相关
fn relevance_score(text: &str, keywords: &[String]) -> f32 {
    if keywords.is_empty() {
        return 1.0;
    }
    let matched = keywords
        .iter()
        .filter(|kw| text.contains(kw.as_str()))
        .count();
    matched as f32 / keywords.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn insight(description: &str, outcome: &str, minutes: i64) -> Insight {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes);
        Insight::new(description, outcome, 3, 60, at)
    }

    #[tokio::test]
    async fn test_query_ranks_by_relevance() {
        let store = InMemoryInsightStore::new();
        store
            .record(insight("Research tokio internals", "ok", 0))
            .await
            .unwrap();
        store
            .record(insight("Water the plants", "ok", 1))
            .await
            .unwrap();
        store
            .record(insight("Research rust tokio scheduler", "ok", 2))
            .await
            .unwrap();

        let hits = store.query("research tokio scheduler", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].description, "Research rust tokio scheduler");
        assert_eq!(hits[1].description, "Research tokio internals");
    }

    #[tokio::test]
    async fn test_query_respects_limit() {
        let store = InMemoryInsightStore::new();
        for i in 0..5 {
            store
                .record(insight(&format!("Draft memo {i}"), "ok", i))
                .await
                .unwrap();
        }
        let hits = store.query("memo", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        // 同分时最近的在前
        assert_eq!(hits[0].description, "Draft memo 4");
    }

    #[tokio::test]
    async fn test_query_without_match_is_empty() {
        let store = InMemoryInsightStore::new();
        store.record(insight("Build a CLI", "ok", 0)).await.unwrap();
        assert!(store.query("gardening", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        {
            let store = FileInsightStore::new(&path).unwrap();
            store
                .record(insight("Analyze sales data", "found trend", 0))
                .await
                .unwrap();
        }
        let reopened = FileInsightStore::new(&path).unwrap();
        let hits = reopened.query("analyze sales", 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].category, TaskCategory::Analysis);
        assert_eq!(hits[0].outcome, "found trend");
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        std::fs::write(&path, "not json").unwrap();
        let store = FileInsightStore::new(&path).unwrap();
        assert!(store.query("", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flush_replaces_file_through_temp_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let tmp = path.with_extension("json.tmp");
        let store = FileInsightStore::new(&path).unwrap();
        store
            .record(insight("Write release notes", "shipped", 0))
            .await
            .unwrap();
        assert!(!tmp.exists(), "临时文件应该已被改名");

        // 中断的写入只留下半截临时文件，正式文件不受影响
        std::fs::write(&tmp, "[{\"id\":").unwrap();
        let reopened = FileInsightStore::new(&path).unwrap();
        assert_eq!(reopened.query("release notes", 3).await.unwrap().len(), 1);

        reopened
            .record(insight("Write launch post", "posted", 1))
            .await
            .unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let saved: Vec<Insight> = serde_json::from_str(&raw).unwrap();
        assert_eq!(saved.len(), 2);
        assert!(!tmp.exists());
    }
}
