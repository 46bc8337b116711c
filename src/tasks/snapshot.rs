//! 任务快照持久化
//!
//! 进程重启后依靠快照恢复全部任务（含 `status` / `plan` / `current_step_index`）。
//!
//! ## 恢复策略
//!
//! | 策略 | 行为 |
//! |------|------|
//! | [`RecoveryPolicy::ResetActive`] | 快照中的 Active 任务退回 Pending，清空计划和重试计数，下次被选中时重新规划（默认） |
//! | [`RecoveryPolicy::Resume`] | 原样恢复 Active 任务，从 `current_step_index` 继续执行 |
//!
//! ## 内置实现
//!
//! - [`InMemoryPersistence`]：进程内存，适合测试
//! - [`FilePersistence`]：JSON 文件，写时立即落盘

use crate::config::expand_tilde;
use crate::error::{PersistError, Result};
use crate::tasks::store::TaskStore;
use crate::tasks::task::{Task, TaskId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const SNAPSHOT_VERSION: u8 = 1;

/// 重启时如何处理快照中的 Active 任务
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPolicy {
    #[default]
    ResetActive,
    Resume,
}

impl RecoveryPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().replace('-', "_").as_str() {
            "reset_active" | "reset" => Some(RecoveryPolicy::ResetActive),
            "resume" => Some(RecoveryPolicy::Resume),
            _ => None,
        }
    }
}

/// 持久化格式：按创建顺序排列的任务记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default = "default_snapshot_version")]
    pub version: u8,
    /// 下一个待分配的 ID，保证重启后不复用
    pub next_id: u64,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

fn default_snapshot_version() -> u8 {
    SNAPSHOT_VERSION
}

impl TaskStore {
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            version: SNAPSHOT_VERSION,
            next_id: self.next_id,
            tasks: self.tasks.values().cloned().collect(),
        }
    }

    /// 从快照重建 store，并按 `policy` 处理 Active 任务
    pub fn restore(
        snapshot: StoreSnapshot,
        policy: RecoveryPolicy,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let mut store = TaskStore::new();
        let mut max_id = 0;
        for task in snapshot.tasks {
            max_id = max_id.max(task.id.0);
            if store.tasks.insert(task.id, task).is_some() {
                return Err(PersistError::Corrupt("duplicate task id".to_string()).into());
            }
        }
        store.next_id = snapshot.next_id.max(max_id + 1);

        let cycles = store.detect_circular_dependencies();
        if !cycles.is_empty() {
            let paths: Vec<String> = cycles
                .iter()
                .map(|cycle| {
                    let ids: Vec<String> = cycle.iter().map(TaskId::to_string).collect();
                    format!("[{}]", ids.join(" -> "))
                })
                .collect();
            return Err(PersistError::Corrupt(format!(
                "dependency cycle: {}",
                paths.join(", ")
            ))
            .into());
        }

        let active: Vec<TaskId> = store
            .tasks
            .values()
            .filter(|t| t.status.is_active())
            .map(|t| t.id)
            .collect();

        for (index, id) in active.iter().enumerate() {
            // Resume 时只保留第一个 Active，其余一律退回 Pending
            let keep = policy == RecoveryPolicy::Resume && index == 0;
            if keep {
                info!(task_id = %id, "♻️ 恢复进行中的任务，从当前步骤继续");
                continue;
            }
            if let Some(task) = store.tasks.get_mut(id) {
                task.reset_to_pending();
                task.updated_at = now;
                warn!(task_id = %id, "♻️ 快照中的 Active 任务已退回 Pending");
            }
        }

        Ok(store)
    }
}

/// 任务快照的持久化接口
#[async_trait]
pub trait TaskPersistence: Send + Sync {
    /// 覆盖保存最新快照
    async fn save(&self, snapshot: &StoreSnapshot) -> Result<()>;

    /// 读取最新快照（从未保存过时返回 `None`）
    async fn load(&self) -> Result<Option<StoreSnapshot>>;
}

/// 进程内存持久化，重启即清空
#[derive(Default)]
pub struct InMemoryPersistence {
    data: RwLock<Option<StoreSnapshot>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskPersistence for InMemoryPersistence {
    async fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        *self.data.write().await = Some(snapshot.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<StoreSnapshot>> {
        Ok(self.data.read().await.clone())
    }
}

/// 基于 JSON 文件的快照持久化
///
/// 存储格式：
/// ```json
/// { "version": 1, "next_id": 4, "tasks": [ { "id": 1, "description": "...", "status": "Pending", ... } ] }
/// ```
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    /// 打开快照文件路径，自动建父目录
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = expand_tilde(path.as_ref());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PersistError::IoError(format!("创建目录失败: {e}")))?;
        }
        info!(path = %path.display(), "🗂️ FilePersistence 初始化");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TaskPersistence for FilePersistence {
    async fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| PersistError::SerializationError(e.to_string()))?;
        // 先写临时文件再改名，避免写到一半的快照
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| PersistError::IoError(format!("写入快照失败: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| PersistError::IoError(format!("替换快照失败: {e}")))?;
        debug!(path = %self.path.display(), tasks = snapshot.tasks.len(), "💾 任务快照已持久化");
        Ok(())
    }

    async fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(None);
        }
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| PersistError::IoError(format!("读取快照失败: {e}")))?;
        // 解析失败直接报错，不能用空状态覆盖用户的任务文件
        let snapshot: StoreSnapshot = serde_json::from_str(&raw)
            .map_err(|e| PersistError::Corrupt(format!("{}: {e}", self.path.display())))?;
        info!(path = %self.path.display(), tasks = snapshot.tasks.len(), "📂 已加载任务快照");
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AutopilotError;
    use crate::tasks::task::{AgentState, RecurrenceUnit, TaskSpec, TaskStatus};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    /// 一个执行到第 2 步的 Active 任务 + 一个依赖它的 Pending 任务
    fn in_flight_store() -> (TaskStore, TaskId, TaskId) {
        let mut store = TaskStore::new();
        let a = store
            .add(
                TaskSpec::new("研究 Rust 异步").priority(4).every(1, RecurrenceUnit::Week),
                t0(),
            )
            .unwrap();
        let b = store.add(TaskSpec::new("写总结").depends_on(a), t0()).unwrap();
        store
            .update(a, t0(), |t| t.status = TaskStatus::Active(AgentState::Planning))
            .unwrap();
        store
            .update(a, t0(), |t| {
                t.status = TaskStatus::Active(AgentState::Executing);
                t.plan = vec!["s1".into(), "s2".into(), "s3".into()];
                t.current_step_index = 2;
                t.retry_count = 1;
                t.results = vec!["r1".into(), "r2".into()];
            })
            .unwrap();
        (store, a, b)
    }

    #[tokio::test]
    async fn test_file_round_trip_keeps_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = FilePersistence::new(dir.path().join("tasks.json")).unwrap();
        let (store, _, _) = in_flight_store();

        persistence.save(&store.snapshot()).await.unwrap();
        let loaded = persistence.load().await.unwrap().expect("应该读到快照");
        assert_eq!(loaded, store.snapshot(), "所有字段都应往返一致");
    }

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = FilePersistence::new(dir.path().join("nested/tasks.json")).unwrap();
        assert!(persistence.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, "{ not json").unwrap();
        let persistence = FilePersistence::new(&path).unwrap();
        let err = persistence.load().await.unwrap_err();
        assert!(matches!(err, AutopilotError::Persist(PersistError::Corrupt(_))));
    }

    #[test]
    fn test_restore_reset_active_policy() {
        let (store, a, b) = in_flight_store();
        let restored =
            TaskStore::restore(store.snapshot(), RecoveryPolicy::ResetActive, t0()).unwrap();

        let task = restored.get(a).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0, "重试计数应该清零");
        assert!(task.plan.is_empty());
        assert_eq!(task.current_step_index, 0);
        assert!(restored.active().is_none());
        assert_eq!(restored.get(b).unwrap().dependencies, vec![a]);
    }

    #[test]
    fn test_restore_resume_policy_keeps_step_position() {
        let (store, a, _) = in_flight_store();
        let restored = TaskStore::restore(store.snapshot(), RecoveryPolicy::Resume, t0()).unwrap();

        let task = restored.get(a).unwrap();
        assert_eq!(task.status, TaskStatus::Active(AgentState::Executing));
        assert_eq!(task.current_step_index, 2);
        assert_eq!(task.retry_count, 1);
        assert_eq!(task.current_step(), Some("s3"));
    }

    #[test]
    fn test_restore_never_reuses_ids() {
        let (store, _, b) = in_flight_store();
        let mut snapshot = store.snapshot();
        snapshot.next_id = 1;
        let mut restored = TaskStore::restore(snapshot, RecoveryPolicy::ResetActive, t0()).unwrap();
        let fresh = restored.add(TaskSpec::new("新任务"), t0()).unwrap();
        assert!(fresh > b, "新 ID 必须大于快照中的最大 ID");
    }

    #[test]
    fn test_restore_rejects_cycles() {
        let (store, a, b) = in_flight_store();
        let mut snapshot = store.snapshot();
        for task in &mut snapshot.tasks {
            if task.id == a {
                task.dependencies.push(b);
            }
        }
        let err = TaskStore::restore(snapshot, RecoveryPolicy::Resume, t0()).unwrap_err();
        assert!(matches!(err, AutopilotError::Persist(PersistError::Corrupt(_))));
    }

    #[test]
    fn test_recovery_policy_parse() {
        assert_eq!(RecoveryPolicy::parse("resume"), Some(RecoveryPolicy::Resume));
        assert_eq!(
            RecoveryPolicy::parse("reset-active"),
            Some(RecoveryPolicy::ResetActive)
        );
        assert_eq!(RecoveryPolicy::parse("later"), None);
    }
}
