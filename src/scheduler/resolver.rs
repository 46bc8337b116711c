//! 依赖解析
//!
//! 就绪任务：Pending、已到期、所有依赖都已 Completed。
//! 依赖 Failed / Cancelled / 不存在的 Pending 任务会被标记为
//! `Failed(BlockedDependency)`，一次 [`resolve`] 内迭代到不动点，整条依赖链同轮失败。

use crate::error::Result;
use crate::tasks::{FailureReason, Task, TaskId, TaskStatus, TaskStore};
use chrono::{DateTime, Utc};
use tracing::warn;

/// 一次解析的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// 就绪任务，按创建顺序
    pub eligible: Vec<TaskId>,
    /// 本轮因依赖失败而被标记 Failed 的任务及其阻塞依赖
    pub newly_blocked: Vec<(TaskId, TaskId)>,
}

/// 只读计算就绪集合，不做阻塞传播
pub fn eligible(store: &TaskStore, now: DateTime<Utc>) -> Vec<TaskId> {
    store
        .iter()
        .filter(|task| is_eligible(store, task, now))
        .map(|task| task.id)
        .collect()
}

/// 传播依赖失败后计算就绪集合
pub fn resolve(store: &mut TaskStore, now: DateTime<Utc>) -> Result<Resolution> {
    let mut newly_blocked = Vec::new();
    loop {
        let blocked: Vec<(TaskId, TaskId)> = store
            .iter()
            .filter(|task| task.status == TaskStatus::Pending)
            .filter_map(|task| blocking_dependency(store, task).map(|dep| (task.id, dep)))
            .collect();
        if blocked.is_empty() {
            break;
        }
        for (id, dependency) in blocked {
            store.update(id, now, |t| {
                t.status = TaskStatus::Failed(FailureReason::BlockedDependency { dependency });
            })?;
            warn!(task_id = %id, dependency = %dependency, "⛔ 依赖失败，任务不可再执行");
            newly_blocked.push((id, dependency));
        }
    }

    Ok(Resolution {
        eligible: eligible(store, now),
        newly_blocked,
    })
}

fn is_eligible(store: &TaskStore, task: &Task, now: DateTime<Utc>) -> bool {
    task.status == TaskStatus::Pending
        && task.is_due(now)
        && task.dependencies.iter().all(|dep| {
            store
                .get(*dep)
                .is_ok_and(|d| d.status == TaskStatus::Completed)
        })
}

/// 第一个永远无法满足的依赖
fn blocking_dependency(store: &TaskStore, task: &Task) -> Option<TaskId> {
    task.dependencies
        .iter()
        .copied()
        .find(|dep| match store.get(*dep) {
            Ok(d) => d.status.is_dead_end(),
            Err(_) => true,
        })
}
