//! 周期任务再物化
//!
//! 周期任务完成后生成一个新的 Pending 实例（新 ID），`last_run_at = due_at = next_due`。
//! 完成实例上的 `rematerialized_as` 标记保证同一实例只生成一次；
//! 错过多个周期时也只补一个实例。

use crate::error::{Result, StoreError};
use crate::tasks::{Recurrence, TaskId, TaskStatus, TaskStore};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// 计算下一次到期时间，溢出时返回 `None`
pub fn next_due(rule: &Recurrence, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    rule.next_after(from)
}

/// 为一个已完成的周期任务生成下一实例
///
/// 非周期任务、未完成任务或已生成过实例时返回 `Ok(None)`。
pub fn rematerialize(
    store: &mut TaskStore,
    id: TaskId,
    now: DateTime<Utc>,
) -> Result<Option<TaskId>> {
    let task = store.get(id)?;
    let Some(rule) = task.recurrence else {
        return Ok(None);
    };
    if task.status != TaskStatus::Completed || task.rematerialized_as.is_some() {
        return Ok(None);
    }

    let base = task.last_run_at.or(task.completed_at).unwrap_or(now);
    let due = next_due(&rule, base).ok_or_else(|| StoreError::InvalidSpec {
        field: "recurrence".to_string(),
        message: format!("next occurrence after {} is out of range", base),
    })?;

    let template = task.clone();
    let instance = store.insert_instance(&template, due, now);
    store.mark_rematerialized(id, instance)?;
    info!(
        task_id = %id,
        instance = %instance,
        due_at = %due,
        catch_up = due <= now,
        "🔁 周期任务已生成下一实例"
    );
    Ok(Some(instance))
}

/// 处理所有尚未再物化的已完成周期任务，返回 `(完成实例, 新实例)` 列表
pub fn sweep(store: &mut TaskStore, now: DateTime<Utc>) -> Vec<(TaskId, TaskId)> {
    let pending: Vec<TaskId> = store
        .iter()
        .filter(|t| {
            t.is_recurring() && t.status == TaskStatus::Completed && t.rematerialized_as.is_none()
        })
        .map(|t| t.id)
        .collect();

    let mut created = Vec::new();
    for id in pending {
        match rematerialize(store, id, now) {
            Ok(Some(instance)) => created.push((id, instance)),
            Ok(None) => {}
            // 单个任务的周期规则无法继续时只跳过它
            Err(e) => warn!(task_id = %id, error = %e, "⚠️ 周期任务无法生成下一实例"),
        }
    }
    created
}
