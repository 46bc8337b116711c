//! 任务存储
//!
//! 持有全部任务的权威集合，只负责增删改查与状态迁移校验，不包含调度逻辑。
//! 依赖以 [`TaskId`] 表示（arena/index 风格），每轮调度重新计算就绪集合。

use crate::error::{DependencyProblem, Result, StoreError};
use crate::tasks::task::{
    AgentState, FailureReason, MAX_PRIORITY, MIN_PRIORITY, Recurrence, Task, TaskId, TaskSpec,
    TaskStatus,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// 任务集合管理器
///
/// `BTreeMap` 按 ID 排序，ID 单调递增，因此迭代顺序即创建顺序。
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    pub(crate) tasks: BTreeMap<TaskId, Task>,
    pub(crate) next_id: u64,
}

/// `delete` 的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Deleted {
    pub id: TaskId,
    /// 删除前是否为 Active（调用方需中止状态机）
    pub was_active: bool,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            tasks: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// 创建任务，返回新 ID
    ///
    /// 依赖不存在或会形成环时返回 `InvalidDependency`，store 保持不变。
    pub fn add(&mut self, spec: TaskSpec, now: DateTime<Utc>) -> Result<TaskId> {
        let priority = spec.priority.unwrap_or(MIN_PRIORITY);
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            return Err(StoreError::InvalidSpec {
                field: "priority".to_string(),
                message: format!("must be within {}-{}, got {}", MIN_PRIORITY, MAX_PRIORITY, priority),
            }
            .into());
        }
        if let Some(rule) = &spec.recurrence {
            check_recurrence(rule, now)?;
        }
        if spec.description.trim().is_empty() {
            return Err(StoreError::InvalidSpec {
                field: "description".to_string(),
                message: "must not be empty".to_string(),
            }
            .into());
        }

        let mut dependencies: Vec<TaskId> = Vec::with_capacity(spec.dependencies.len());
        for dep in spec.dependencies {
            if !self.tasks.contains_key(&dep) {
                return Err(StoreError::InvalidDependency {
                    task: None,
                    dependency: dep,
                    reason: DependencyProblem::Missing,
                }
                .into());
            }
            if !dependencies.contains(&dep) {
                dependencies.push(dep);
            }
        }

        let id = self.allocate_id();
        let mut task = Task::new(id, spec.description, now);
        task.priority = priority;
        task.deadline = spec.deadline;
        task.dependencies = dependencies;
        task.recurrence = spec.recurrence;

        info!(task_id = %id, priority = priority, deps = ?task.dependencies, "📝 任务已创建");
        self.tasks.insert(id, task);
        Ok(id)
    }

    /// 为已有的 Pending 任务追加依赖边
    ///
    /// 依赖不存在或会闭合环时返回 `InvalidDependency`，校验由 [`update`](Self::update) 完成。
    pub fn add_dependency(
        &mut self,
        task_id: TaskId,
        dependency: TaskId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.get(task_id)?.dependencies.contains(&dependency) {
            return Ok(());
        }
        self.update(task_id, now, |t| t.dependencies.push(dependency))?;
        debug!(task_id = %task_id, dependency = %dependency, "🔗 依赖已添加");
        Ok(())
    }

    pub fn get(&self, id: TaskId) -> Result<&Task> {
        self.tasks
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(id).into())
    }

    /// 全部任务（创建顺序）
    pub fn list(&self) -> Vec<&Task> {
        self.tasks.values().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// 当前占用 Active 槽位的任务
    pub fn active(&self) -> Option<&Task> {
        self.tasks.values().find(|t| t.status.is_active())
    }

    /// 以 mutator 原子地修改任务
    ///
    /// mutator 作用在副本上，校验通过后才整体写回；失败时 store 不变。
    /// 新增的依赖边与 `add_dependency` 走同样的存在性和环检测。
    pub fn update<F>(&mut self, id: TaskId, now: DateTime<Utc>, mutator: F) -> Result<&Task>
    where
        F: FnOnce(&mut Task),
    {
        let before = self.get(id)?;
        let mut after = before.clone();
        mutator(&mut after);
        after.id = before.id;
        after.created_at = before.created_at;

        check_transition(before, &after)?;
        if after.dependencies != before.dependencies {
            self.check_new_dependencies(before, &after)?;
        }
        if after.recurrence != before.recurrence
            && let Some(rule) = &after.recurrence
        {
            check_recurrence(rule, now)?;
        }

        if after.status.is_active()
            && let Some(other) = self.active()
            && other.id != id
        {
            return Err(StoreError::InvalidTransition {
                task: id,
                from: before.status.to_string(),
                to: format!("{} (task {} is already active)", after.status, other.id),
            }
            .into());
        }

        if after != *before {
            after.updated_at = now;
            if after.status.is_terminal() && after.completed_at.is_none() {
                after.completed_at = Some(now);
            }
            if after.status == TaskStatus::Completed
                && before.status != TaskStatus::Completed
                && after.is_recurring()
            {
                after.last_run_at = Some(now);
            }
            if before.status != after.status {
                debug!(task_id = %id, from = %before.status, to = %after.status, "🔄 任务状态迁移");
            }
        }

        self.tasks.insert(id, after);
        self.get(id)
    }

    /// 用户删除：Pending / Active → Cancelled，保留记录
    pub fn delete(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<Deleted> {
        let task = self.get(id)?;
        let was_active = task.status.is_active();
        if task.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                task: id,
                from: task.status.to_string(),
                to: TaskStatus::Cancelled.to_string(),
            }
            .into());
        }
        self.update(id, now, |t| t.status = TaskStatus::Cancelled)?;
        info!(task_id = %id, was_active = was_active, "🗑️ 任务已取消");
        Ok(Deleted { id, was_active })
    }

    /// 由周期引擎调用：基于已完成实例生成下一个 Pending 实例
    pub(crate) fn insert_instance(
        &mut self,
        template: &Task,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> TaskId {
        let id = self.allocate_id();
        let mut task = Task::new(id, template.description.clone(), now);
        task.priority = template.priority;
        task.deadline = template.deadline;
        task.dependencies = template.dependencies.clone();
        task.recurrence = template.recurrence;
        task.last_run_at = Some(due_at);
        task.due_at = Some(due_at);
        self.tasks.insert(id, task);
        id
    }

    /// 终态任务唯一允许的修改：写入再物化标记
    pub(crate) fn mark_rematerialized(&mut self, id: TaskId, instance: TaskId) -> Result<()> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        task.rematerialized_as = Some(instance);
        Ok(())
    }

    /// 依赖只能在 Pending 时追加，每条新边都必须指向已有任务且不闭合环
    fn check_new_dependencies(
        &self,
        before: &Task,
        after: &Task,
    ) -> std::result::Result<(), StoreError> {
        let added: Vec<TaskId> = after
            .dependencies
            .iter()
            .copied()
            .filter(|dep| !before.dependencies.contains(dep))
            .collect();
        if added.is_empty() {
            return Ok(());
        }
        if before.status != TaskStatus::Pending {
            return Err(StoreError::InvalidTransition {
                task: before.id,
                from: before.status.to_string(),
                to: "Pending (new dependency)".to_string(),
            });
        }
        // 新边都从同一个任务出发，简单环只会经过其中一条，逐条对旧图检测即可
        for dependency in added {
            if !self.tasks.contains_key(&dependency) {
                return Err(StoreError::InvalidDependency {
                    task: Some(before.id),
                    dependency,
                    reason: DependencyProblem::Missing,
                });
            }
            if let Some(cycle) = self.would_close_cycle(before.id, dependency) {
                return Err(StoreError::InvalidDependency {
                    task: Some(before.id),
                    dependency,
                    reason: DependencyProblem::Cycle(cycle),
                });
            }
        }
        Ok(())
    }

    fn allocate_id(&mut self) -> TaskId {
        let id = TaskId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        id
    }
}

/// 周期间隔必须为正，且从 `now` 起的下一次到期时间可表示
fn check_recurrence(rule: &Recurrence, now: DateTime<Utc>) -> std::result::Result<(), StoreError> {
    if rule.interval == 0 {
        return Err(StoreError::InvalidSpec {
            field: "recurrence.interval".to_string(),
            message: "must be a positive integer".to_string(),
        });
    }
    if rule.next_after(now).is_none() {
        return Err(StoreError::InvalidSpec {
            field: "recurrence.interval".to_string(),
            message: format!("every {} {:?} is out of the supported date range", rule.interval, rule.unit),
        });
    }
    Ok(())
}

/// 校验单个任务前后两个版本之间的迁移是否合法
fn check_transition(before: &Task, after: &Task) -> std::result::Result<(), StoreError> {
    let invalid = |to: String| StoreError::InvalidTransition {
        task: before.id,
        from: before.status.to_string(),
        to,
    };

    // 终态任务不可再修改
    if before.status.is_terminal() {
        if after != before {
            return Err(invalid(after.status.to_string()));
        }
        return Ok(());
    }

    if after.current_step_index > after.plan.len() {
        return Err(invalid(format!(
            "{} (step cursor {} beyond plan of {})",
            after.status,
            after.current_step_index,
            after.plan.len()
        )));
    }

    use AgentState::*;
    let allowed = match (&before.status, &after.status) {
        (TaskStatus::Pending, TaskStatus::Pending) => true,
        (TaskStatus::Pending, TaskStatus::Active(Planning)) => true,
        (TaskStatus::Pending, TaskStatus::Completed | TaskStatus::Cancelled) => true,
        (TaskStatus::Pending, TaskStatus::Failed(FailureReason::BlockedDependency { .. })) => true,
        (TaskStatus::Pending, _) => false,
        // 只有计划执行完才能进入反思
        (TaskStatus::Active(Executing), TaskStatus::Active(Reflecting)) => {
            after.current_step_index == after.plan.len()
        }
        (TaskStatus::Active(from), TaskStatus::Active(to)) => matches!(
            (from, to),
            (Planning, Planning)
                | (Planning, Executing)
                | (Executing, Executing)
                | (Reflecting, Reflecting)
                | (Reflecting, Learning)
                | (Learning, Learning)
        ),
        (TaskStatus::Active(_), TaskStatus::Pending) => false,
        (TaskStatus::Active(_), _) => true,
        _ => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(invalid(after.status.to_string()))
    }
}
