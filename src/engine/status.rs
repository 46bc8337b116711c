use crate::scheduler::resolver::eligible;
use crate::tasks::{AgentState, TaskId, TaskStatus, TaskStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// 当前 Active 任务概况
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveSummary {
    pub id: TaskId,
    pub description: String,
    pub state: AgentState,
    /// 已完成的步骤数
    pub step: usize,
    pub total_steps: usize,
}

/// agent 状态报告
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStatus {
    pub autonomous: bool,
    /// 调度循环是否在运行
    pub running: bool,
    pub active: Option<ActiveSummary>,
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// 已到期但依赖未满足的 Pending 任务
    pub blocked: usize,
    /// 尚未到期的周期实例
    pub scheduled: usize,
    /// 最早到期的周期实例
    pub next_scheduled: Option<(TaskId, DateTime<Utc>)>,
    pub total: usize,
}

impl AgentStatus {
    pub fn collect(store: &TaskStore, autonomous: bool, running: bool, now: DateTime<Utc>) -> Self {
        let ready = eligible(store, now);
        let mut status = AgentStatus {
            autonomous,
            running,
            active: None,
            pending: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
            blocked: 0,
            scheduled: 0,
            next_scheduled: None,
            total: store.len(),
        };

        for task in store.iter() {
            match &task.status {
                TaskStatus::Pending => {
                    status.pending += 1;
                    if !task.is_due(now) {
                        status.scheduled += 1;
                        if let Some(due) = task.due_at
                            && status.next_scheduled.is_none_or(|(_, at)| due < at)
                        {
                            status.next_scheduled = Some((task.id, due));
                        }
                    } else if !ready.contains(&task.id) {
                        status.blocked += 1;
                    }
                }
                TaskStatus::Active(state) => {
                    status.active = Some(ActiveSummary {
                        id: task.id,
                        description: task.description.clone(),
                        state: *state,
                        step: task.current_step_index,
                        total_steps: task.plan.len(),
                    });
                }
                TaskStatus::Completed => status.completed += 1,
                TaskStatus::Failed(_) => status.failed += 1,
                TaskStatus::Cancelled => status.cancelled += 1,
            }
        }
        status
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on_off = |b: bool| if b { "on" } else { "off" };
        writeln!(
            f,
            "Autonomous mode: {} | Loop: {}",
            on_off(self.autonomous),
            if self.running { "running" } else { "stopped" }
        )?;
        match &self.active {
            Some(active) => writeln!(
                f,
                "Active task: {} {} [{:?}, step {}/{}]",
                active.id, active.description, active.state, active.step, active.total_steps
            )?,
            None => writeln!(f, "Active task: none")?,
        }
        writeln!(
            f,
            "Tasks: {} total | {} pending ({} blocked, {} scheduled) | {} completed | {} failed | {} cancelled",
            self.total,
            self.pending,
            self.blocked,
            self.scheduled,
            self.completed,
            self.failed,
            self.cancelled
        )?;
        if let Some((id, due)) = self.next_scheduled {
            write!(f, "Next scheduled: {} at {}", id, due.to_rfc3339())?;
        } else {
            write!(f, "Next scheduled: none")?;
        }
        Ok(())
    }
}
