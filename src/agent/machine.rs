//! Agent 状态机
//!
//! 纯函数：`(task, event) -> (task', side_effect)`，不做任何 IO。
//! 外部调用由 [`AgentDriver`](super::AgentDriver) 根据 [`SideEffect`] 执行，结果再作为 [`Event`] 喂回。
//!
//! ```text
//! Planning ──PlanReady──► Executing ──(最后一步成功)──► Reflecting ──► Learning ──► Completed
//!    │                       │  ▲
//!    │ PlanFailed            │  │ StepSucceeded / StepFailed(未超限)
//!    ▼                       ▼  │
//!  Failed(PlanningFailed)  Failed(StepExhausted)
//! ```

use crate::error::{Result, StoreError};
use crate::memory::Insight;
use crate::tasks::{AgentState, FailureReason, Task, TaskStatus};
use chrono::{DateTime, Utc};

/// 外部协作者调用的结果，或内部推进信号
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PlanReady(Vec<String>),
    PlanFailed(String),
    StepSucceeded(String),
    StepFailed(String),
    /// 不依赖外部结果的推进（Reflecting、记录经验之后）
    Advance,
}

/// 当前状态要求 driver 执行的动作
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    RequestPlan { description: String },
    ExecuteStep { index: usize, step: String },
    RecordInsight(Insight),
    /// 无需外部调用，直接以 [`Event::Advance`] 推进
    Continue,
    /// 任务已进入终态，释放 Active 槽位
    Release(Outcome),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed,
    Failed(FailureReason),
}

/// 状态机参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
    /// 单步允许的重试次数，超过后任务以 StepExhausted 失败
    pub retry_limit: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Self { retry_limit: 3 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub task: Task,
    pub effect: SideEffect,
}

/// Pending → Active(Planning)，清空上一轮的运行期字段
pub fn activate(task: &Task, now: DateTime<Utc>) -> Result<Transition> {
    if task.status != TaskStatus::Pending {
        return Err(invalid(task, "Active(Planning)"));
    }
    let mut next = task.clone();
    next.reset_to_pending();
    next.status = TaskStatus::Active(AgentState::Planning);
    next.activated_at = Some(now);
    let effect = pending_effect(&next, now);
    Ok(Transition { task: next, effect })
}

/// 当前状态需要执行的动作
pub fn pending_effect(task: &Task, now: DateTime<Utc>) -> SideEffect {
    match &task.status {
        TaskStatus::Active(AgentState::Planning) => SideEffect::RequestPlan {
            description: task.description.clone(),
        },
        TaskStatus::Active(AgentState::Executing) => match task.current_step() {
            Some(step) => SideEffect::ExecuteStep {
                index: task.current_step_index,
                step: step.to_string(),
            },
            None => SideEffect::Continue,
        },
        TaskStatus::Active(AgentState::Reflecting) => SideEffect::Continue,
        TaskStatus::Active(AgentState::Learning) => SideEffect::RecordInsight(insight_for(task, now)),
        TaskStatus::Completed => SideEffect::Release(Outcome::Completed),
        TaskStatus::Failed(reason) => SideEffect::Release(Outcome::Failed(reason.clone())),
        TaskStatus::Pending | TaskStatus::Cancelled => SideEffect::Continue,
    }
}

/// 推进一次状态迁移
///
/// 事件与当前状态不匹配时返回 `InvalidTransition`，任务不变。
pub fn transition(
    task: &Task,
    event: Event,
    policy: &Policy,
    now: DateTime<Utc>,
) -> Result<Transition> {
    let TaskStatus::Active(state) = &task.status else {
        return Err(invalid(task, &format!("{:?}", event)));
    };
    let mut next = task.clone();

    match (*state, event) {
        (AgentState::Planning, Event::PlanReady(steps)) => {
            if steps.is_empty() {
                next.status = TaskStatus::Failed(FailureReason::PlanningFailed {
                    detail: "planner returned an empty plan".to_string(),
                });
            } else {
                next.plan = steps;
                next.current_step_index = 0;
                next.retry_count = 0;
                next.status = TaskStatus::Active(AgentState::Executing);
            }
        }
        (AgentState::Planning, Event::PlanFailed(detail)) => {
            next.status = TaskStatus::Failed(FailureReason::PlanningFailed { detail });
        }
        (AgentState::Executing, Event::StepSucceeded(output)) if task.current_step().is_some() => {
            next.results.push(output);
            next.current_step_index += 1;
            next.retry_count = 0;
            if next.current_step_index == next.plan.len() {
                next.status = TaskStatus::Active(AgentState::Reflecting);
            }
        }
        (AgentState::Executing, Event::StepFailed(detail)) if task.current_step().is_some() => {
            next.retry_count += 1;
            next.last_error = Some(detail.clone());
            if next.retry_count > policy.retry_limit {
                next.status = TaskStatus::Failed(FailureReason::StepExhausted {
                    step_index: next.current_step_index,
                    detail,
                });
            }
        }
        // 恢复的快照中游标已到末尾
        (AgentState::Executing, Event::Advance) if task.current_step().is_none() => {
            next.status = TaskStatus::Active(AgentState::Reflecting);
        }
        (AgentState::Reflecting, Event::Advance) => {
            next.reflection = Some(reflect(task));
            next.status = TaskStatus::Active(AgentState::Learning);
        }
        (AgentState::Learning, Event::Advance) => {
            next.status = TaskStatus::Completed;
        }
        (_, event) => return Err(invalid(task, &format!("{:?}", event))),
    }

    let effect = pending_effect(&next, now);
    Ok(Transition { task: next, effect })
}

/// 汇总执行结果
fn reflect(task: &Task) -> String {
    let mut summary = format!(
        "Completed {} of {} steps for '{}'",
        task.results.len(),
        task.plan.len(),
        task.description
    );
    if let Some(last) = task.results.last() {
        summary.push_str(&format!("; last result: {}", last));
    }
    summary
}

fn insight_for(task: &Task, now: DateTime<Utc>) -> Insight {
    let duration = task
        .activated_at
        .map(|start| (now - start).num_seconds())
        .unwrap_or(0);
    let outcome = task.reflection.clone().unwrap_or_else(|| reflect(task));
    Insight::new(
        task.description.clone(),
        outcome,
        task.plan.len(),
        duration,
        now,
    )
}

fn invalid(task: &Task, to: &str) -> crate::error::AutopilotError {
    StoreError::InvalidTransition {
        task: task.id,
        from: task.status.to_string(),
        to: to.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AutopilotError;
    use crate::tasks::TaskId;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 1, 10, 0, 0).unwrap()
    }

    fn pending(description: &str) -> Task {
        Task::new(TaskId(1), description.to_string(), t0())
    }

    fn planned(steps: &[&str]) -> Task {
        let task = activate(&pending("Research tokio"), t0()).unwrap().task;
        let steps = steps.iter().map(|s| s.to_string()).collect();
        transition(&task, Event::PlanReady(steps), &Policy::default(), t0())
            .unwrap()
            .task
    }

    #[test]
    fn test_activate_enters_planning() {
        let t = activate(&pending("Research tokio"), t0()).unwrap();
        assert_eq!(t.task.status, TaskStatus::Active(AgentState::Planning));
        assert_eq!(t.task.activated_at, Some(t0()));
        assert_eq!(
            t.effect,
            SideEffect::RequestPlan {
                description: "Research tokio".into()
            }
        );
    }

    #[test]
    fn test_activate_requires_pending() {
        let mut task = pending("x");
        task.status = TaskStatus::Completed;
        assert!(matches!(
            activate(&task, t0()),
            Err(AutopilotError::Store(StoreError::InvalidTransition { .. }))
        ));
    }

    #[test]
    fn test_plan_ready_starts_execution() {
        let task = planned(&["a", "b"]);
        assert_eq!(task.status, TaskStatus::Active(AgentState::Executing));
        assert_eq!(task.plan, vec!["a", "b"]);
        assert_eq!(
            pending_effect(&task, t0()),
            SideEffect::ExecuteStep {
                index: 0,
                step: "a".into()
            }
        );
    }

    #[test]
    fn test_plan_failure_is_terminal() {
        let task = activate(&pending("x"), t0()).unwrap().task;
        let t = transition(
            &task,
            Event::PlanFailed("no model".into()),
            &Policy::default(),
            t0(),
        )
        .unwrap();
        let reason = FailureReason::PlanningFailed {
            detail: "no model".into(),
        };
        assert_eq!(t.task.status, TaskStatus::Failed(reason.clone()));
        assert_eq!(t.effect, SideEffect::Release(Outcome::Failed(reason)));
    }

    #[test]
    fn test_empty_plan_fails_planning() {
        let task = activate(&pending("x"), t0()).unwrap().task;
        let t = transition(&task, Event::PlanReady(vec![]), &Policy::default(), t0()).unwrap();
        assert!(matches!(
            t.task.status,
            TaskStatus::Failed(FailureReason::PlanningFailed { .. })
        ));
    }

    #[test]
    fn test_full_happy_path() {
        let policy = Policy::default();
        let mut task = planned(&["a", "b"]);
        for output in ["ra", "rb"] {
            task = transition(&task, Event::StepSucceeded(output.into()), &policy, t0())
                .unwrap()
                .task;
        }
        assert_eq!(task.status, TaskStatus::Active(AgentState::Reflecting));
        assert_eq!(task.current_step_index, 2);
        assert_eq!(pending_effect(&task, t0()), SideEffect::Continue);

        task = transition(&task, Event::Advance, &policy, t0()).unwrap().task;
        assert_eq!(task.status, TaskStatus::Active(AgentState::Learning));
        assert!(task.reflection.as_deref().unwrap().contains("last result: rb"));

        let later = t0() + Duration::seconds(90);
        let SideEffect::RecordInsight(insight) = pending_effect(&task, later) else {
            panic!("learning should record an insight");
        };
        assert_eq!(insight.step_count, 2);
        assert_eq!(insight.duration_secs, 90);
        assert_eq!(insight.description, "Research tokio");

        let done = transition(&task, Event::Advance, &policy, later).unwrap();
        assert_eq!(done.task.status, TaskStatus::Completed);
        assert_eq!(done.effect, SideEffect::Release(Outcome::Completed));
    }

    #[test]
    fn test_step_retries_then_exhausts_at_step_two() {
        let policy = Policy { retry_limit: 2 };
        let mut task = planned(&["s0", "s1", "s2"]);
        for output in ["r0", "r1"] {
            task = transition(&task, Event::StepSucceeded(output.into()), &policy, t0())
                .unwrap()
                .task;
        }

        // 前两次失败仍停留在 Executing，重试同一步
        for attempt in 1..=2 {
            task = transition(&task, Event::StepFailed("timeout".into()), &policy, t0())
                .unwrap()
                .task;
            assert_eq!(task.status, TaskStatus::Active(AgentState::Executing));
            assert_eq!(task.retry_count, attempt);
            assert_eq!(
                pending_effect(&task, t0()),
                SideEffect::ExecuteStep {
                    index: 2,
                    step: "s2".into()
                }
            );
        }

        let t = transition(&task, Event::StepFailed("timeout".into()), &policy, t0()).unwrap();
        assert_eq!(
            t.task.status,
            TaskStatus::Failed(FailureReason::StepExhausted {
                step_index: 2,
                detail: "timeout".into()
            })
        );
        assert_eq!(t.task.current_step_index, 2);
        assert_eq!(t.task.last_error.as_deref(), Some("timeout"));
        assert!(matches!(t.effect, SideEffect::Release(Outcome::Failed(_))));
    }

    #[test]
    fn test_success_resets_retry_count() {
        let policy = Policy::default();
        let mut task = planned(&["a", "b"]);
        task = transition(&task, Event::StepFailed("flaky".into()), &policy, t0())
            .unwrap()
            .task;
        task = transition(&task, Event::StepSucceeded("ok".into()), &policy, t0())
            .unwrap()
            .task;
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.current_step_index, 1);
    }

    #[test]
    fn test_mismatched_event_is_rejected() {
        let task = planned(&["a"]);
        let err = transition(&task, Event::PlanReady(vec!["x".into()]), &Policy::default(), t0())
            .unwrap_err();
        assert!(matches!(
            err,
            AutopilotError::Store(StoreError::InvalidTransition { .. })
        ));
        assert!(transition(&pending("x"), Event::Advance, &Policy::default(), t0()).is_err());
    }

    #[test]
    fn test_resumed_task_with_exhausted_cursor_moves_to_reflecting() {
        let mut task = planned(&["a"]);
        task.current_step_index = 1;
        assert_eq!(pending_effect(&task, t0()), SideEffect::Continue);
        let t = transition(&task, Event::Advance, &Policy::default(), t0()).unwrap();
        assert_eq!(t.task.status, TaskStatus::Active(AgentState::Reflecting));
    }
}
