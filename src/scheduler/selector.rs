//! 选择下一个要激活的任务
//!
//! 全序规则：
//! 1. 有截止时间的任务优先于没有的
//! 2. 有截止时间：截止时间最近 → 优先级高 → 创建早 → ID 小
//! 3. 无截止时间：优先级高 → 创建早 → ID 小

use super::resolver::eligible;
use crate::tasks::{Task, TaskId, TaskStore};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// 一次选择的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// 已有 Active 任务，本轮不选择
    Busy(TaskId),
    Selected(TaskId),
    /// 没有就绪任务，属于正常空闲
    NoEligibleTask,
}

pub fn select(store: &TaskStore, now: DateTime<Utc>) -> Selection {
    if let Some(active) = store.active() {
        return Selection::Busy(active.id);
    }
    eligible(store, now)
        .into_iter()
        .filter_map(|id| store.get(id).ok())
        .min_by(|a, b| scheduling_order(a, b))
        .map_or(Selection::NoEligibleTask, |task| Selection::Selected(task.id))
}

/// `Less` 表示 `a` 应先于 `b` 被选中
pub fn scheduling_order(a: &Task, b: &Task) -> Ordering {
    let by_deadline = match (a.deadline, b.deadline) {
        (Some(da), Some(db)) => da.cmp(&db),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_deadline
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{AgentState, TaskSpec, TaskStatus};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_deadline_beats_higher_priority_without_deadline() {
        let mut store = TaskStore::new();
        let _a = store.add(TaskSpec::new("A").priority(3), t0()).unwrap();
        let b = store
            .add(
                TaskSpec::new("B").priority(5).deadline(t0() + Duration::hours(1)),
                t0(),
            )
            .unwrap();
        assert_eq!(select(&store, t0()), Selection::Selected(b));
    }

    #[test]
    fn test_deadline_task_wins_even_with_lower_priority() {
        let mut store = TaskStore::new();
        let _urgent_looking = store.add(TaskSpec::new("A").priority(5), t0()).unwrap();
        let due = store
            .add(
                TaskSpec::new("B").priority(1).deadline(t0() + Duration::days(30)),
                t0(),
            )
            .unwrap();
        assert_eq!(select(&store, t0()), Selection::Selected(due));
    }

    #[test]
    fn test_nearest_deadline_then_priority_then_fifo() {
        let mut store = TaskStore::new();
        let deadline = t0() + Duration::hours(2);
        let _later = store
            .add(
                TaskSpec::new("later").priority(5).deadline(deadline + Duration::minutes(1)),
                t0(),
            )
            .unwrap();
        let low = store
            .add(TaskSpec::new("low").priority(2).deadline(deadline), t0())
            .unwrap();
        let high_late = store
            .add(
                TaskSpec::new("high late").priority(4).deadline(deadline),
                t0() + Duration::seconds(5),
            )
            .unwrap();
        let high_early = store
            .add(TaskSpec::new("high early").priority(4).deadline(deadline), t0())
            .unwrap();

        // 同截止时间、同优先级时创建早的优先
        assert_eq!(select(&store, t0()), Selection::Selected(high_early));
        let mut ordered: Vec<&Task> = store.iter().collect();
        ordered.sort_by(|a, b| scheduling_order(a, b));
        let ids: Vec<TaskId> = ordered.iter().map(|t| t.id).collect();
        assert_eq!(ids[..3], [high_early, high_late, low]);
    }

    #[test]
    fn test_priority_then_creation_without_deadlines() {
        let mut store = TaskStore::new();
        let first = store.add(TaskSpec::new("first").priority(4), t0()).unwrap();
        let _second = store
            .add(TaskSpec::new("second").priority(4), t0() + Duration::seconds(1))
            .unwrap();
        let _low = store.add(TaskSpec::new("low").priority(2), t0()).unwrap();
        assert_eq!(select(&store, t0()), Selection::Selected(first));
    }

    #[test]
    fn test_busy_when_a_task_is_active() {
        let mut store = TaskStore::new();
        let a = store.add(TaskSpec::new("A"), t0()).unwrap();
        let _b = store.add(TaskSpec::new("B").priority(5), t0()).unwrap();
        store
            .update(a, t0(), |t| t.status = TaskStatus::Active(AgentState::Planning))
            .unwrap();
        assert_eq!(select(&store, t0()), Selection::Busy(a));
    }

    #[test]
    fn test_no_eligible_task_is_idle() {
        let mut store = TaskStore::new();
        assert_eq!(select(&store, t0()), Selection::NoEligibleTask);
        let d = store.add(TaskSpec::new("D"), t0()).unwrap();
        let _c = store.add(TaskSpec::new("C").depends_on(d), t0()).unwrap();
        store.delete(d, t0()).unwrap();
        assert_eq!(select(&store, t0()), Selection::NoEligibleTask);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let mut store = TaskStore::new();
        for i in 0..6 {
            store
                .add(TaskSpec::new(format!("t{i}")).priority((i % 3 + 1) as u8), t0())
                .unwrap();
        }
        let first = select(&store, t0());
        for _ in 0..10 {
            assert_eq!(select(&store, t0()), first);
        }
    }
}
