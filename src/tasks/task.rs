//! 任务定义

use chrono::{DateTime, Days, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 最低优先级（未指定时的默认值）
pub const MIN_PRIORITY: u8 = 1;
/// 最高优先级
pub const MAX_PRIORITY: u8 = 5;

/// 任务 ID，由 [`TaskStore`](crate::tasks::TaskStore) 单调分配，永不复用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Active 任务在 agent 状态机中的子状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentState {
    /// 规划中：等待 planner 返回步骤
    Planning,
    /// 执行中：逐步调用 executor
    Executing,
    /// 反思：汇总执行结果
    Reflecting,
    /// 学习：写入长期记忆
    Learning,
}

/// 任务失败原因
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FailureReason {
    /// 某个依赖已失败或被取消，任务永远无法满足
    BlockedDependency { dependency: TaskId },
    /// planner 不可用或返回了空计划（不重试）
    PlanningFailed { detail: String },
    /// 单个步骤重试次数耗尽
    StepExhausted { step_index: usize, detail: String },
}

/// 任务状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// 待处理
    Pending,
    /// 进行中，携带 agent 子状态
    Active(AgentState),
    /// 已完成
    Completed,
    /// 失败
    Failed(FailureReason),
    /// 已取消（仅能由用户删除触发）
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed(_) | TaskStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Active(_))
    }

    /// 失败或取消：依赖于它的任务永远不会再就绪
    pub fn is_dead_end(&self) -> bool {
        matches!(self, TaskStatus::Failed(_) | TaskStatus::Cancelled)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::BlockedDependency { dependency } => {
                write!(f, "BlockedDependency({})", dependency)
            }
            FailureReason::PlanningFailed { detail } => write!(f, "PlanningFailed: {}", detail),
            FailureReason::StepExhausted { step_index, detail } => {
                write!(f, "StepExhausted at step {}: {}", step_index, detail)
            }
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "Pending"),
            TaskStatus::Active(state) => write!(f, "Active({:?})", state),
            TaskStatus::Completed => write!(f, "Completed"),
            TaskStatus::Failed(reason) => write!(f, "Failed({})", reason),
            TaskStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// 周期单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl RecurrenceUnit {
    /// 解析 `minute` / `hours` / `daily` 等写法
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "minute" | "minutes" | "min" | "m" => Some(RecurrenceUnit::Minute),
            "hour" | "hours" | "hourly" | "h" => Some(RecurrenceUnit::Hour),
            "day" | "days" | "daily" | "d" => Some(RecurrenceUnit::Day),
            "week" | "weeks" | "weekly" | "w" => Some(RecurrenceUnit::Week),
            "month" | "months" | "monthly" => Some(RecurrenceUnit::Month),
            _ => None,
        }
    }
}

/// 周期规则：每 `interval` 个 `unit` 运行一次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub unit: RecurrenceUnit,
    pub interval: u32,
}

impl Recurrence {
    pub fn new(interval: u32, unit: RecurrenceUnit) -> Self {
        Self { unit, interval }
    }

    /// `from` 之后的下一次到期时间，溢出时返回 `None`
    ///
    /// day / week / month 按日历计算；月份加法在目标月较短时落到该月最后一天。
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let n = self.interval;
        match self.unit {
            RecurrenceUnit::Minute => from.checked_add_signed(Duration::minutes(i64::from(n))),
            RecurrenceUnit::Hour => from.checked_add_signed(Duration::hours(i64::from(n))),
            RecurrenceUnit::Day => from.checked_add_days(Days::new(u64::from(n))),
            RecurrenceUnit::Week => from.checked_add_days(Days::new(u64::from(n) * 7)),
            RecurrenceUnit::Month => from.checked_add_months(Months::new(n)),
        }
    }
}

/// 创建任务时的输入
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub description: String,
    /// 1-5，`None` 时取默认值 1
    pub priority: Option<u8>,
    pub deadline: Option<DateTime<Utc>>,
    pub dependencies: Vec<TaskId>,
    pub recurrence: Option<Recurrence>,
}

impl TaskSpec {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            priority: None,
            deadline: None,
            dependencies: Vec::new(),
            recurrence: None,
        }
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn depends_on(mut self, dependency: TaskId) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn every(mut self, interval: u32, unit: RecurrenceUnit) -> Self {
        self.recurrence = Some(Recurrence::new(interval, unit));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// 任务 ID
    pub id: TaskId,
    /// 任务目标（自由文本）
    pub description: String,
    /// 优先级 (1-5, 5 最高)
    pub priority: u8,
    pub deadline: Option<DateTime<Utc>>,
    /// 依赖的任务 ID，全部 Completed 后才可能就绪
    pub dependencies: Vec<TaskId>,
    pub recurrence: Option<Recurrence>,
    /// 任务状态
    pub status: TaskStatus,
    /// 进入 Planning 时由 planner 填充
    #[serde(default)]
    pub plan: Vec<String>,
    /// 执行游标，等于 `plan.len()` 表示计划已执行完
    #[serde(default)]
    pub current_step_index: usize,
    /// 当前步骤已失败的次数
    #[serde(default)]
    pub retry_count: u32,
    /// 每个成功步骤的输出
    #[serde(default)]
    pub results: Vec<String>,
    /// Reflecting 阶段生成的总结
    #[serde(default)]
    pub reflection: Option<String>,
    /// 最近一次步骤失败的详情
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    /// 周期实例最早可运行时间，之前不参与调度
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    /// 已为该完成实例生成的下一周期实例（幂等标记）
    #[serde(default)]
    pub rematerialized_as: Option<TaskId>,
}

impl Task {
    pub(crate) fn new(id: TaskId, description: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            description,
            priority: MIN_PRIORITY,
            deadline: None,
            dependencies: Vec::new(),
            recurrence: None,
            status: TaskStatus::Pending,
            plan: Vec::new(),
            current_step_index: 0,
            retry_count: 0,
            results: Vec::new(),
            reflection: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            activated_at: None,
            completed_at: None,
            last_run_at: None,
            due_at: None,
            rematerialized_as: None,
        }
    }

    /// agent 子状态，非 Active 时为 `None`
    pub fn state(&self) -> Option<AgentState> {
        match self.status {
            TaskStatus::Active(state) => Some(state),
            _ => None,
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    /// 周期实例是否已到期
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at.is_none_or(|due| due <= now)
    }

    /// 当前游标指向的步骤
    pub fn current_step(&self) -> Option<&str> {
        self.plan.get(self.current_step_index).map(String::as_str)
    }

    /// 清空运行期字段，回到可重新规划的 Pending
    pub(crate) fn reset_to_pending(&mut self) {
        self.status = TaskStatus::Pending;
        self.plan.clear();
        self.current_step_index = 0;
        self.retry_count = 0;
        self.results.clear();
        self.reflection = None;
        self.last_error = None;
        self.activated_at = None;
    }
}
