//! 任务数据模型与任务存储
//!
//! | 模块 | 作用 |
//! |------|------|
//! | `task` | [`Task`]、[`TaskStatus`]、[`AgentState`]、周期规则 |
//! | `store` | [`TaskStore`]：增删改查、依赖校验、状态迁移校验 |
//! | `dag` | 依赖图上的环检测与依赖链 |
//! | `snapshot` | 快照持久化与重启恢复策略 |

mod category;
mod dag;
pub mod snapshot;
mod store;
mod task;

pub use category::TaskCategory;
pub use snapshot::{
    FilePersistence, InMemoryPersistence, RecoveryPolicy, StoreSnapshot, TaskPersistence,
};
pub use store::{Deleted, TaskStore};
pub use task::{
    AgentState, FailureReason, MAX_PRIORITY, MIN_PRIORITY, Recurrence, RecurrenceUnit, Task,
    TaskId, TaskSpec, TaskStatus,
};
