//! 调度：就绪计算、选择下一个任务、周期任务再物化
//!
//! 三个子模块都只操作 [`TaskStore`](crate::tasks::TaskStore)，不调用任何外部协作者，
//! 由 [`engine`](crate::engine) 在每轮 tick 中按 resolver → selector → recurrence 的顺序调用。

pub mod recurrence;
pub mod resolver;
pub mod selector;

pub use recurrence::{next_due, rematerialize, sweep};
pub use resolver::{Resolution, eligible, resolve};
pub use selector::{Selection, select};
