//! 单个 Active 任务的 规划 → 执行 → 反思 → 学习 循环
//!
//! - [`machine`]：纯状态迁移函数，可脱离协作者单独测试
//! - [`driver`]：执行状态机要求的副作用（调用 planner / executor / memory），支持取消

pub mod driver;
pub mod machine;

pub use driver::AgentDriver;
pub use machine::{Event, Outcome, Policy, SideEffect, Transition, activate, pending_effect, transition};
