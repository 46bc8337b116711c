pub mod agent;
pub mod clock;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod memory;
pub mod planner;
pub mod scheduler;
pub mod tasks;
pub mod testing;

pub mod prelude {
    pub use crate::agent::AgentDriver;
    pub use crate::config::EngineConfig;
    pub use crate::engine::{AgentStatus, Engine, EngineHandle};
    pub use crate::error::{AutopilotError, Result};
    pub use crate::executor::{DryRunExecutor, Executor};
    pub use crate::memory::{FileInsightStore, Insight, MemoryStore};
    pub use crate::planner::{HeuristicPlanner, Planner};
    pub use crate::tasks::{Task, TaskId, TaskSpec, TaskStatus};
}
