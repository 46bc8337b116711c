//! 长期记忆
//!
//! 每个完成的任务在 Learning 阶段写入一条 [`Insight`]，之后规划相似任务时按关键词检索。
//!
//! - [`InMemoryInsightStore`]：进程内存，适合测试
//! - [`FileInsightStore`]：JSON 文件持久化，每次写入后落盘
//!
//! ```rust,no_run
//! use task_autopilot::memory::{FileInsightStore, Insight, MemoryStore};
//!
//! # async fn example() -> task_autopilot::error::Result<()> {
//! let store = FileInsightStore::new("~/.task-autopilot/memory.json")?;
//! store
//!     .record(Insight::new("Research Rust async", "3 steps done", 3, 42, chrono::Utc::now()))
//!     .await?;
//! let hits = store.query("research tokio", 3).await?;
//! # Ok(())
//! # }
//! ```

pub mod insight;
pub mod store;

pub use insight::Insight;
pub use store::{FileInsightStore, InMemoryInsightStore, MemoryStore};
