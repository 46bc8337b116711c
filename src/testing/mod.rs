//! 测试基础设施
//!
//! 在不依赖真实 planner / 执行后端 / 记忆存储的情况下测试调度引擎。
//!
//! | 类型 | 用途 |
//! |------|------|
//! | [`MockPlanner`] | 按队列返回预设计划或失败 |
//! | [`MockExecutor`] | 按队列返回步骤结果或失败，可设置延迟以测试取消 |
//! | [`MockMemory`] | 预置经验、记录写入，可模拟不可用 |
//!
//! 所有 Mock 内部状态都在 `Arc<Mutex<_>>` 中，`clone()` 后共享同一份记录，
//! 可以一份交给引擎、一份留在测试里检查调用情况。
//!
//! ```rust
//! use task_autopilot::executor::Executor;
//! use task_autopilot::testing::MockExecutor;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let executor = MockExecutor::new().with_failure("timeout").with_output("ok");
//! assert!(executor.execute("step").await.is_err());
//! assert_eq!(executor.execute("step").await.unwrap(), "ok");
//! assert_eq!(executor.call_count(), 2);
//! # }
//! ```

mod mock_executor;
mod mock_memory;
mod mock_planner;

pub use mock_executor::MockExecutor;
pub use mock_memory::MockMemory;
pub use mock_planner::MockPlanner;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// 断言失败导致的锁中毒不影响后续检查
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 预设响应队列：按顺序弹出，耗尽后重复最后一个
struct Script<T: Clone> {
    queue: std::collections::VecDeque<T>,
    last: Option<T>,
}

impl<T: Clone> Default for Script<T> {
    fn default() -> Self {
        Self {
            queue: std::collections::VecDeque::new(),
            last: None,
        }
    }
}

impl<T: Clone> Script<T> {
    fn push(&mut self, item: T) {
        self.queue.push_back(item);
    }

    fn next(&mut self) -> Option<T> {
        if let Some(item) = self.queue.pop_front() {
            self.last = Some(item.clone());
            return Some(item);
        }
        self.last.clone()
    }
}
