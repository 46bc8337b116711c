use super::{AgentStatus, Command, InFlightSlot, TickReport, lock_slot};
use crate::error::{AutopilotError, Result};
use crate::tasks::{Deleted, Task, TaskId, TaskSpec};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 调度循环的命令入口，可克隆并跨任务共享
///
/// 每个方法都是一条发往循环的消息，通过 oneshot 等待回复；循环停止后返回
/// [`AutopilotError::EngineStopped`]。
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
    in_flight: InFlightSlot,
    shutdown: CancellationToken,
}

impl EngineHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<Command>,
        in_flight: InFlightSlot,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            tx,
            in_flight,
            shutdown,
        }
    }

    pub async fn add_task(&self, spec: TaskSpec) -> Result<TaskId> {
        self.request(|reply| Command::Add { spec, reply }).await?
    }

    /// 全部任务，按创建顺序
    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.request(|reply| Command::List { reply }).await
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task> {
        self.request(|reply| Command::Get { id, reply }).await?
    }

    /// 手动激活：仅在没有 Active 任务且该任务已就绪时允许
    pub async fn activate_task(&self, id: TaskId) -> Result<()> {
        self.request(|reply| Command::Activate { id, reply }).await?
    }

    /// 手动完成，Active 任务进行中的调用会被中止
    pub async fn complete_task(&self, id: TaskId) -> Result<()> {
        self.abort_in_flight(id);
        self.request(|reply| Command::Complete { id, reply }).await?
    }

    /// 删除（标记为 Cancelled），Active 任务进行中的调用会被中止
    pub async fn delete_task(&self, id: TaskId) -> Result<Deleted> {
        self.abort_in_flight(id);
        self.request(|reply| Command::Delete { id, reply }).await?
    }

    pub async fn set_autonomous(&self, enabled: bool) -> Result<()> {
        self.request(|reply| Command::SetAutonomous { enabled, reply })
            .await
    }

    pub async fn status(&self) -> Result<AgentStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// 立即执行一次 tick，不受自主模式影响
    pub async fn tick_now(&self) -> Result<TickReport> {
        self.request(|reply| Command::Tick { reply }).await?
    }

    /// 停止循环，进行中的调用会被中止
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let _ = self.tx.send(Command::Shutdown).await;
    }

    /// 命令排队之前先取消目标任务进行中的调用
    fn abort_in_flight(&self, id: TaskId) {
        if let Some(in_flight) = lock_slot(&self.in_flight).as_ref()
            && in_flight.task_id == id
        {
            in_flight.token.cancel();
            info!(task_id = %id, "🛑 已请求中止进行中的调用");
        }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| AutopilotError::EngineStopped)?;
        rx.await.map_err(|_| AutopilotError::EngineStopped)
    }
}
