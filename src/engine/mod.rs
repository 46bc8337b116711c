//! 调度循环
//!
//! [`Engine`] 独占 [`TaskStore`]，是唯一的写入方。用户命令经 [`EngineHandle`] 以消息形式送入
//! 循环，在两次 tick 之间串行执行，因此命令不会与一次状态迁移交错。
//!
//! 每次 tick：
//! 1. resolver：传播依赖失败，计算就绪集合
//! 2. selector：有 Active 任务时推进它一步，否则激活一个就绪任务（二者只做其一）
//! 3. recurrence：为已完成的周期任务生成下一实例
//! 4. 持久化快照
//!
//! 删除或手动完成 Active 任务时，[`EngineHandle`] 在排队之前先取消进行中的协作者调用，
//! 循环立即放弃该调用并丢弃其结果。

mod handle;
mod status;

pub use handle::EngineHandle;
pub use status::{ActiveSummary, AgentStatus};

use crate::agent::{self, AgentDriver, Policy, SideEffect};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{Result, StoreError};
use crate::scheduler::{self, Selection};
use crate::tasks::{
    Deleted, RecoveryPolicy, Task, TaskId, TaskPersistence, TaskSpec, TaskStatus, TaskStore,
};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const COMMAND_BUFFER: usize = 64;

/// 进行中的协作者调用
pub(crate) struct InFlight {
    pub(crate) task_id: TaskId,
    pub(crate) token: CancellationToken,
}

pub(crate) type InFlightSlot = Arc<Mutex<Option<InFlight>>>;

pub(crate) fn lock_slot(slot: &InFlightSlot) -> MutexGuard<'_, Option<InFlight>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 一次 tick 做了什么
#[derive(Debug, Clone, PartialEq)]
pub enum TickAction {
    /// 没有 Active 任务，也没有就绪任务
    Idle,
    Activated(TaskId),
    Advanced {
        task: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
    /// 进行中的调用被取消，结果已丢弃
    Abandoned(TaskId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub action: TickAction,
    /// 本轮因依赖失败而被标记 Failed 的任务及其阻塞依赖
    pub blocked: Vec<(TaskId, TaskId)>,
    /// 本轮生成的周期实例 `(完成实例, 新实例)`
    pub rematerialized: Vec<(TaskId, TaskId)>,
}

/// 循环接收的命令
pub(crate) enum Command {
    Add {
        spec: TaskSpec,
        reply: oneshot::Sender<Result<TaskId>>,
    },
    List {
        reply: oneshot::Sender<Vec<Task>>,
    },
    Get {
        id: TaskId,
        reply: oneshot::Sender<Result<Task>>,
    },
    Activate {
        id: TaskId,
        reply: oneshot::Sender<Result<()>>,
    },
    Complete {
        id: TaskId,
        reply: oneshot::Sender<Result<()>>,
    },
    Delete {
        id: TaskId,
        reply: oneshot::Sender<Result<Deleted>>,
    },
    SetAutonomous {
        enabled: bool,
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<AgentStatus>,
    },
    Tick {
        reply: oneshot::Sender<Result<TickReport>>,
    },
    Shutdown,
}

/// 调度引擎
pub struct Engine {
    store: TaskStore,
    driver: AgentDriver,
    clock: Arc<dyn Clock>,
    persistence: Option<Arc<dyn TaskPersistence>>,
    policy: Policy,
    autonomous: bool,
    tick_interval: Duration,
    running: bool,
    in_flight: InFlightSlot,
    shutdown: CancellationToken,
}

impl Engine {
    pub fn new(driver: AgentDriver) -> Self {
        let defaults = EngineConfig::default();
        Self {
            store: TaskStore::new(),
            driver,
            clock: Arc::new(SystemClock),
            persistence: None,
            policy: Policy {
                retry_limit: defaults.step_retry_limit,
            },
            autonomous: defaults.autonomous,
            tick_interval: defaults.tick_interval(),
            running: false,
            in_flight: Arc::new(Mutex::new(None)),
            shutdown: CancellationToken::new(),
        }
    }

    /// 应用配置中的重试上限、自主模式和 tick 间隔
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.policy.retry_limit = config.step_retry_limit;
        self.autonomous = config.autonomous;
        self.tick_interval = config.tick_interval();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn TaskPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn with_store(mut self, store: TaskStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_autonomous(mut self, enabled: bool) -> Self {
        self.autonomous = enabled;
        self
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// 从持久化后端恢复任务，没有快照时保持空 store
    pub async fn restore(mut self, policy: RecoveryPolicy) -> Result<Self> {
        let Some(persistence) = self.persistence.clone() else {
            return Ok(self);
        };
        if let Some(snapshot) = persistence.load().await? {
            self.store = TaskStore::restore(snapshot, policy, self.clock.now())?;
            info!(tasks = self.store.len(), policy = ?policy, "♻️ 已从快照恢复任务");
        }
        Ok(self)
    }

    /// 执行一次 tick
    pub async fn tick(&mut self) -> Result<TickReport> {
        let now = self.clock.now();
        let resolution = scheduler::resolve(&mut self.store, now)?;

        let action = match scheduler::select(&self.store, now) {
            Selection::Busy(id) => self.advance(id).await?,
            Selection::Selected(id) => {
                self.activate(id, now)?;
                TickAction::Activated(id)
            }
            Selection::NoEligibleTask => {
                debug!("😴 没有就绪任务");
                TickAction::Idle
            }
        };

        let rematerialized = scheduler::sweep(&mut self.store, self.clock.now());
        self.persist().await;

        Ok(TickReport {
            at: now,
            action,
            blocked: resolution.newly_blocked,
            rematerialized,
        })
    }

    /// 启动后台循环
    pub fn spawn(mut self) -> (EngineHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = EngineHandle::new(tx, self.in_flight.clone(), self.shutdown.clone());
        self.running = true;
        let join = tokio::spawn(self.run(rx));
        (handle, join)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即返回，跳过
        interval.tick().await;
        info!(
            autonomous = self.autonomous,
            interval_secs = self.tick_interval.as_secs_f64(),
            tasks = self.store.len(),
            "🚀 调度循环已启动"
        );

        let shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                command = rx.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle(command).await,
                },
                _ = interval.tick() => {
                    if self.autonomous
                        && let Err(e) = self.tick().await
                    {
                        error!(error = %e, "❌ tick 失败");
                    }
                }
            }
        }

        self.running = false;
        self.persist().await;
        info!("🛑 调度循环已停止");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Add { spec, reply } => {
                let result = self.store.add(spec, self.clock.now());
                if let Ok(id) = &result {
                    info!(task_id = %id, "➕ 新任务");
                    self.persist().await;
                }
                let _ = reply.send(result);
            }
            Command::List { reply } => {
                let _ = reply.send(self.store.list().into_iter().cloned().collect());
            }
            Command::Get { id, reply } => {
                let _ = reply.send(self.store.get(id).cloned());
            }
            Command::Activate { id, reply } => {
                let now = self.clock.now();
                let result = self.activate_on_request(id, now);
                if result.is_ok() {
                    self.persist().await;
                }
                let _ = reply.send(result);
            }
            Command::Complete { id, reply } => {
                let result = self.complete(id);
                if result.is_ok() {
                    self.persist().await;
                }
                let _ = reply.send(result);
            }
            Command::Delete { id, reply } => {
                let result = self.store.delete(id, self.clock.now());
                if let Ok(deleted) = &result {
                    if deleted.was_active {
                        info!(task_id = %id, "🛑 Active 任务已中止，槽位已释放");
                    }
                    self.persist().await;
                }
                let _ = reply.send(result);
            }
            Command::SetAutonomous { enabled, reply } => {
                self.autonomous = enabled;
                info!(autonomous = enabled, "🤖 自主模式已切换");
                let _ = reply.send(());
            }
            Command::Status { reply } => {
                let status = AgentStatus::collect(
                    &self.store,
                    self.autonomous,
                    self.running,
                    self.clock.now(),
                );
                let _ = reply.send(status);
            }
            Command::Tick { reply } => {
                let result = self.tick().await;
                if let Err(e) = &result {
                    error!(error = %e, "❌ tick 失败");
                }
                let _ = reply.send(result);
            }
            Command::Shutdown => {}
        }
    }

    fn activate(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<()> {
        let transition = agent::activate(self.store.get(id)?, now)?;
        self.store.update(id, now, |task| *task = transition.task)?;
        info!(task_id = %id, "🎯 任务已激活，进入 Planning");
        Ok(())
    }

    /// 用户手动激活：要求没有 Active 任务且目标任务已就绪
    fn activate_on_request(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<()> {
        let task = self.store.get(id)?;
        if let Some(active) = self.store.active() {
            return Err(StoreError::InvalidTransition {
                task: id,
                from: task.status.to_string(),
                to: format!("Active(Planning) (task {} is already active)", active.id),
            }
            .into());
        }
        if !scheduler::eligible(&self.store, now).contains(&id) {
            return Err(StoreError::InvalidTransition {
                task: id,
                from: task.status.to_string(),
                to: "Active(Planning) (task is not eligible)".to_string(),
            }
            .into());
        }
        self.activate(id, now)
    }

    /// 手动完成：Pending / Active → Completed，跳过 Reflecting / Learning
    fn complete(&mut self, id: TaskId) -> Result<()> {
        let now = self.clock.now();
        let status = &self.store.get(id)?.status;
        if status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                task: id,
                from: status.to_string(),
                to: TaskStatus::Completed.to_string(),
            }
            .into());
        }
        self.store
            .update(id, now, |task| task.status = TaskStatus::Completed)?;
        info!(task_id = %id, "✅ 任务已手动完成");
        // 完成已生效，周期规则出错只影响下一实例
        if let Err(e) = scheduler::rematerialize(&mut self.store, id, now) {
            warn!(task_id = %id, error = %e, "⚠️ 周期任务无法生成下一实例");
        }
        Ok(())
    }

    /// 推进 Active 任务一步
    async fn advance(&mut self, id: TaskId) -> Result<TickAction> {
        let task = self.store.get(id)?.clone();
        let effect = agent::pending_effect(&task, self.clock.now());

        let token = self.shutdown.child_token();
        *lock_slot(&self.in_flight) = Some(InFlight {
            task_id: id,
            token: token.clone(),
        });
        let event = self.driver.perform(&effect, &token).await;
        lock_slot(&self.in_flight).take();

        let Some(event) = event.filter(|_| !token.is_cancelled()) else {
            warn!(task_id = %id, "🛑 调用结果已丢弃");
            return Ok(TickAction::Abandoned(id));
        };

        let now = self.clock.now();
        let transition = agent::transition(&task, event, &self.policy, now)?;
        let to = transition.task.status.clone();
        self.store.update(id, now, |t| *t = transition.task)?;

        match &transition.effect {
            SideEffect::Release(outcome) => {
                info!(task_id = %id, outcome = ?outcome, "🏁 任务结束，释放 Active 槽位");
            }
            _ => debug!(task_id = %id, from = %task.status, to = %to, "➡️ 状态推进"),
        }

        Ok(TickAction::Advanced {
            task: id,
            from: task.status,
            to,
        })
    }

    async fn persist(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if let Err(e) = persistence.save(&self.store.snapshot()).await {
            error!(error = %e, "❌ 任务快照保存失败");
        }
    }
}
