use super::machine::{Event, SideEffect};
use crate::error::{AutopilotError, CollaboratorError};
use crate::executor::Executor;
use crate::memory::MemoryStore;
use crate::planner::Planner;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_INSIGHT_LIMIT: usize = 3;

/// 把 [`SideEffect`] 落到外部协作者上，并把结果转换为 [`Event`]
///
/// 协作者错误不会向上传播：planner 失败变成 `PlanFailed`，executor 失败变成 `StepFailed`，
/// 记忆检索和写入失败只记录日志。
pub struct AgentDriver {
    planner: Arc<dyn Planner>,
    executor: Arc<dyn Executor>,
    memory: Arc<dyn MemoryStore>,
    insight_limit: usize,
}

impl AgentDriver {
    pub fn new(
        planner: Arc<dyn Planner>,
        executor: Arc<dyn Executor>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        Self {
            planner,
            executor,
            memory,
            insight_limit: DEFAULT_INSIGHT_LIMIT,
        }
    }

    pub fn insight_limit(mut self, limit: usize) -> Self {
        self.insight_limit = limit;
        self
    }

    /// 执行一个副作用
    ///
    /// `cancel` 被触发时立即放弃进行中的调用并返回 `None`，调用结果被丢弃。
    pub async fn perform(&self, effect: &SideEffect, cancel: &CancellationToken) -> Option<Event> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("🛑 协作者调用已中止，结果将被丢弃");
                None
            }
            event = self.run(effect) => event,
        }
    }

    async fn run(&self, effect: &SideEffect) -> Option<Event> {
        match effect {
            SideEffect::RequestPlan { description } => {
                let insights = match self.memory.query(description, self.insight_limit).await {
                    Ok(insights) => insights,
                    Err(e) => {
                        warn!(error = %e, "⚠️ 经验检索失败，按无经验规划");
                        Vec::new()
                    }
                };
                debug!(insights = insights.len(), "📚 规划上下文");
                Some(match self.planner.plan(description, &insights).await {
                    Ok(steps) => Event::PlanReady(steps),
                    Err(e) => Event::PlanFailed(collaborator_detail(e)),
                })
            }
            SideEffect::ExecuteStep { index, step } => {
                debug!(step_index = index, step = %step, "⚙️ 执行步骤");
                Some(match self.executor.execute(step).await {
                    Ok(output) => Event::StepSucceeded(output),
                    Err(e) => Event::StepFailed(collaborator_detail(e)),
                })
            }
            SideEffect::RecordInsight(insight) => {
                if let Err(e) = self.memory.record(insight.clone()).await {
                    warn!(error = %e, "⚠️ 经验写入失败，已忽略");
                }
                Some(Event::Advance)
            }
            SideEffect::Continue => Some(Event::Advance),
            SideEffect::Release(_) => None,
        }
    }
}

/// 协作者错误只保留内层描述
fn collaborator_detail(err: AutopilotError) -> String {
    match err {
        AutopilotError::Collaborator(
            CollaboratorError::PlannerUnavailable(detail)
            | CollaboratorError::StepFailed(detail)
            | CollaboratorError::MemoryUnavailable(detail),
        ) => detail,
        other => other.to_string(),
    }
}
