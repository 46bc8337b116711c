use super::{Script, lock};
use crate::error::{CollaboratorError, Result};
use crate::executor::Executor;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 可脚本化的执行器
///
/// 没有任何预设时返回 `"Executed: <step>"`。
#[derive(Clone, Default)]
pub struct MockExecutor {
    responses: Arc<Mutex<Script<std::result::Result<String, String>>>>,
    /// 每次调用收到的步骤描述
    calls: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(self, output: impl Into<String>) -> Self {
        lock(&self.responses).push(Ok(output.into()));
        self
    }

    /// 追加一次 `StepFailed`
    pub fn with_failure(self, msg: impl Into<String>) -> Self {
        lock(&self.responses).push(Err(msg.into()));
        self
    }

    /// 每次执行前先等待，用于测试进行中的调用被取消
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn execute(&self, step: &str) -> Result<String> {
        lock(&self.calls).push(step.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let response = lock(&self.responses).next();
        match response {
            Some(Ok(output)) => Ok(output),
            Some(Err(msg)) => Err(CollaboratorError::StepFailed(msg).into()),
            None => Ok(format!("Executed: {}", step)),
        }
    }
}
