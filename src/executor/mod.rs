//! 执行协作者
//!
//! 每个计划步骤调用一次 [`Executor::execute`]，成功返回结果文本，
//! 失败返回 [`CollaboratorError::StepFailed`](crate::error::CollaboratorError)。

use crate::error::Result;
use async_trait::async_trait;
use tracing::debug;

#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, step: &str) -> Result<String>;
}

/// 没有接入任何执行后端时的默认实现，只回显步骤
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunExecutor;

#[async_trait]
impl Executor for DryRunExecutor {
    async fn execute(&self, step: &str) -> Result<String> {
        debug!(step = %step, "🧪 dry-run 执行");
        Ok(format!("Executed: {}", step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_echoes_step() {
        let output = DryRunExecutor.execute("Collect sources").await.unwrap();
        assert_eq!(output, "Executed: Collect sources");
    }
}
