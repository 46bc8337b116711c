//! 引擎配置加载
//!
//! 先读 YAML 文件（可选），再用环境变量覆盖，`.env` 会被自动加载：
//! ```text
//! AUTOPILOT_TICK_SECS=60
//! AUTOPILOT_RETRY_LIMIT=3
//! AUTOPILOT_AUTONOMOUS=true
//! AUTOPILOT_TASKS_PATH=~/.task-autopilot/tasks.json
//! AUTOPILOT_MEMORY_PATH=~/.task-autopilot/memory.json
//! AUTOPILOT_RECOVERY=reset_active
//! ```

use crate::error::{ConfigError, Result};
use crate::tasks::RecoveryPolicy;
use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "AUTOPILOT_";

/// 引擎运行时配置
///
/// 所有字段都有默认值，YAML 中只需写要改的项。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 调度循环唤醒间隔（秒）
    pub tick_interval_secs: u64,
    /// 单个步骤失败后允许的重试次数（总尝试次数 = 重试次数 + 1）
    pub step_retry_limit: u32,
    /// 规划时从长期记忆取回的相关经验条数
    pub insight_query_limit: usize,
    /// 启动时是否开启自主模式
    pub autonomous: bool,
    pub tasks_path: String,
    pub memory_path: String,
    /// 重启时对 Active 任务的处理策略
    pub recovery: RecoveryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            step_retry_limit: 3,
            insight_query_limit: 3,
            autonomous: false,
            tasks_path: "~/.task-autopilot/tasks.json".to_string(),
            memory_path: "~/.task-autopilot/memory.json".to_string(),
            recovery: RecoveryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// 从 YAML 文件读取
    pub fn load(path: &str) -> Result<Self> {
        let file = std::fs::File::open(expand_tilde(Path::new(path)))
            .map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        let config: EngineConfig = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    /// YAML（可选）+ 环境变量覆盖
    pub fn from_sources(path: Option<&str>) -> Result<Self> {
        dotenv().ok();
        let base = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        let config = base.apply_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// 用 `AUTOPILOT_*` 形式的键值对覆盖当前配置
    pub fn apply_overrides<I>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(suffix) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match suffix {
                "TICK_SECS" => self.tick_interval_secs = parse_value(&key, &value)?,
                "RETRY_LIMIT" => self.step_retry_limit = parse_value(&key, &value)?,
                "INSIGHT_LIMIT" => self.insight_query_limit = parse_value(&key, &value)?,
                "AUTONOMOUS" => self.autonomous = parse_bool(&key, &value)?,
                "TASKS_PATH" => self.tasks_path = value,
                "MEMORY_PATH" => self.memory_path = value,
                "RECOVERY" => {
                    self.recovery =
                        RecoveryPolicy::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                            field: key.clone(),
                            message: format!("unknown recovery policy '{}'", value),
                        })?
                }
                _ => {}
            }
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tick_interval_secs".to_string(),
                message: "must be at least 1 second".to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn tick_interval_secs(mut self, secs: u64) -> Self {
        self.tick_interval_secs = secs;
        self
    }

    pub fn step_retry_limit(mut self, limit: u32) -> Self {
        self.step_retry_limit = limit;
        self
    }

    pub fn insight_query_limit(mut self, limit: usize) -> Self {
        self.insight_query_limit = limit;
        self
    }

    pub fn autonomous(mut self, enabled: bool) -> Self {
        self.autonomous = enabled;
        self
    }

    pub fn tasks_path(mut self, path: &str) -> Self {
        self.tasks_path = path.to_string();
        self
    }

    pub fn memory_path(mut self, path: &str) -> Self {
        self.memory_path = path.to_string();
        self
    }

    pub fn recovery(mut self, policy: RecoveryPolicy) -> Self {
        self.recovery = policy;
        self
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ConfigError::InvalidValue {
            field: key.to_string(),
            message: format!("cannot parse '{}'", value),
        }
        .into()
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: key.to_string(),
            message: format!("expected a boolean, got '{}'", value),
        }
        .into()),
    }
}

pub(crate) fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s.starts_with("~/")
        && let Some(home) = std::env::var("HOME")
            .ok()
            .or_else(|| std::env::var("USERPROFILE").ok())
    {
        return PathBuf::from(home).join(&s[2..]);
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AutopilotError;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_yaml_fills_missing_fields_with_defaults() {
        let config: EngineConfig =
            serde_yaml::from_str("tick_interval_secs: 5\nrecovery: resume\n").unwrap();
        assert_eq!(config.tick_interval_secs, 5);
        assert_eq!(config.recovery, RecoveryPolicy::Resume);
        assert_eq!(config.step_retry_limit, 3);
        assert!(!config.autonomous);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autopilot.yaml");
        std::fs::write(&path, "step_retry_limit: 1\nautonomous: true\n").unwrap();
        let config = EngineConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.step_retry_limit, 1);
        assert!(config.autonomous);
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, AutopilotError::Config(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::default()
            .apply_overrides(vars(&[
                ("AUTOPILOT_TICK_SECS", "10"),
                ("AUTOPILOT_AUTONOMOUS", "on"),
                ("AUTOPILOT_RECOVERY", "resume"),
                ("AUTOPILOT_TASKS_PATH", "/tmp/t.json"),
                ("PATH", "/usr/bin"),
            ]))
            .unwrap();
        assert_eq!(config.tick_interval_secs, 10);
        assert!(config.autonomous);
        assert_eq!(config.recovery, RecoveryPolicy::Resume);
        assert_eq!(config.tasks_path, "/tmp/t.json");
    }

    #[test]
    fn test_invalid_env_value() {
        let err = EngineConfig::default()
            .apply_overrides(vars(&[("AUTOPILOT_RETRY_LIMIT", "many")]))
            .unwrap_err();
        assert!(matches!(
            err,
            AutopilotError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_tick_interval_rejected() {
        assert!(EngineConfig::default().tick_interval_secs(0).validate().is_err());
    }
}
