use crate::tasks::TaskId;
use std::fmt;

/// task-autopilot 的统一错误类型
#[derive(Debug)]
pub enum AutopilotError {
    /// 任务存储错误（依赖、状态迁移、未找到）
    Store(StoreError),
    /// 外部协作者（planner / executor / memory）错误
    Collaborator(CollaboratorError),
    /// 配置错误
    Config(ConfigError),
    /// 持久化错误
    Persist(PersistError),
    /// 调度循环已停止，命令无法送达
    EngineStopped,
    /// 其他错误
    Other(String),
}

/// 任务存储错误
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// 依赖不存在或会形成循环
    InvalidDependency {
        task: Option<TaskId>,
        dependency: TaskId,
        reason: DependencyProblem,
    },
    /// 任务未找到
    NotFound(TaskId),
    /// 与当前状态不一致的迁移，属于调用方 bug
    InvalidTransition {
        task: TaskId,
        from: String,
        to: String,
    },
    /// 任务字段取值非法
    InvalidSpec { field: String, message: String },
}

/// 依赖被拒绝的具体原因
#[derive(Debug, Clone, PartialEq)]
pub enum DependencyProblem {
    /// 引用的任务不存在
    Missing,
    /// 会闭合一个环，附带环路径
    Cycle(Vec<TaskId>),
}

/// 外部协作者错误
#[derive(Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    /// planner 不可用
    PlannerUnavailable(String),
    /// 单个步骤执行失败
    StepFailed(String),
    /// 长期记忆不可用
    MemoryUnavailable(String),
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),
    /// 配置解析失败
    ParseFailed(String),
    /// 配置值无效
    InvalidValue { field: String, message: String },
}

/// 持久化错误
#[derive(Debug)]
pub enum PersistError {
    /// 读写失败
    IoError(String),
    /// 序列化/反序列化失败
    SerializationError(String),
    /// 快照内容违反不变量
    Corrupt(String),
}

impl fmt::Display for AutopilotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutopilotError::Store(e) => write!(f, "Store Error: {}", e),
            AutopilotError::Collaborator(e) => write!(f, "Collaborator Error: {}", e),
            AutopilotError::Config(e) => write!(f, "Config Error: {}", e),
            AutopilotError::Persist(e) => write!(f, "Persist Error: {}", e),
            AutopilotError::EngineStopped => write!(f, "Engine loop is not running"),
            AutopilotError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::InvalidDependency {
                task,
                dependency,
                reason,
            } => {
                let owner = task.map(|t| t.to_string()).unwrap_or_else(|| "new".into());
                match reason {
                    DependencyProblem::Missing => write!(
                        f,
                        "Invalid dependency {} -> {}: task does not exist",
                        owner, dependency
                    ),
                    DependencyProblem::Cycle(path) => {
                        let path: Vec<String> = path.iter().map(|id| id.to_string()).collect();
                        write!(
                            f,
                            "Invalid dependency {} -> {}: would close cycle [{}]",
                            owner,
                            dependency,
                            path.join(" -> ")
                        )
                    }
                }
            }
            StoreError::NotFound(id) => write!(f, "Task {} not found", id),
            StoreError::InvalidTransition { task, from, to } => {
                write!(f, "Invalid transition for task {}: {} -> {}", task, from, to)
            }
            StoreError::InvalidSpec { field, message } => {
                write!(f, "Invalid task field '{}': {}", field, message)
            }
        }
    }
}

impl fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollaboratorError::PlannerUnavailable(msg) => write!(f, "Planner unavailable: {}", msg),
            CollaboratorError::StepFailed(msg) => write!(f, "Step failed: {}", msg),
            CollaboratorError::MemoryUnavailable(msg) => write!(f, "Memory unavailable: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseFailed(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::InvalidValue { field, message } => {
                write!(f, "Invalid config value for '{}': {}", field, message)
            }
        }
    }
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::IoError(msg) => write!(f, "IO error: {}", msg),
            PersistError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            PersistError::Corrupt(msg) => write!(f, "Corrupt snapshot: {}", msg),
        }
    }
}

impl std::error::Error for AutopilotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AutopilotError::Store(e) => Some(e),
            AutopilotError::Collaborator(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for StoreError {}
impl std::error::Error for CollaboratorError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for PersistError {}

// From 转换实现
impl From<serde_json::Error> for AutopilotError {
    fn from(err: serde_json::Error) -> Self {
        AutopilotError::Persist(PersistError::SerializationError(err.to_string()))
    }
}

impl From<serde_yaml::Error> for AutopilotError {
    fn from(err: serde_yaml::Error) -> Self {
        AutopilotError::Config(ConfigError::ParseFailed(err.to_string()))
    }
}

impl From<StoreError> for AutopilotError {
    fn from(err: StoreError) -> Self {
        AutopilotError::Store(err)
    }
}

impl From<CollaboratorError> for AutopilotError {
    fn from(err: CollaboratorError) -> Self {
        AutopilotError::Collaborator(err)
    }
}

impl From<ConfigError> for AutopilotError {
    fn from(err: ConfigError) -> Self {
        AutopilotError::Config(err)
    }
}

impl From<PersistError> for AutopilotError {
    fn from(err: PersistError) -> Self {
        AutopilotError::Persist(err)
    }
}

// 便捷的 Result 类型别名
pub type Result<T> = std::result::Result<T, AutopilotError>;
