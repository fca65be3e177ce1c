use crate::core::types::{PlayerState, StageKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("规则解析错误 [{rule}]: {reason}")]
    RuleParse { rule: String, reason: String },

    #[error("规则文档错误 [{source_name}]: {reason}")]
    RuleDocument { source_name: String, reason: String },

    #[error("创建组件失败 [{stage}] {component}: {reason}")]
    ComponentCreate {
        stage: StageKind,
        component: String,
        reason: String,
    },

    #[error("连接组件失败 [{stage}] {component}: {reason}")]
    ComponentLink {
        stage: StageKind,
        component: String,
        reason: String,
    },

    #[error("非法状态转换: {from} -> {to}")]
    StateTransition { from: PlayerState, to: PlayerState },

    #[error("时钟漂移无法修正: {0}")]
    ClockDrift(String),

    #[error("工作线程异常退出: {0}")]
    WorkerPanicked(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON 错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("其他错误: {0}")]
    Other(String),

    #[error("Anyhow 错误: {0}")]
    AnyhowError(#[from] anyhow::Error),
}

impl PlayerError {
    /// 出错的管线阶段（仅组件创建/连接错误）
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            PlayerError::ComponentCreate { stage, .. } | PlayerError::ComponentLink { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
