//! 播放控制核心
//!
//! 按规则为条目选择管线组件、组装外部管线，并通过命令线程驱动播放生命周期。
//! 具体的解封装/解码/渲染组件由嵌入方通过 [`pipeline::ComponentHost`] 与
//! [`pipeline::MediaGraph`] 提供。

pub mod core;
pub mod rules;
pub mod pipeline;
pub mod player;

pub use crate::core::{
    ControlConfig, MediaItem, PlaybackClock, PlayerError, PlayerState, PlayerStatus, Result, StageKind,
    StreamDetails, StreamProtocol,
};
pub use crate::pipeline::{
    ComponentDescriptor, ComponentHost, ComponentOrigin, ComponentRegistry, MediaControl, MediaGraph,
    MemorySettingsStore, Pipeline, PipelineAssembler, PipelineStage, SettingsStore, StageHandle,
};
pub use crate::player::{
    Command, NoopCallbacks, OpenOutcome, PlaybackCallbacks, PlaybackManager, PlayerContext, PostOutcome,
    SeekDirection, SeekStep,
};
pub use crate::rules::{ComponentChoices, RuleEngine, RuleSource};
