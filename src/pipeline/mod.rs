// 管线组装：组件注册、阶段创建与连接、按条目保存的设置

pub mod stage;
pub mod registry;
pub mod settings;
pub mod assembler;

pub use stage::{ComponentHost, ComponentOrigin, GraphFactory, MediaControl, MediaGraph, PipelineStage, StageHandle};
pub use registry::{ComponentDescriptor, ComponentRegistry};
pub use settings::{stage_key, MemorySettingsStore, SettingsStore, POSITION_KEY};
pub use assembler::{Pipeline, PipelineAssembler};
