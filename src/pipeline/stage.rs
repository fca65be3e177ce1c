//! 管线阶段与外部管线的接口边界
//!
//! 具体的解封装/解码/渲染组件由外部实现，这里只定义创建后的句柄、
//! 连接与播放控制所需的最小接口。

use crate::core::StageKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 已实例化的组件（黑盒）
pub trait PipelineStage: Send {
    /// 输出端口数；source 有多个输出端口时可兼任 splitter
    fn output_port_count(&self) -> usize;

    /// 应用按条目保存的阶段配置（格式由组件自行解释）
    fn configure(&mut self, _settings: &str) {}

    /// 外部组件的显式释放（引擎内部组件直接 drop，不调用）
    fn release(&mut self) {}
}

/// 组件创建方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ComponentOrigin {
    /// 引擎内部实现（进程内单例）
    Internal,
    /// 按路径加载的外部模块
    Module { path: PathBuf },
    /// 系统注册组件（按标识符创建）
    System { id: String },
}

impl ComponentOrigin {
    pub fn is_internal(&self) -> bool {
        matches!(self, ComponentOrigin::Internal)
    }
}

impl fmt::Display for ComponentOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentOrigin::Internal => f.write_str("internal"),
            ComponentOrigin::Module { path } => write!(f, "module:{}", path.display()),
            ComponentOrigin::System { id } => write!(f, "system:{}", id),
        }
    }
}

/// 组件宿主：真正负责实例化/卸载组件的外部协作者
pub trait ComponentHost: Send + Sync {
    fn create_internal(&self, name: &str) -> anyhow::Result<Box<dyn PipelineStage>>;

    fn load_module(&self, path: &Path, name: &str) -> anyhow::Result<Box<dyn PipelineStage>>;

    fn create_system(&self, id: &str) -> anyhow::Result<Box<dyn PipelineStage>>;

    /// 模块内的组件全部释放后调用
    fn unload_module(&self, path: &Path);
}

/// 阶段句柄：组件实例 + 元数据
///
/// 由组装器独占持有，生命周期不超过所属管线。
pub struct StageHandle {
    pub kind: StageKind,
    /// 注册名
    pub component: String,
    pub friendly_name: String,
    pub origin: ComponentOrigin,
    stage: Box<dyn PipelineStage>,
}

impl StageHandle {
    pub fn new(
        kind: StageKind,
        component: &str,
        friendly_name: &str,
        origin: ComponentOrigin,
        stage: Box<dyn PipelineStage>,
    ) -> Self {
        Self {
            kind,
            component: component.to_string(),
            friendly_name: friendly_name.to_string(),
            origin,
            stage,
        }
    }

    pub fn stage(&self) -> &dyn PipelineStage {
        self.stage.as_ref()
    }

    pub fn stage_mut(&mut self) -> &mut dyn PipelineStage {
        self.stage.as_mut()
    }

    /// 是否为引擎内部组件（决定释放方式）
    pub fn is_internal(&self) -> bool {
        self.origin.is_internal()
    }

    /// 类型标识
    pub fn type_id(&self) -> String {
        self.origin.to_string()
    }

    /// 按来源释放：内部组件直接 drop；外部组件先显式释放，模块组件最后卸载模块
    pub(crate) fn release(self, host: &dyn ComponentHost) {
        let StageHandle { origin, mut stage, .. } = self;
        match origin {
            ComponentOrigin::Internal => drop(stage),
            ComponentOrigin::System { .. } => {
                stage.release();
                drop(stage);
            }
            ComponentOrigin::Module { path } => {
                stage.release();
                drop(stage);
                host.unload_module(&path);
            }
        }
    }
}

impl fmt::Debug for StageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageHandle")
            .field("kind", &self.kind)
            .field("component", &self.component)
            .field("friendly_name", &self.friendly_name)
            .field("origin", &self.origin)
            .finish()
    }
}

/// 外部管线（组件图）：负责连接与移除
pub trait MediaGraph: Send {
    /// 把上游的输出端口连到下游的输入端口
    fn link(&mut self, upstream: &StageHandle, downstream: &StageHandle) -> anyhow::Result<()>;

    /// 从图中移除（断开所有连接）
    fn remove(&mut self, stage: &StageHandle);

    /// 播放控制接口
    fn control(&self) -> Arc<dyn MediaControl>;
}

/// 管线播放控制（可跨线程只读查询）
pub trait MediaControl: Send + Sync {
    fn run(&self) -> anyhow::Result<()>;

    fn pause(&self) -> anyhow::Result<()>;

    fn stop(&self) -> anyhow::Result<()>;

    fn seek(&self, position_ms: i64) -> anyhow::Result<()>;

    /// 当前位置（毫秒）
    fn position(&self) -> i64;

    /// 总时长（毫秒）
    fn duration(&self) -> i64;

    /// 原生变速；不支持时返回 Err，由时钟控制器手动步进
    fn set_rate(&self, rate: f64) -> anyhow::Result<()>;
}

/// 创建新的外部管线
pub type GraphFactory = Arc<dyn Fn() -> Box<dyn MediaGraph> + Send + Sync>;
