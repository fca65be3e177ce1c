use crate::core::{log_ctx, MediaItem, PlayerError, Result, StageKind};
use crate::pipeline::registry::ComponentRegistry;
use crate::pipeline::settings::{stage_key, SettingsStore};
use crate::pipeline::stage::{ComponentHost, GraphFactory, MediaControl, MediaGraph, StageHandle};
use crate::rules::ComponentChoices;
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;

/// 已组装的管线
///
/// 按创建顺序持有所有阶段句柄；拆除时按相反顺序释放。
pub struct Pipeline {
    location: String,
    stages: Vec<StageHandle>,
    graph: Box<dyn MediaGraph>,
    control: Arc<dyn MediaControl>,
    host: Arc<dyn ComponentHost>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("location", &self.location)
            .field("stages", &self.stages)
            .finish()
    }
}

impl Pipeline {
    fn new(location: &str, graph: Box<dyn MediaGraph>, host: Arc<dyn ComponentHost>) -> Self {
        let control = graph.control();
        Self {
            location: location.to_string(),
            stages: Vec::new(),
            graph,
            control,
            host,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// 按创建顺序
    pub fn stages(&self) -> &[StageHandle] {
        &self.stages
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageHandle> {
        self.stages.iter().find(|h| h.kind == kind)
    }

    pub fn control(&self) -> Arc<dyn MediaControl> {
        self.control.clone()
    }

    /// 拆除管线：按创建的相反顺序移除并释放
    pub fn teardown(mut self) {
        self.release_all();
    }

    fn release_all(&mut self) {
        if self.stages.is_empty() {
            return;
        }
        info!("{} 🧹 拆除管线: {} ({} 个阶段)", log_ctx(), self.location, self.stages.len());
        while let Some(handle) = self.stages.pop() {
            self.graph.remove(&handle);
            debug!("释放 [{}] {}", handle.kind, handle.friendly_name);
            handle.release(self.host.as_ref());
        }
    }

    /// 返回新阶段的下标
    fn push(&mut self, handle: StageHandle) -> usize {
        self.stages.push(handle);
        self.stages.len() - 1
    }

    fn link(&mut self, upstream: usize, downstream: usize) -> Result<()> {
        let down = &self.stages[downstream];
        self.graph
            .link(&self.stages[upstream], down)
            .map_err(|e| PlayerError::ComponentLink {
                stage: down.kind,
                component: down.component.clone(),
                reason: e.to_string(),
            })
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// 管线组装器
///
/// 按固定顺序创建各阶段并连接；任何一步失败都会释放已创建的阶段。
pub struct PipelineAssembler {
    registry: Arc<ComponentRegistry>,
    graph_factory: GraphFactory,
    settings: Option<Arc<dyn SettingsStore>>,
    default_audio_renderer: String,
    video_renderer: Option<String>,
}

impl PipelineAssembler {
    pub fn new(registry: Arc<ComponentRegistry>, graph_factory: GraphFactory) -> Self {
        Self {
            registry,
            graph_factory,
            settings: None,
            default_audio_renderer: String::new(),
            video_renderer: None,
        }
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// 没有规则命中音频渲染阶段时使用
    pub fn with_default_audio_renderer(mut self, name: &str) -> Self {
        self.default_audio_renderer = name.to_string();
        self
    }

    pub fn with_video_renderer(mut self, name: Option<String>) -> Self {
        self.video_renderer = name;
        self
    }

    /// 按选择结果组装管线
    pub fn build(&self, item: &MediaItem, choices: &ComponentChoices) -> Result<Pipeline> {
        info!("{} 🔧 开始组装管线: {}", log_ctx(), item.location);
        let graph = (self.graph_factory)();
        let mut pipeline = Pipeline::new(&item.location, graph, self.registry.host());

        match self.assemble(&mut pipeline, item, choices) {
            Ok(()) => {
                info!(
                    "{} ✅ 管线组装完成: {} ({} 个阶段)",
                    log_ctx(),
                    item.location,
                    pipeline.stages.len()
                );
                Ok(pipeline)
            }
            Err(e) => {
                error!("{} ❌ 管线组装失败: {}", log_ctx(), e);
                pipeline.teardown();
                Err(e)
            }
        }
    }

    fn assemble(&self, pipeline: &mut Pipeline, item: &MediaItem, choices: &ComponentChoices) -> Result<()> {
        // 1. source
        let source_name = self.required(StageKind::Source, choices)?;
        let source = self.add_stage(pipeline, item, StageKind::Source, &source_name, None)?;

        // 2. splitter（多输出端口的 source 兼任 splitter）
        let head = if pipeline.stages[source].stage().output_port_count() > 1 {
            info!("{} 📦 source 兼任 splitter，跳过 splitter 阶段", log_ctx());
            source
        } else {
            let splitter_name = self.required(StageKind::Splitter, choices)?;
            self.add_stage(pipeline, item, StageKind::Splitter, &splitter_name, Some(source))?
        };

        // 3. 字幕
        let mut chain = head;
        if let Some(name) = self.optional(StageKind::Subtitle, choices)? {
            chain = self.add_stage(pipeline, item, StageKind::Subtitle, &name, Some(head))?;
        }

        // 4. 额外阶段：去重后依次串接
        let mut seen: Vec<&str> = Vec::new();
        for name in choices.get(StageKind::Extra) {
            if seen.contains(&name.as_str()) {
                continue;
            }
            seen.push(name);
            if !self.registry.contains(name) {
                warn!("{} ⚠️ [extra] 组件 {} 未注册，跳过", log_ctx(), name);
                continue;
            }
            chain = self.add_stage(pipeline, item, StageKind::Extra, name, Some(chain))?;
        }

        let wants_video = item.details.as_ref().map_or(true, |d| d.has_video());
        let wants_audio = item.details.as_ref().map_or(true, |d| d.has_audio());

        // 5/6. 解码器
        let mut video_decoder = None;
        if wants_video {
            if let Some(name) = self.optional(StageKind::VideoDecoder, choices)? {
                video_decoder = Some(self.add_stage(pipeline, item, StageKind::VideoDecoder, &name, Some(head))?);
            }
        }
        let mut audio_decoder = None;
        if wants_audio {
            if let Some(name) = self.optional(StageKind::AudioDecoder, choices)? {
                audio_decoder = Some(self.add_stage(pipeline, item, StageKind::AudioDecoder, &name, Some(head))?);
            }
        }

        // 7. 音频渲染：规则未命中时使用默认渲染器
        if wants_audio {
            let renderer = match self.optional(StageKind::AudioRenderer, choices)? {
                Some(name) => Some(name),
                None if !self.default_audio_renderer.is_empty() => {
                    debug!("音频渲染未命中规则，使用默认 {}", self.default_audio_renderer);
                    Some(self.default_audio_renderer.clone())
                }
                None => None,
            };
            if let Some(name) = renderer {
                let upstream = audio_decoder.unwrap_or(head);
                self.add_stage(pipeline, item, StageKind::AudioRenderer, &name, Some(upstream))?;
            }
        }

        // 8. 视频渲染：规则未命中时使用配置
        if wants_video {
            let renderer = self
                .optional(StageKind::VideoRenderer, choices)?
                .or_else(|| self.video_renderer.clone());
            if let Some(name) = renderer {
                let upstream = video_decoder.unwrap_or(head);
                self.add_stage(pipeline, item, StageKind::VideoRenderer, &name, Some(upstream))?;
            }
        }

        Ok(())
    }

    /// 必需阶段：取第一个可用的选择，没有则失败
    fn required(&self, stage: StageKind, choices: &ComponentChoices) -> Result<String> {
        match self.optional(stage, choices)? {
            Some(name) => Ok(name),
            None => Err(PlayerError::ComponentCreate {
                stage,
                component: String::new(),
                reason: "没有可用的组件".to_string(),
            }),
        }
    }

    /// 可选阶段：没有规则命中返回 None；有选择但都未注册则失败
    fn optional(&self, stage: StageKind, choices: &ComponentChoices) -> Result<Option<String>> {
        let candidates = choices.get(stage);
        if candidates.is_empty() {
            return Ok(None);
        }
        match candidates.iter().find(|name| self.registry.contains(name)) {
            Some(name) => Ok(Some(name.clone())),
            None => Err(PlayerError::ComponentCreate {
                stage,
                component: candidates.join(","),
                reason: "选择的组件均未注册".to_string(),
            }),
        }
    }

    /// 创建阶段、应用保存的配置并连接到上游
    fn add_stage(
        &self,
        pipeline: &mut Pipeline,
        item: &MediaItem,
        stage: StageKind,
        name: &str,
        upstream: Option<usize>,
    ) -> Result<usize> {
        let mut handle = self.registry.create(stage, name)?;
        if let Some(settings) = &self.settings {
            if let Some(value) = settings.load(item.identity(), &stage_key(name)) {
                debug!("应用阶段配置 [{}] {}", stage, name);
                handle.stage_mut().configure(&value);
            }
        }

        let index = pipeline.push(handle);
        if let Some(upstream) = upstream {
            pipeline.link(upstream, index)?;
        }
        Ok(index)
    }
}
