use crate::core::{log_ctx, ControlConfig, MediaItem, PlayerError, Result, StageKind};
use crate::rules::document::RuleSource;
use crate::rules::rule::RuleSet;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// 由规则选择组件的阶段
pub const RULE_STAGES: [StageKind; 8] = [
    StageKind::Source,
    StageKind::Splitter,
    StageKind::Subtitle,
    StageKind::Extra,
    StageKind::VideoDecoder,
    StageKind::AudioDecoder,
    StageKind::AudioRenderer,
    StageKind::VideoRenderer,
];

/// 一次求值得到的各阶段候选组件（按优先级排列，首个可用者生效，其余为后备）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentChoices {
    stages: BTreeMap<StageKind, Vec<String>>,
}

impl ComponentChoices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stage: StageKind, components: &[&str]) -> Self {
        self.set(stage, components.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn set(&mut self, stage: StageKind, components: Vec<String>) {
        if components.is_empty() {
            self.stages.remove(&stage);
        } else {
            self.stages.insert(stage, components);
        }
    }

    pub fn get(&self, stage: StageKind) -> &[String] {
        self.stages.get(&stage).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn first(&self, stage: StageKind) -> Option<&str> {
        self.get(stage).first().map(|s| s.as_str())
    }

    /// 去掉某阶段的候选（调用方降级重建时使用）
    pub fn without(mut self, stage: StageKind) -> Self {
        self.stages.remove(&stage);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// 规则集合的原子快照
#[derive(Debug, Default)]
pub struct RuleSnapshot {
    pub rule_sets: Vec<RuleSet>,
    pub generation: u64,
}

/// 加载结果
#[derive(Debug)]
pub struct ReloadReport {
    pub rule_sets: usize,
    pub generation: u64,
    /// 被跳过的规则（非致命）
    pub warnings: Vec<PlayerError>,
}

/// 合并多层规则：后面的层优先
///
/// 同名规则集由后层替换；后层的规则集排在前层之前，
/// 因此同优先级时覆盖层先生效。最后按优先级降序稳定排序。
pub fn merge_layers(layers: Vec<Vec<RuleSet>>) -> Vec<RuleSet> {
    let mut merged: Vec<RuleSet> = Vec::new();
    for layer in layers {
        let names: HashSet<String> = layer.iter().map(|set| set.name.clone()).collect();
        let kept: Vec<RuleSet> = merged
            .into_iter()
            .filter(|set| {
                let replaced = names.contains(&set.name);
                if replaced {
                    debug!("规则集 [{}] 被覆盖层替换", set.name);
                }
                !replaced
            })
            .collect();
        merged = layer;
        merged.extend(kept);
    }
    merged.sort_by(|a, b| b.priority.cmp(&a.priority));
    merged
}

/// 规则引擎
///
/// 匹配总是在一个完整快照上进行；重新加载先完整解析新集合，成功后才替换旧集合。
pub struct RuleEngine {
    snapshot: RwLock<Arc<RuleSnapshot>>,
    sources: Mutex<Vec<RuleSource>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(RuleSnapshot::default())),
            sources: Mutex::new(Vec::new()),
        }
    }

    /// 直接使用已编译的规则集（按给定顺序作为加载顺序）
    pub fn with_rule_sets(rule_sets: Vec<RuleSet>) -> Self {
        let engine = Self::new();
        engine.install(merge_layers(vec![rule_sets]));
        engine
    }

    /// 按配置中的规则文件创建并加载（用户覆盖文件可以不存在）
    pub fn from_config(config: &ControlConfig) -> Result<Self> {
        let engine = Self::new();
        let sources = config.rule_paths().into_iter().map(RuleSource::File).collect();
        engine.load(sources)?;
        Ok(engine)
    }

    /// 加载多层规则来源（基础层在前，用户覆盖层在后）
    pub fn load(&self, sources: Vec<RuleSource>) -> Result<ReloadReport> {
        let mut layers = Vec::with_capacity(sources.len());
        let mut warnings = Vec::new();

        for source in &sources {
            if source.is_missing() {
                info!("{} 📜 规则文件不存在，按空层处理: {}", log_ctx(), source.name());
                layers.push(Vec::new());
                continue;
            }
            let document = match source.load() {
                Ok(document) => document,
                Err(e) => {
                    warn!("{} ❌ 规则加载失败，保留当前规则: {}", log_ctx(), e);
                    return Err(e);
                }
            };
            let compiled = document.compile();
            info!(
                "{} 📜 规则来源 {}: {} 个规则集",
                log_ctx(),
                source.name(),
                compiled.rule_sets.len()
            );
            warnings.extend(compiled.warnings);
            layers.push(compiled.rule_sets);
        }

        let merged = merge_layers(layers);
        let count = merged.len();
        let generation = self.install(merged);
        *self.sources.lock() = sources;

        info!(
            "{} ✅ 规则已加载: {} 个规则集, 第 {} 代, {} 条警告",
            log_ctx(),
            count,
            generation,
            warnings.len()
        );
        Ok(ReloadReport {
            rule_sets: count,
            generation,
            warnings,
        })
    }

    /// 按上次的来源整体重新加载
    pub fn reload(&self) -> Result<ReloadReport> {
        let sources = self.sources.lock().clone();
        self.load(sources)
    }

    fn install(&self, rule_sets: Vec<RuleSet>) -> u64 {
        let mut guard = self.snapshot.write();
        let generation = guard.generation + 1;
        *guard = Arc::new(RuleSnapshot {
            rule_sets,
            generation,
        });
        generation
    }

    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        self.snapshot.read().clone()
    }

    /// 返回某阶段的候选组件：按规则集优先级拼接各命中规则集的输出
    pub fn select_components(&self, item: &MediaItem, stage: StageKind, use_hardware: bool) -> Vec<String> {
        let snapshot = self.snapshot();
        let mut out = Vec::new();
        for set in &snapshot.rule_sets {
            set.select(item, stage, use_hardware, &mut out);
        }
        debug!(
            "{} 🔎 [{}] {} 候选: {:?}",
            log_ctx(),
            stage,
            item.file_name(),
            out
        );
        out
    }

    /// 对所有规则阶段求值（同一个快照）
    pub fn choose_components(&self, item: &MediaItem, use_hardware: bool) -> ComponentChoices {
        let snapshot = self.snapshot();
        let mut choices = ComponentChoices::new();
        for stage in RULE_STAGES {
            let mut out = Vec::new();
            for set in &snapshot.rule_sets {
                set.select(item, stage, use_hardware, &mut out);
            }
            choices.set(stage, out);
        }
        info!(
            "{} 🧩 规则选择完成 ({} 代): {:?}",
            log_ctx(),
            snapshot.generation,
            choices
        );
        choices
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}
