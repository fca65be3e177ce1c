use crate::core::{MediaItem, StageKind};
use log::debug;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;

/// 单个匹配项
///
/// 空模式为通配，总是匹配；非空模式按正则搜索（不要求从头匹配，忽略大小写）。
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    pattern: Option<Regex>,
}

impl Matcher {
    pub fn compile(pattern: &str) -> std::result::Result<Self, regex::Error> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Ok(Self::wildcard());
        }
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            pattern: Some(regex),
        })
    }

    pub fn wildcard() -> Self {
        Self { pattern: None }
    }

    pub fn is_wildcard(&self) -> bool {
        self.pattern.is_none()
    }

    pub fn is_match(&self, value: &str) -> bool {
        match &self.pattern {
            Some(regex) => regex.is_match(value),
            None => true,
        }
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_ref().map(|r| r.as_str()).unwrap_or("")
    }
}

/// 依赖流信息的匹配：条目没有流信息时直接判定不匹配
fn match_stream_detail(
    matcher: &Matcher,
    value: Option<String>,
    item: &MediaItem,
    rule: &str,
    field: &str,
) -> bool {
    if matcher.is_wildcard() {
        return true;
    }
    if item.details.is_none() {
        debug!(
            "规则 [{}] 的 {} 匹配项需要流信息，但 {} 尚未探测，判定不匹配",
            rule,
            field,
            item.file_name()
        );
        return false;
    }
    match value {
        Some(value) => matcher.is_match(&value),
        None => false,
    }
}

/// 条目在某阶段参与匹配的编码名
fn codecs_for_stage(item: &MediaItem, stage: StageKind) -> Vec<String> {
    let Some(details) = item.details.as_ref() else {
        return Vec::new();
    };
    let mut codecs = Vec::new();
    match stage {
        StageKind::VideoDecoder | StageKind::VideoRenderer => {
            codecs.extend(details.video_codec.clone());
        }
        StageKind::AudioDecoder | StageKind::AudioRenderer => {
            codecs.extend(details.audio_codec.clone());
        }
        _ => {
            codecs.extend(details.video_codec.clone());
            codecs.extend(details.audio_codec.clone());
        }
    }
    codecs
}

fn match_codec(matcher: &Matcher, item: &MediaItem, stage: Option<StageKind>, rule: &str) -> bool {
    if matcher.is_wildcard() {
        return true;
    }
    if item.details.is_none() {
        debug!(
            "规则 [{}] 的 codec 匹配项需要流信息，但 {} 尚未探测，判定不匹配",
            rule,
            item.file_name()
        );
        return false;
    }
    let codecs = codecs_for_stage(item, stage.unwrap_or(StageKind::Source));
    codecs.iter().any(|codec| matcher.is_match(codec))
}

/// 组件选择规则
#[derive(Debug, Clone, Default)]
pub struct Rule {
    pub name: String,
    pub file_name: Matcher,
    pub container: Matcher,
    pub protocol: Matcher,
    pub codec: Matcher,
    pub resolution: Matcher,
    pub aspect: Matcher,
    /// 只匹配网络条目 / 本地条目
    pub remote: Option<bool>,
    /// 只匹配特殊容器 / 普通容器
    pub special: Option<bool>,
    /// 只在硬件解码提示等于该值时匹配
    pub hardware: Option<bool>,
    /// 输出的组件名（可为空，仅作为分组）
    pub component: String,
    pub children: Vec<Rule>,
}

impl Rule {
    pub fn new(name: &str, component: &str) -> Self {
        Self {
            name: name.to_string(),
            component: component.to_string(),
            ..Default::default()
        }
    }

    pub fn with_child(mut self, child: Rule) -> Self {
        self.children.push(child);
        self
    }

    /// 所有非空匹配项都匹配时返回 true
    pub fn matches(&self, item: &MediaItem, stage: StageKind, use_hardware: bool) -> bool {
        if let Some(hardware) = self.hardware {
            if hardware != use_hardware {
                return false;
            }
        }
        if let Some(remote) = self.remote {
            if remote != item.is_remote {
                return false;
            }
        }
        if let Some(special) = self.special {
            if special != item.is_special_container {
                return false;
            }
        }

        self.file_name.is_match(item.file_name())
            && self.container.is_match(&item.container)
            && self.protocol.is_match(item.protocol.as_str())
            && match_codec(&self.codec, item, Some(stage), &self.name)
            && match_stream_detail(
                &self.resolution,
                item.details.as_ref().and_then(|d| d.resolution_label()),
                item,
                &self.name,
                "resolution",
            )
            && match_stream_detail(
                &self.aspect,
                item.details.as_ref().and_then(|d| d.aspect_label()),
                item,
                &self.name,
                "aspect",
            )
    }

    /// 深度优先收集输出：先子规则，后自身
    pub fn collect(&self, item: &MediaItem, stage: StageKind, use_hardware: bool, out: &mut Vec<String>) {
        if !self.matches(item, stage, use_hardware) {
            return;
        }
        for child in &self.children {
            child.collect(item, stage, use_hardware, out);
        }
        if !self.component.is_empty() {
            out.push(self.component.clone());
        }
    }
}

/// 全局规则：顶层匹配项命中后才考虑各阶段的规则树
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub name: String,
    /// 优先级按字符串比较（降序）
    pub priority: String,
    pub protocol: Matcher,
    pub extension: Matcher,
    pub codec: Matcher,
    pub stages: BTreeMap<StageKind, Vec<Rule>>,
}

impl RuleSet {
    pub fn new(name: &str, priority: &str) -> Self {
        Self {
            name: name.to_string(),
            priority: priority.to_string(),
            ..Default::default()
        }
    }

    pub fn with_rule(mut self, stage: StageKind, rule: Rule) -> Self {
        self.stages.entry(stage).or_default().push(rule);
        self
    }

    /// 至少有一个非空顶层匹配项
    pub fn has_top_level_matcher(&self) -> bool {
        !(self.protocol.is_wildcard() && self.extension.is_wildcard() && self.codec.is_wildcard())
    }

    /// 顶层匹配；没有任何非空顶层匹配项的规则集永不匹配
    pub fn matches(&self, item: &MediaItem) -> bool {
        if !self.has_top_level_matcher() {
            return false;
        }
        self.protocol.is_match(item.protocol.as_str())
            && self.extension.is_match(&item.container)
            && match_codec(&self.codec, item, None, &self.name)
    }

    /// 对某阶段求值，按规则顺序追加输出
    pub fn select(&self, item: &MediaItem, stage: StageKind, use_hardware: bool, out: &mut Vec<String>) {
        if !self.matches(item) {
            return;
        }
        if let Some(rules) = self.stages.get(&stage) {
            for rule in rules {
                rule.collect(item, stage, use_hardware, out);
            }
        }
    }
}
