//! 声明式规则文档（JSON）
//!
//! 文档只描述匹配语义；加载时编译为 [`RuleSet`] / [`Rule`]。
//! 单条规则的正则无法解析时跳过该规则并记录警告，不影响其它规则。

use crate::core::{log_ctx, PlayerError, Result, StageKind};
use crate::rules::rule::{Matcher, Rule, RuleSet};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// 优先级：字符串或数字，统一按字符串保存
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Priority {
    Text(String),
    Number(serde_json::Number),
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Text(String::new())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Text(text) => f.write_str(text),
            Priority::Number(number) => write!(f, "{}", number),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSpec {
    pub name: String,
    pub file_name: String,
    pub container: String,
    pub protocol: String,
    pub codec: String,
    pub resolution: String,
    pub aspect: String,
    pub remote: Option<bool>,
    pub special: Option<bool>,
    pub hardware: Option<bool>,
    pub component: String,
    pub children: Vec<RuleSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSetSpec {
    pub name: String,
    pub priority: Priority,
    pub protocol: String,
    pub extension: String,
    pub codec: String,
    pub stages: BTreeMap<StageKind, Vec<RuleSpec>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleDocument {
    pub rule_sets: Vec<RuleSetSpec>,
}

/// 规则来源
#[derive(Debug, Clone)]
pub enum RuleSource {
    File(PathBuf),
    Inline { name: String, json: String },
}

impl RuleSource {
    pub fn inline(name: &str, json: &str) -> Self {
        RuleSource::Inline {
            name: name.to_string(),
            json: json.to_string(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            RuleSource::File(path) => path.display().to_string(),
            RuleSource::Inline { name, .. } => name.clone(),
        }
    }

    /// 文件来源且文件不存在（用户覆盖层尚未创建）
    pub fn is_missing(&self) -> bool {
        match self {
            RuleSource::File(path) => !path.exists(),
            RuleSource::Inline { .. } => false,
        }
    }

    /// 读取并解析文档；IO 或 JSON 错误属于文档级错误
    pub fn load(&self) -> Result<RuleDocument> {
        let content = match self {
            RuleSource::File(path) => {
                std::fs::read_to_string(path).map_err(|e| PlayerError::RuleDocument {
                    source_name: self.name(),
                    reason: e.to_string(),
                })?
            }
            RuleSource::Inline { json, .. } => json.clone(),
        };
        serde_json::from_str(&content).map_err(|e| PlayerError::RuleDocument {
            source_name: self.name(),
            reason: e.to_string(),
        })
    }
}

/// 编译结果：可用的规则集 + 被跳过项的警告
#[derive(Debug, Default)]
pub struct CompiledDocument {
    pub rule_sets: Vec<RuleSet>,
    pub warnings: Vec<PlayerError>,
}

fn compile_matcher(pattern: &str, owner: &str, field: &str) -> Result<Matcher> {
    Matcher::compile(pattern).map_err(|e| PlayerError::RuleParse {
        rule: owner.to_string(),
        reason: format!("{} 正则无效 `{}`: {}", field, pattern, e),
    })
}

impl RuleSpec {
    fn compile(&self, warnings: &mut Vec<PlayerError>) -> Option<Rule> {
        let compiled = (|| -> Result<Rule> {
            Ok(Rule {
                name: self.name.clone(),
                file_name: compile_matcher(&self.file_name, &self.name, "file_name")?,
                container: compile_matcher(&self.container, &self.name, "container")?,
                protocol: compile_matcher(&self.protocol, &self.name, "protocol")?,
                codec: compile_matcher(&self.codec, &self.name, "codec")?,
                resolution: compile_matcher(&self.resolution, &self.name, "resolution")?,
                aspect: compile_matcher(&self.aspect, &self.name, "aspect")?,
                remote: self.remote,
                special: self.special,
                hardware: self.hardware,
                component: self.component.trim().to_string(),
                children: Vec::new(),
            })
        })();

        match compiled {
            Ok(mut rule) => {
                rule.children = self
                    .children
                    .iter()
                    .filter_map(|child| child.compile(warnings))
                    .collect();
                Some(rule)
            }
            Err(e) => {
                warn!("{} ⚠️  跳过规则: {}", log_ctx(), e);
                warnings.push(e);
                None
            }
        }
    }
}

impl RuleSetSpec {
    fn compile(&self, warnings: &mut Vec<PlayerError>) -> Option<RuleSet> {
        let top_level = (|| -> Result<(Matcher, Matcher, Matcher)> {
            Ok((
                compile_matcher(&self.protocol, &self.name, "protocol")?,
                compile_matcher(&self.extension, &self.name, "extension")?,
                compile_matcher(&self.codec, &self.name, "codec")?,
            ))
        })();

        let (protocol, extension, codec) = match top_level {
            Ok(matchers) => matchers,
            Err(e) => {
                warn!("{} ⚠️  跳过规则集: {}", log_ctx(), e);
                warnings.push(e);
                return None;
            }
        };

        let mut stages = BTreeMap::new();
        for (stage, specs) in &self.stages {
            let rules: Vec<Rule> = specs.iter().filter_map(|spec| spec.compile(warnings)).collect();
            stages.insert(*stage, rules);
        }

        let set = RuleSet {
            name: self.name.clone(),
            priority: self.priority.to_string(),
            protocol,
            extension,
            codec,
            stages,
        };

        if !set.has_top_level_matcher() {
            warn!(
                "{} ⚠️  规则集 [{}] 没有任何顶层匹配项（protocol/extension/codec），永远不会命中",
                log_ctx(),
                set.name
            );
        }

        Some(set)
    }
}

impl RuleDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn compile(&self) -> CompiledDocument {
        let mut warnings = Vec::new();
        let rule_sets: Vec<RuleSet> = self
            .rule_sets
            .iter()
            .filter_map(|spec| spec.compile(&mut warnings))
            .collect();
        debug!("编译规则文档: {} 个规则集, {} 条警告", rule_sets.len(), warnings.len());
        CompiledDocument { rule_sets, warnings }
    }
}
