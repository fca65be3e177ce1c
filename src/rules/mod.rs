// 规则引擎：按优先级匹配规则，为各管线阶段选择组件

pub mod rule;
pub mod document;
pub mod engine;

pub use rule::{Matcher, Rule, RuleSet};
pub use document::{CompiledDocument, Priority, RuleDocument, RuleSetSpec, RuleSource, RuleSpec};
pub use engine::{merge_layers, ComponentChoices, ReloadReport, RuleEngine, RuleSnapshot, RULE_STAGES};
