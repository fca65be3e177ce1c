use crate::core::{log_ctx, PlayerError, Result, StageKind};
use crate::pipeline::stage::{ComponentHost, ComponentOrigin, StageHandle};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// 组件描述：注册名 -> 创建方式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub name: String,
    #[serde(default)]
    pub friendly_name: String,
    pub origin: ComponentOrigin,
}

impl ComponentDescriptor {
    pub fn internal(name: &str) -> Self {
        Self {
            name: name.to_string(),
            friendly_name: name.to_string(),
            origin: ComponentOrigin::Internal,
        }
    }

    pub fn module(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            friendly_name: name.to_string(),
            origin: ComponentOrigin::Module { path: path.into() },
        }
    }

    pub fn system(name: &str, id: &str) -> Self {
        Self {
            name: name.to_string(),
            friendly_name: name.to_string(),
            origin: ComponentOrigin::System { id: id.to_string() },
        }
    }
}

/// 组件注册表
///
/// 只负责按名字找到创建方式并委托给 [`ComponentHost`]。
pub struct ComponentRegistry {
    entries: HashMap<String, ComponentDescriptor>,
    host: Arc<dyn ComponentHost>,
}

impl ComponentRegistry {
    pub fn new(host: Arc<dyn ComponentHost>) -> Self {
        Self {
            entries: HashMap::new(),
            host,
        }
    }

    /// 从 JSON 数组加载组件描述
    pub fn from_json(host: Arc<dyn ComponentHost>, json: &str) -> Result<Self> {
        let descriptors: Vec<ComponentDescriptor> = serde_json::from_str(json)?;
        let mut registry = Self::new(host);
        for descriptor in descriptors {
            registry.register(descriptor);
        }
        Ok(registry)
    }

    pub fn with(mut self, descriptor: ComponentDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    pub fn register(&mut self, mut descriptor: ComponentDescriptor) {
        if descriptor.friendly_name.is_empty() {
            descriptor.friendly_name = descriptor.name.clone();
        }
        debug!("注册组件 {} ({})", descriptor.name, descriptor.origin);
        self.entries.insert(descriptor.name.clone(), descriptor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.entries.get(name)
    }

    pub fn host(&self) -> Arc<dyn ComponentHost> {
        self.host.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 创建组件，返回带释放方式的句柄
    pub fn create(&self, stage: StageKind, name: &str) -> Result<StageHandle> {
        let descriptor = self.entries.get(name).ok_or_else(|| PlayerError::ComponentCreate {
            stage,
            component: name.to_string(),
            reason: "组件未注册".to_string(),
        })?;

        let created = match &descriptor.origin {
            ComponentOrigin::Internal => self.host.create_internal(&descriptor.name),
            ComponentOrigin::Module { path } => self.host.load_module(path, &descriptor.name),
            ComponentOrigin::System { id } => self.host.create_system(id),
        };

        let instance = created.map_err(|e| PlayerError::ComponentCreate {
            stage,
            component: name.to_string(),
            reason: e.to_string(),
        })?;

        info!(
            "{} 🔨 [{}] 创建组件 {} ({})",
            log_ctx(),
            stage,
            descriptor.friendly_name,
            descriptor.origin
        );
        Ok(StageHandle::new(
            stage,
            &descriptor.name,
            &descriptor.friendly_name,
            descriptor.origin.clone(),
            instance,
        ))
    }
}
