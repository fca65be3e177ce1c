use parking_lot::RwLock;
use std::collections::HashMap;

/// 记住的播放位置
pub const POSITION_KEY: &str = "position";

/// 某组件的阶段配置键
pub fn stage_key(component: &str) -> String {
    format!("stage.{}", component)
}

/// 按条目存取设置（存储格式由实现决定）
pub trait SettingsStore: Send + Sync {
    fn load(&self, item: &str, key: &str) -> Option<String>;

    fn store(&self, item: &str, key: &str, value: &str);
}

/// 内存实现
#[derive(Default)]
pub struct MemorySettingsStore {
    values: RwLock<HashMap<(String, String), String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self, item: &str, key: &str) -> Option<String> {
        self.values
            .read()
            .get(&(item.to_string(), key.to_string()))
            .cloned()
    }

    fn store(&self, item: &str, key: &str, value: &str) {
        self.values
            .write()
            .insert((item.to_string(), key.to_string()), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_is_keyed_by_item() {
        let store = MemorySettingsStore::new();
        store.store("/a.mkv", POSITION_KEY, "1200");
        store.store("/b.mkv", POSITION_KEY, "3400");
        store.store("/a.mkv", &stage_key("lav"), "threads=4");

        assert_eq!(store.load("/a.mkv", POSITION_KEY).as_deref(), Some("1200"));
        assert_eq!(store.load("/b.mkv", POSITION_KEY).as_deref(), Some("3400"));
        assert_eq!(store.load("/a.mkv", "stage.lav").as_deref(), Some("threads=4"));
        assert_eq!(store.load("/c.mkv", POSITION_KEY), None);
    }
}
