use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 播放控制配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// 速率/时钟控制线程的节拍（毫秒）
    pub tick_interval_ms: u64,
    /// 手动步进时允许的最大漂移（毫秒）
    pub drift_threshold_ms: i64,
    /// 打开本地条目时的最长等待（None = 不等待）
    pub open_timeout_ms: Option<u64>,
    /// 打开网络条目时的最长等待
    pub network_open_timeout_ms: u64,
    /// 加载完成后自动播放
    pub auto_play: bool,
    /// 传给规则引擎的硬件解码提示
    pub hardware_decoding: bool,
    /// 没有任何规则命中时使用的音频渲染组件
    pub default_audio_renderer: String,
    /// 视频渲染组件
    pub video_renderer: Option<String>,
    /// 相对跳转的步长：小/中/大（毫秒）
    pub jump_distances_ms: [i64; 3],
    /// 关闭时记住位置，下次打开同一条目时恢复
    pub remember_position: bool,
    /// 内置规则文件
    pub baseline_rules: Option<PathBuf>,
    /// 用户覆盖规则文件
    pub user_rules: Option<PathBuf>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 250,
            drift_threshold_ms: 250,
            open_timeout_ms: Some(3000),
            network_open_timeout_ms: 8000,
            auto_play: true,
            hardware_decoding: cfg!(feature = "hwaccel"),
            default_audio_renderer: "system-audio-renderer".to_string(),
            video_renderer: None,
            jump_distances_ms: [1000, 5000, 20000],
            remember_position: true,
            baseline_rules: None,
            user_rules: Some(Self::default_user_rules_path()),
        }
    }
}

impl ControlConfig {
    /// 从 JSON 文件加载配置，缺失字段使用默认值
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("读取配置文件失败 {}: {}", path.display(), e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("解析配置文件失败 {}: {}", path.display(), e))?;
        config.validate()?;
        log::info!("已加载配置: {}", path.display());
        Ok(config)
    }

    /// 加载配置；文件不存在时返回默认配置
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            log::info!("未找到配置文件 {}，使用默认配置", path.display());
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(anyhow::anyhow!("tick_interval_ms 必须大于 0"));
        }
        if self.drift_threshold_ms <= 0 {
            return Err(anyhow::anyhow!("drift_threshold_ms 必须大于 0"));
        }
        if self.default_audio_renderer.trim().is_empty() {
            return Err(anyhow::anyhow!("default_audio_renderer 不能为空"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// 打开条目时的等待上限
    pub fn open_timeout(&self, is_remote: bool) -> Option<Duration> {
        if is_remote {
            Some(Duration::from_millis(self.network_open_timeout_ms))
        } else {
            self.open_timeout_ms.map(Duration::from_millis)
        }
    }

    /// 规则文件：内置层在前，用户覆盖层在后
    pub fn rule_paths(&self) -> Vec<PathBuf> {
        self.baseline_rules
            .iter()
            .chain(self.user_rules.iter())
            .cloned()
            .collect()
    }

    fn default_user_rules_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("myy_control")
            .join("rules.json")
    }
}
