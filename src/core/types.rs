use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// 媒体协议类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamProtocol {
    /// 本地文件
    File,
    /// RTSP - 实时流协议（监控摄像头）
    RTSP,
    /// RTMP - 实时消息协议（直播流）
    RTMP,
    /// HLS - HTTP Live Streaming
    HLS,
    /// HTTP - 普通 HTTP 流
    HTTP,
}

impl StreamProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamProtocol::File => "file",
            StreamProtocol::RTSP => "rtsp",
            StreamProtocol::RTMP => "rtmp",
            StreamProtocol::HLS => "hls",
            StreamProtocol::HTTP => "http",
        }
    }

    /// 是否为网络协议
    pub fn is_network(&self) -> bool {
        !matches!(self, StreamProtocol::File)
    }
}

/// 探测得到的流信息
///
/// 只有经过探测的条目才有这些信息；规则引擎中依赖流信息的匹配项
/// （codec / resolution / aspect）在缺少时直接判定为不匹配。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamDetails {
    pub duration: i64,          // 总时长（毫秒）
    pub width: u32,
    pub height: u32,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub channels: u16,
    /// 显式分辨率标签（如 "1080p"），优先于 width x height
    pub resolution: Option<String>,
    /// 显式宽高比（如 "16:9"），优先于按宽高计算
    pub aspect: Option<String>,
}

impl StreamDetails {
    /// 用于规则匹配的分辨率字符串
    pub fn resolution_label(&self) -> Option<String> {
        if let Some(label) = &self.resolution {
            return Some(label.clone());
        }
        if self.width > 0 && self.height > 0 {
            Some(format!("{}x{}", self.width, self.height))
        } else {
            None
        }
    }

    /// 用于规则匹配的宽高比字符串
    pub fn aspect_label(&self) -> Option<String> {
        if let Some(aspect) = &self.aspect {
            return Some(aspect.clone());
        }
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let divisor = gcd(self.width, self.height);
        Some(format!("{}:{}", self.width / divisor, self.height / divisor))
    }

    pub fn has_video(&self) -> bool {
        self.video_codec.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.max(1)
}

/// 播放条目
///
/// 由调用方持有；一次播放尝试中对引擎只读。
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    /// 路径或 URL
    pub location: String,
    pub protocol: StreamProtocol,
    /// 容器类型（通常为扩展名，小写，不含点）
    pub container: String,
    pub details: Option<StreamDetails>,
    pub is_remote: bool,
    /// 特殊容器（光盘镜像等）
    pub is_special_container: bool,
}

impl MediaItem {
    /// 从 URL 字符串解析播放条目
    pub fn from_url(url: &str) -> anyhow::Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(anyhow::anyhow!("空的媒体地址"));
        }

        let protocol = if url.starts_with("rtsp://") {
            StreamProtocol::RTSP
        } else if url.starts_with("rtmp://") {
            StreamProtocol::RTMP
        } else if url.ends_with(".m3u8") || url.contains("/hls/") {
            StreamProtocol::HLS
        } else if url.starts_with("http://") || url.starts_with("https://") {
            StreamProtocol::HTTP
        } else {
            // 默认当作本地文件
            StreamProtocol::File
        };

        let file_name = file_name_of(url);
        let container = Path::new(file_name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let is_special_container = matches!(container.as_str(), "iso" | "ifo" | "bdmv" | "mpls");

        Ok(Self {
            location: url.to_string(),
            protocol,
            container,
            details: None,
            is_remote: protocol.is_network(),
            is_special_container,
        })
    }

    pub fn with_details(mut self, details: StreamDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_container(mut self, container: &str) -> Self {
        self.container = container.to_lowercase();
        self
    }

    pub fn with_special_container(mut self, special: bool) -> Self {
        self.is_special_container = special;
        self
    }

    /// 文件名（URL 的最后一段，去掉查询串）
    pub fn file_name(&self) -> &str {
        file_name_of(&self.location)
    }

    /// 条目标识（用于按条目存取设置）
    pub fn identity(&self) -> &str {
        &self.location
    }
}

fn file_name_of(location: &str) -> &str {
    let without_query = location.split(['?', '#']).next().unwrap_or(location);
    without_query
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(without_query)
}

/// 管线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageKind {
    #[serde(rename = "source")]
    Source,
    #[serde(rename = "splitter")]
    Splitter,
    #[serde(rename = "subtitle")]
    Subtitle,
    #[serde(rename = "extra")]
    Extra,
    #[serde(rename = "video")]
    VideoDecoder,
    #[serde(rename = "audio")]
    AudioDecoder,
    #[serde(rename = "audio_renderer")]
    AudioRenderer,
    #[serde(rename = "video_renderer")]
    VideoRenderer,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Source => "source",
            StageKind::Splitter => "splitter",
            StageKind::Subtitle => "subtitle filter",
            StageKind::Extra => "extra",
            StageKind::VideoDecoder => "video decoder",
            StageKind::AudioDecoder => "audio decoder",
            StageKind::AudioRenderer => "audio renderer",
            StageKind::VideoRenderer => "video renderer",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    Closed,
    Loading,
    Loaded,
    Playing,
    Paused,
    Stopped,
    Error,
    Closing,
}

impl PlayerState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            PlayerState::Closed => 0,
            PlayerState::Loading => 1,
            PlayerState::Loaded => 2,
            PlayerState::Playing => 3,
            PlayerState::Paused => 4,
            PlayerState::Stopped => 5,
            PlayerState::Error => 6,
            PlayerState::Closing => 7,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => PlayerState::Loading,
            2 => PlayerState::Loaded,
            3 => PlayerState::Playing,
            4 => PlayerState::Paused,
            5 => PlayerState::Stopped,
            6 => PlayerState::Error,
            7 => PlayerState::Closing,
            _ => PlayerState::Closed,
        }
    }

    /// 是否存在可操作的管线
    pub fn has_pipeline(&self) -> bool {
        matches!(
            self,
            PlayerState::Loaded | PlayerState::Playing | PlayerState::Paused | PlayerState::Stopped
        )
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 播放器状态快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub state: PlayerState,
    pub position: i64,          // 当前位置（毫秒）
    pub duration: i64,          // 总时长（毫秒）
    pub rate: f64,              // 当前请求速率
    pub location: Option<String>,
}

impl Default for PlayerStatus {
    fn default() -> Self {
        Self {
            state: PlayerState::Closed,
            position: 0,
            duration: 0,
            rate: 1.0,
            location: None,
        }
    }
}
