use crate::core::PlayerError;

/// 播放事件回调
///
/// 从命令线程或速率控制线程调用，实现需自行处理线程切换。
pub trait PlaybackCallbacks: Send + Sync {
    fn on_playback_started(&self) {}

    fn on_playback_ended(&self) {}

    fn on_playback_stopped(&self) {}

    fn on_playback_paused(&self) {}

    fn on_playback_resumed(&self) {}

    /// 跳转完成：目标位置与相对跳转前的偏移（毫秒）
    fn on_seek(&self, _position_ms: i64, _offset_ms: i64) {}

    fn on_speed_changed(&self, _rate: f64) {}

    fn on_open_failed(&self, _error: &PlayerError) {}
}

/// 不关心事件时使用
pub struct NoopCallbacks;

impl PlaybackCallbacks for NoopCallbacks {}
