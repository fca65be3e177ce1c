use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// 时钟状态快照
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockState {
    /// 当前请求速率（1.0 = 正常）
    pub rate: f64,
    /// 上次变速/重定位时的墙钟时刻
    pub reference_instant: Instant,
    /// 上次变速/重定位时的位置（毫秒）
    pub reference_position: i64,
    pub paused: bool,
}

/// 播放时钟 - 记录 (时刻, 位置) 参考点并按请求速率推算当前位置
///
/// 只有速率/时钟控制线程会修改它，其它线程只读。
#[derive(Clone)]
pub struct PlaybackClock {
    inner: Arc<Mutex<ClockInner>>,
}

struct ClockInner {
    base_pts: i64,              // 基准位置（毫秒）
    base_instant: Instant,      // 基准时刻
    playback_rate: f64,         // 播放速率（1.0 = 正常）
    paused: bool,
    paused_at: i64,             // 暂停时的位置
}

impl ClockInner {
    fn now_at(&self, at: Instant) -> i64 {
        if self.paused {
            self.paused_at
        } else {
            let elapsed = at.saturating_duration_since(self.base_instant).as_millis() as f64;
            self.base_pts + (elapsed * self.playback_rate) as i64
        }
    }
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                base_pts: 0,
                base_instant: Instant::now(),
                playback_rate: 1.0,
                paused: true,
                paused_at: 0,
            })),
        }
    }

    /// 获取当前推算位置（毫秒）
    pub fn now(&self) -> i64 {
        self.now_at(Instant::now())
    }

    pub fn now_at(&self, at: Instant) -> i64 {
        self.inner.lock().now_at(at)
    }

    /// 设置播放位置（同时重置参考点）
    pub fn set_time(&self, pts: i64) {
        self.set_time_at(pts, Instant::now());
    }

    pub fn set_time_at(&self, pts: i64, at: Instant) {
        let mut inner = self.inner.lock();
        inner.base_pts = pts;
        inner.base_instant = at;
        inner.paused_at = pts;
    }

    /// 开始推进
    pub fn play_at(&self, at: Instant) {
        let mut inner = self.inner.lock();
        if inner.paused {
            inner.base_pts = inner.paused_at;
            inner.base_instant = at;
            inner.paused = false;
        }
    }

    /// 暂停推进（等效速率 0）
    pub fn pause_at(&self, at: Instant) {
        let mut inner = self.inner.lock();
        if !inner.paused {
            inner.paused_at = inner.now_at(at);
            inner.paused = true;
        }
    }

    /// 设置播放速率，并以当前推算位置作为新的参考点
    pub fn set_rate_at(&self, rate: f64, at: Instant) {
        let mut inner = self.inner.lock();
        if !inner.paused {
            let current_time = inner.now_at(at);
            inner.base_pts = current_time;
            inner.base_instant = at;
        }
        inner.playback_rate = rate;
    }

    pub fn rate(&self) -> f64 {
        self.inner.lock().playback_rate
    }

    /// 是否暂停
    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    pub fn snapshot(&self) -> ClockState {
        let inner = self.inner.lock();
        ClockState {
            rate: inner.playback_rate,
            reference_instant: inner.base_instant,
            reference_position: if inner.paused { inner.paused_at } else { inner.base_pts },
            paused: inner.paused,
        }
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}
