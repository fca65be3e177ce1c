use crate::core::{log_ctx, PlaybackClock, PlayerError, Result};
use crate::pipeline::MediaControl;
use crate::player::command::{Command, CommandSender, PostOutcome};
use crate::player::events::PlaybackCallbacks;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const RATE_EPSILON: f64 = 1e-6;

/// 发给速率/时钟控制线程的请求（时钟只在该线程内修改）
#[derive(Debug, Clone, PartialEq)]
pub enum ClockRequest {
    /// native 表示管线已原生接受该速率
    Rate { rate: f64, native: bool },
    Pause,
    Resume,
    /// 跳转后以新位置作为参考点
    Rebase(i64),
    Shutdown,
}

/// 手动步进的目标位置：start + elapsed × rate，限制在 [0, duration]
///
/// 返回 (目标位置, 是否到达边界)。duration <= 0 表示总时长未知，只限制下界。
pub fn trick_target(start: i64, elapsed: Duration, rate: f64, duration: i64) -> (i64, bool) {
    let raw = start as f64 + elapsed.as_secs_f64() * 1000.0 * rate;
    // 正向步进时 0 只是起点，不是边界
    if raw < 0.0 || (raw == 0.0 && rate < 0.0) {
        return (0, true);
    }
    if duration > 0 && raw >= duration as f64 {
        return (duration, true);
    }
    (raw as i64, false)
}

/// 速率/时钟控制逻辑（不含线程），按请求更新时钟并在节拍时修正漂移
pub struct RateCore {
    clock: PlaybackClock,
    control: Arc<dyn MediaControl>,
    commands: CommandSender,
    callbacks: Arc<dyn PlaybackCallbacks>,
    drift_threshold: i64,
    native: bool,
}

impl RateCore {
    pub fn new(
        clock: PlaybackClock,
        control: Arc<dyn MediaControl>,
        commands: CommandSender,
        callbacks: Arc<dyn PlaybackCallbacks>,
        drift_threshold: i64,
    ) -> Self {
        Self {
            clock,
            control,
            commands,
            callbacks,
            drift_threshold,
            native: true,
        }
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn apply(&mut self, request: ClockRequest, now: Instant) {
        match request {
            ClockRequest::Rate { rate, native } => {
                if (rate - self.clock.rate()).abs() < RATE_EPSILON {
                    debug!("{} 速率未变化 ({:.2}x)，忽略", log_ctx(), rate);
                    return;
                }
                // 以管线实际位置作为新的参考点
                let position = self.control.position();
                self.clock.set_time_at(position, now);
                self.clock.set_rate_at(rate, now);
                self.native = native;
                info!(
                    "{} ⏩ 播放速率: {:.2}x ({})",
                    log_ctx(),
                    rate,
                    if native { "原生" } else { "手动步进" }
                );
                self.callbacks.on_speed_changed(rate);
            }
            ClockRequest::Pause => self.clock.pause_at(now),
            ClockRequest::Resume => {
                let position = self.control.position();
                self.clock.set_time_at(position, now);
                self.clock.play_at(now);
            }
            ClockRequest::Rebase(position) => self.clock.set_time_at(position, now),
            ClockRequest::Shutdown => {}
        }
    }

    /// 一次节拍：需要手动步进时返回投递的重定位目标
    pub fn tick_at(&mut self, now: Instant) -> Option<i64> {
        let snapshot = self.clock.snapshot();
        if self.native || snapshot.paused || (snapshot.rate - 1.0).abs() < RATE_EPSILON {
            return None;
        }

        let elapsed = now.saturating_duration_since(snapshot.reference_instant);
        let duration = self.control.duration();
        let (target, boundary) = trick_target(snapshot.reference_position, elapsed, snapshot.rate, duration);

        if boundary {
            // 到达边界：恢复正常速率，只通知一次
            self.clock.set_time_at(target, now);
            self.clock.set_rate_at(1.0, now);
            info!("{} ⏹ 步进到达边界 {}ms，速率恢复 1.0x", log_ctx(), target);
            self.reposition(target);
            self.callbacks.on_speed_changed(1.0);
            return Some(target);
        }

        let actual = self.control.position();
        if (target - actual).abs() < self.drift_threshold {
            return None;
        }
        debug!("{} 漂移 {}ms，重定位到 {}ms", log_ctx(), target - actual, target);
        self.reposition(target);
        Some(target)
    }

    /// 只投递不等待；被拒绝时不重试，下个节拍从原参考点重新计算
    fn reposition(&self, target: i64) {
        if self.commands.post(Command::Reposition(target), false) == PostOutcome::Discarded {
            let err = PlayerError::ClockDrift(format!("重定位到 {}ms 被丢弃", target));
            warn!("{} ⚠️ {}", log_ctx(), err);
        }
    }
}

/// 速率/时钟控制线程
pub struct RateController {
    tx: Sender<ClockRequest>,
    join_handle: Option<JoinHandle<()>>,
}

impl RateController {
    /// rx 对应的发送端已交给命令执行器；tx 仅用于关闭
    pub fn spawn(
        tx: Sender<ClockRequest>,
        rx: Receiver<ClockRequest>,
        core: RateCore,
        tick: Duration,
    ) -> Result<Self> {
        let join_handle = thread::Builder::new()
            .name("rate-controller".to_string())
            .spawn(move || run_controller(rx, core, tick))?;
        info!("{} 🚀 速率控制线程已启动 (节拍 {:?})", log_ctx(), tick);
        Ok(Self {
            tx,
            join_handle: Some(join_handle),
        })
    }

    pub fn sender(&self) -> Sender<ClockRequest> {
        self.tx.clone()
    }

    pub fn shutdown(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.tx.send(ClockRequest::Shutdown);
            if handle.thread().id() == thread::current().id() {
                warn!("{} ⚠️ 速率控制线程内请求关闭，不等待自身", log_ctx());
                return;
            }
            if handle.join().is_err() {
                error!("{} ❌ 速率控制线程异常退出", log_ctx());
            }
            info!("{} 🛑 速率控制线程已停止", log_ctx());
        }
    }
}

impl Drop for RateController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_controller(rx: Receiver<ClockRequest>, mut core: RateCore, tick: Duration) {
    let mut next_tick = Instant::now() + tick;
    loop {
        match rx.recv_deadline(next_tick) {
            Ok(ClockRequest::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(request) => core.apply(request, Instant::now()),
            Err(RecvTimeoutError::Timeout) => {
                core.tick_at(Instant::now());
                next_tick += tick;
                // 节拍落后太多时不补拍
                let now = Instant::now();
                if next_tick < now {
                    next_tick = now + tick;
                }
            }
        }
    }
}
