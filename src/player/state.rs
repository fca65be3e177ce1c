use crate::core::{log_ctx, PlayerError, PlayerState, Result};
use log::{debug, error};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// 状态转换表
pub fn is_valid_transition(from: PlayerState, to: PlayerState) -> bool {
    use PlayerState::*;
    matches!(
        (from, to),
        (Closed, Loading)
            | (Loading, Loaded)
            | (Loading, Error)
            | (Loaded, Playing)
            | (Loaded, Paused)
            | (Loaded, Stopped)
            | (Loaded, Closing)
            | (Playing, Paused)
            | (Playing, Stopped)
            | (Playing, Closing)
            | (Paused, Playing)
            | (Paused, Stopped)
            | (Paused, Closing)
            | (Stopped, Playing)
            | (Stopped, Paused)
            | (Stopped, Closing)
            | (Closing, Closed)
            | (Error, Closed)
    )
}

/// 播放状态机
///
/// 读取无锁；所有写入都经过转换锁，并按转换表校验。
pub struct StateMachine {
    state: AtomicU8,
    transition_lock: Mutex<()>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PlayerState::Closed.as_u8()),
            transition_lock: Mutex::new(()),
        }
    }

    pub fn current(&self) -> PlayerState {
        PlayerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// 校验并执行转换，返回转换前的状态
    pub fn transition(&self, to: PlayerState) -> Result<PlayerState> {
        let _guard = self.transition_lock.lock();
        self.transition_locked(to)
    }

    /// 仅当当前状态满足条件时转换（检查与写入在同一把锁内）
    pub fn transition_if(&self, to: PlayerState, allowed: impl Fn(PlayerState) -> bool) -> Result<Option<PlayerState>> {
        let _guard = self.transition_lock.lock();
        if !allowed(self.current()) {
            return Ok(None);
        }
        self.transition_locked(to).map(Some)
    }

    fn transition_locked(&self, to: PlayerState) -> Result<PlayerState> {
        let from = self.current();
        if from == to {
            return Ok(from);
        }
        if !is_valid_transition(from, to) {
            error!("{} ❌ 非法状态转换: {} -> {}", log_ctx(), from, to);
            return Err(PlayerError::StateTransition { from, to });
        }
        self.state.store(to.as_u8(), Ordering::Release);
        debug!("{} 状态: {} -> {}", log_ctx(), from, to);
        Ok(from)
    }

    /// Closing -> Closed：在转换锁内完成资源释放，之后才写入 Closed
    pub fn finish_closing<F: FnOnce()>(&self, release: F) -> Result<()> {
        let _guard = self.transition_lock.lock();
        let from = self.current();
        if !matches!(from, PlayerState::Closing | PlayerState::Error) {
            error!("{} ❌ 非法状态转换: {} -> Closed", log_ctx(), from);
            return Err(PlayerError::StateTransition {
                from,
                to: PlayerState::Closed,
            });
        }
        release();
        self.state.store(PlayerState::Closed.as_u8(), Ordering::Release);
        debug!("{} 状态: {} -> Closed", log_ctx(), from);
        Ok(())
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// 打开完成信号（加载成功或失败都会置位）
pub struct ReadySignal {
    ready: Mutex<bool>,
    condvar: Condvar,
}

impl ReadySignal {
    pub fn new() -> Self {
        Self {
            ready: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    pub fn set(&self) {
        let mut ready = self.ready.lock();
        *ready = true;
        self.condvar.notify_all();
    }

    pub fn reset(&self) {
        *self.ready.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.ready.lock()
    }

    /// 等待置位；None 表示不等待。返回是否已置位
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let Some(timeout) = timeout else {
            return self.is_set();
        };
        let mut ready = self.ready.lock();
        if !*ready {
            let _ = self.condvar.wait_while_for(&mut ready, |ready| !*ready, timeout);
        }
        *ready
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}
