use crate::core::{log_ctx, ControlConfig, PlayerError, PlayerState, Result};
use crate::pipeline::{MediaControl, Pipeline, SettingsStore, POSITION_KEY};
use crate::player::command::{Command, CommandHandler, PipelineEvent, SeekDirection};
use crate::player::events::PlaybackCallbacks;
use crate::player::rate::ClockRequest;
use crate::player::state::StateMachine;
use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use std::sync::Arc;

/// 在命令线程上执行命令
///
/// 稳定播放期间独占持有管线；关闭时在状态机的转换锁内拆除。
pub struct PlaybackExecutor {
    pipeline: Option<Pipeline>,
    control: Arc<dyn MediaControl>,
    state: Arc<StateMachine>,
    clock_tx: Sender<ClockRequest>,
    callbacks: Arc<dyn PlaybackCallbacks>,
    settings: Arc<dyn SettingsStore>,
    item_key: String,
    remember_position: bool,
    jump_distances: [i64; 3],
}

impl PlaybackExecutor {
    pub fn new(
        pipeline: Pipeline,
        state: Arc<StateMachine>,
        clock_tx: Sender<ClockRequest>,
        callbacks: Arc<dyn PlaybackCallbacks>,
        settings: Arc<dyn SettingsStore>,
        config: &ControlConfig,
    ) -> Self {
        Self {
            control: pipeline.control(),
            item_key: pipeline.location().to_string(),
            pipeline: Some(pipeline),
            state,
            clock_tx,
            callbacks,
            settings,
            remember_position: config.remember_position,
            jump_distances: config.jump_distances_ms,
        }
    }

    fn clock(&self, request: ClockRequest) {
        // 速率控制线程已退出时忽略
        let _ = self.clock_tx.send(request);
    }

    fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Seek(position) => self.seek_to(position),
            Command::SeekRelative(direction, step) => {
                let distance = self.jump_distances[step.index()];
                let current = self.control.position();
                let target = match direction {
                    SeekDirection::Forward => current + distance,
                    SeekDirection::Backward => current - distance,
                };
                self.seek_to(target)
            }
            Command::SeekPercent(fraction) => {
                let duration = self.control.duration();
                if duration <= 0 {
                    return Err(PlayerError::Other("总时长未知，无法按比例跳转".to_string()));
                }
                let target = (duration as f64 * fraction.clamp(0.0, 1.0)).round() as i64;
                self.seek_to(target)
            }
            Command::Pause => self.toggle_pause(),
            Command::Play { resume } => self.run(resume),
            Command::Stop { abrupt } => self.stop(abrupt),
            Command::RateChange(rate) => self.change_rate(rate),
            Command::Reposition(target) => self
                .control
                .seek(target)
                .map_err(|e| PlayerError::ClockDrift(format!("重定位到 {}ms 失败: {}", target, e))),
            Command::PipelineEvent(event) => self.pipeline_event(event),
        }
    }

    fn seek_to(&mut self, target: i64) -> Result<()> {
        let before = self.control.position();
        let duration = self.control.duration();
        let target = if duration > 0 {
            target.clamp(0, duration)
        } else {
            target.max(0)
        };

        self.control.seek(target)?;
        self.clock(ClockRequest::Rebase(target));
        info!("{} ⏩ 跳转: {}ms -> {}ms", log_ctx(), before, target);
        self.callbacks.on_seek(target, target - before);
        Ok(())
    }

    fn toggle_pause(&mut self) -> Result<()> {
        match self.state.current() {
            PlayerState::Paused => self.run(true),
            PlayerState::Playing | PlayerState::Loaded | PlayerState::Stopped => {
                self.control.pause()?;
                self.state.transition(PlayerState::Paused)?;
                self.clock(ClockRequest::Pause);
                info!("{} ⏸️ 已暂停", log_ctx());
                self.callbacks.on_playback_paused();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn run(&mut self, resume: bool) -> Result<()> {
        if self.state.current() == PlayerState::Playing {
            return Ok(());
        }
        self.control.run()?;
        self.state.transition(PlayerState::Playing)?;
        self.clock(ClockRequest::Resume);
        if resume {
            info!("{} ▶️ 继续播放", log_ctx());
            self.callbacks.on_playback_resumed();
        } else {
            info!("{} ▶️ 开始播放", log_ctx());
            self.callbacks.on_playback_started();
        }
        Ok(())
    }

    fn stop(&mut self, abrupt: bool) -> Result<()> {
        if self.state.current() == PlayerState::Stopped {
            return Ok(());
        }
        self.control.stop()?;
        self.clock(ClockRequest::Pause);
        if !abrupt {
            self.control.seek(0)?;
            self.clock(ClockRequest::Rebase(0));
        }
        self.state.transition(PlayerState::Stopped)?;
        info!("{} ⏹️ 已停止{}", log_ctx(), if abrupt { "（原位）" } else { "" });
        self.callbacks.on_playback_stopped();
        Ok(())
    }

    fn change_rate(&mut self, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate == 0.0 {
            return Err(PlayerError::Other(format!("无效的播放速率: {}", rate)));
        }
        let native = match self.control.set_rate(rate) {
            Ok(()) => true,
            Err(e) => {
                debug!("{} 管线不支持原生变速 ({}), 改为手动步进", log_ctx(), e);
                false
            }
        };
        self.clock(ClockRequest::Rate { rate, native });
        Ok(())
    }

    fn pipeline_event(&mut self, event: PipelineEvent) -> Result<()> {
        match event {
            PipelineEvent::EndOfStream => {
                info!("{} 🏁 播放结束", log_ctx());
                self.halt()?;
                self.callbacks.on_playback_ended();
            }
            PipelineEvent::ErrorAbort(reason) => {
                error!("{} ❌ 管线异常中止: {}", log_ctx(), reason);
                self.halt()?;
                self.callbacks.on_playback_stopped();
            }
            PipelineEvent::Other(code) => {
                debug!("{} 管线事件 {}", log_ctx(), code);
            }
        }
        Ok(())
    }

    /// 原位停止（不回到开头）
    fn halt(&mut self) -> Result<()> {
        if self.state.current() == PlayerState::Stopped {
            return Ok(());
        }
        self.control.stop()?;
        self.clock(ClockRequest::Pause);
        self.state.transition(PlayerState::Stopped)?;
        Ok(())
    }

    fn save_position(&self) {
        if !self.remember_position {
            return;
        }
        let position = self.control.position();
        let duration = self.control.duration();
        // 播放到末尾的条目下次从头开始
        let position = if duration > 0 && position >= duration { 0 } else { position.max(0) };
        self.settings.store(&self.item_key, POSITION_KEY, &position.to_string());
        debug!("记住位置 {} -> {}ms", self.item_key, position);
    }
}

impl CommandHandler for PlaybackExecutor {
    fn handle(&mut self, seq: u64, command: Command) {
        debug!("{} ▶ 执行命令 #{} {}", log_ctx(), seq, command);
        if let Err(e) = self.execute(command) {
            warn!("{} ⚠️ 命令 #{} 执行失败: {}", log_ctx(), seq, e);
        }
    }

    fn shutdown(&mut self) {
        self.save_position();
        if let Err(e) = self.control.stop() {
            debug!("停止管线失败: {}", e);
        }
        let pipeline = self.pipeline.take();
        let result = self.state.finish_closing(|| {
            if let Some(pipeline) = pipeline {
                pipeline.teardown();
            }
        });
        if let Err(e) = result {
            error!("{} ❌ 关闭管线失败: {}", log_ctx(), e);
        }
    }
}
