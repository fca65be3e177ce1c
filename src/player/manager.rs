use crate::core::{log_ctx, ControlConfig, MediaItem, PlaybackClock, PlayerError, PlayerState, PlayerStatus, Result};
use crate::pipeline::{ComponentRegistry, GraphFactory, MediaControl, PipelineAssembler, SettingsStore, POSITION_KEY};
use crate::player::command::{Command, CommandLoop, CommandSender, PostOutcome, SeekDirection, SeekStep};
use crate::player::events::PlaybackCallbacks;
use crate::player::executor::PlaybackExecutor;
use crate::player::rate::{RateController, RateCore};
use crate::player::state::{ReadySignal, StateMachine};
use crate::rules::{ReloadReport, RuleEngine};
use crossbeam_channel::unbounded;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// 一个播放会话共享的协作者，由嵌入方构造并交给管理器持有
pub struct PlayerContext {
    pub rules: Arc<RuleEngine>,
    pub registry: Arc<ComponentRegistry>,
    pub graph_factory: GraphFactory,
    pub settings: Arc<dyn SettingsStore>,
    pub config: ControlConfig,
}

impl PlayerContext {
    /// 规则从配置中的规则文件加载
    pub fn new(
        config: ControlConfig,
        registry: Arc<ComponentRegistry>,
        graph_factory: GraphFactory,
        settings: Arc<dyn SettingsStore>,
    ) -> Result<Self> {
        let rules = RuleEngine::from_config(&config)?;
        Ok(Self {
            rules: Arc::new(rules),
            registry,
            graph_factory,
            settings,
            config,
        })
    }

    fn assembler(&self) -> PipelineAssembler {
        PipelineAssembler::new(self.registry.clone(), self.graph_factory.clone())
            .with_settings(self.settings.clone())
            .with_default_audio_renderer(&self.config.default_audio_renderer)
            .with_video_renderer(self.config.video_renderer.clone())
    }
}

/// open 的返回
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// 管线已就绪
    Ready,
    /// 等待超时，加载仍在后台进行
    Pending,
}

/// 管线就绪后运行的线程与接口
struct Session {
    item: MediaItem,
    control: Arc<dyn MediaControl>,
    clock: PlaybackClock,
    commands: CommandSender,
    command_loop: CommandLoop,
    rate_controller: RateController,
}

/// 管理器与加载线程共享的会话状态
#[derive(Default)]
struct SessionShared {
    session: Mutex<Option<Session>>,
    queued_stop: AtomicBool,
    last_error: Mutex<Option<PlayerError>>,
    location: Mutex<Option<String>>,
}

/// 播放管理器 - 会话生命周期与对外接口
pub struct PlaybackManager {
    context: Arc<PlayerContext>,
    callbacks: Arc<dyn PlaybackCallbacks>,
    state: Arc<StateMachine>,
    ready: Arc<ReadySignal>,
    shared: Arc<SessionShared>,
    loader: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackManager {
    pub fn new(context: PlayerContext, callbacks: Arc<dyn PlaybackCallbacks>) -> Self {
        info!("{} 🎮 创建播放管理器...", log_ctx());
        Self {
            context: Arc::new(context),
            callbacks,
            state: Arc::new(StateMachine::new()),
            ready: Arc::new(ReadySignal::new()),
            shared: Arc::new(SessionShared::default()),
            loader: Mutex::new(None),
        }
    }

    /// 打开条目：在加载线程上选择组件并组装管线
    ///
    /// 在配置的等待时间内完成时返回 Ready（失败返回 Err）；超时返回 Pending，
    /// 加载在后台继续，结果通过回调和状态反映。
    pub fn open(&self, item: MediaItem) -> Result<OpenOutcome> {
        if self.state.current() != PlayerState::Closed {
            self.close()?;
        }
        self.join_loader();

        info!("{} 📂 打开: {}", log_ctx(), item.location);
        self.ready.reset();
        self.shared.queued_stop.store(false, Ordering::SeqCst);
        *self.shared.last_error.lock() = None;
        *self.shared.location.lock() = Some(item.location.clone());

        // 持有 loader 锁直到句柄就位，并发的 close 会在 join_loader 处等待
        let mut loader = self.loader.lock();
        self.state.transition(PlayerState::Loading)?;

        let timeout = self.context.config.open_timeout(item.is_remote);
        let job = LoadJob {
            context: self.context.clone(),
            callbacks: self.callbacks.clone(),
            state: self.state.clone(),
            ready: self.ready.clone(),
            shared: self.shared.clone(),
            item,
        };
        let handle = match thread::Builder::new()
            .name("pipeline-loader".to_string())
            .spawn(move || job.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                // 加载线程没有启动，直接结束本次会话
                let _ = self.state.transition(PlayerState::Error);
                self.ready.set();
                return Err(PlayerError::IoError(e));
            }
        };
        *loader = Some(handle);
        drop(loader);

        if !self.ready.wait(timeout) {
            info!("{} ⏳ 加载未在等待时间内完成，后台继续", log_ctx());
            return Ok(OpenOutcome::Pending);
        }
        if self.state.current() == PlayerState::Error {
            self.join_loader();
            let err = self
                .shared
                .last_error
                .lock()
                .take()
                .unwrap_or_else(|| PlayerError::Other("打开失败".to_string()));
            return Err(err);
        }
        Ok(OpenOutcome::Ready)
    }

    /// 等待加载完成（成功或失败）
    pub fn wait_ready(&self, timeout: Option<std::time::Duration>) -> bool {
        self.ready.wait(timeout)
    }

    /// 关闭会话，阻塞到命令线程和速率控制线程都退出
    pub fn close(&self) -> Result<()> {
        if self.state.current() == PlayerState::Loading {
            // 不能拆除构造中的管线：记下停止请求，等加载结束
            info!("{} ⏳ 加载中收到关闭请求，等待加载完成", log_ctx());
            self.shared.queued_stop.store(true, Ordering::SeqCst);
        }
        self.join_loader();

        match self.state.current() {
            PlayerState::Closed => Ok(()),
            PlayerState::Error => {
                self.shutdown_session();
                self.state.finish_closing(|| {})?;
                info!("{} ✅ 会话已关闭（加载失败）", log_ctx());
                Ok(())
            }
            state if state.has_pipeline() => {
                info!("{} 🛑 关闭会话 ({})", log_ctx(), state);
                self.state.transition(PlayerState::Closing)?;
                self.shutdown_session();
                info!("{} ✅ 会话已关闭", log_ctx());
                Ok(())
            }
            state => {
                debug!("{} 状态 {} 下忽略关闭请求", log_ctx(), state);
                Ok(())
            }
        }
    }

    /// 停止速率控制线程和命令线程；命令线程退出前拆除管线并进入 Closed
    fn shutdown_session(&self) {
        let session = self.shared.session.lock().take();
        let Some(mut session) = session else {
            return;
        };
        let on_drain_thread = session.commands.is_drain_thread();
        session.rate_controller.shutdown();
        session.command_loop.shutdown();
        drop(session);

        // 命令线程异常退出时由这里收尾
        if !on_drain_thread && self.state.current() == PlayerState::Closing {
            warn!("{} ⚠️ 命令线程未完成关闭，补做收尾", log_ctx());
            if let Err(e) = self.state.finish_closing(|| {}) {
                error!("{} ❌ {}", log_ctx(), e);
            }
        }
    }

    fn join_loader(&self) {
        let handle = self.loader.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("{} ❌ 加载线程异常退出", log_ctx());
            }
        }
    }

    /// 投递命令；没有管线时返回 Discarded
    pub fn post(&self, command: Command, wait: bool) -> PostOutcome {
        match self.command_sender() {
            Some(sender) => sender.post(command, wait),
            None => {
                debug!("{} 🗑️ 没有活动会话，丢弃命令 {}", log_ctx(), command.name());
                PostOutcome::Discarded
            }
        }
    }

    pub fn command_sender(&self) -> Option<CommandSender> {
        self.shared.session.lock().as_ref().map(|s| s.commands.clone())
    }

    pub fn play(&self) -> PostOutcome {
        let resume = self.state.current() == PlayerState::Paused;
        self.post(Command::Play { resume }, true)
    }

    /// 在播放与暂停之间切换
    pub fn pause(&self) -> PostOutcome {
        self.post(Command::Pause, true)
    }

    pub fn stop(&self, abrupt: bool) -> PostOutcome {
        self.post(Command::Stop { abrupt }, true)
    }

    pub fn seek(&self, position_ms: i64, wait: bool) -> PostOutcome {
        self.post(Command::Seek(position_ms), wait)
    }

    pub fn seek_relative(&self, direction: SeekDirection, step: SeekStep) -> PostOutcome {
        self.post(Command::SeekRelative(direction, step), true)
    }

    pub fn seek_percent(&self, fraction: f64) -> PostOutcome {
        self.post(Command::SeekPercent(fraction), true)
    }

    pub fn set_rate(&self, rate: f64) -> PostOutcome {
        self.post(Command::RateChange(rate), true)
    }

    pub fn state(&self) -> PlayerState {
        self.state.current()
    }

    pub fn state_machine(&self) -> Arc<StateMachine> {
        self.state.clone()
    }

    pub fn context(&self) -> &PlayerContext {
        &self.context
    }

    /// 重新加载规则文件（只影响之后的打开）
    pub fn reload_rules(&self) -> Result<ReloadReport> {
        self.context.rules.reload()
    }

    pub fn status(&self) -> PlayerStatus {
        let state = self.state.current();
        match self.shared.session.lock().as_ref() {
            Some(session) => PlayerStatus {
                state,
                position: session.control.position(),
                duration: session.control.duration(),
                rate: session.clock.rate(),
                location: Some(session.item.location.clone()),
            },
            None => PlayerStatus {
                state,
                location: self.shared.location.lock().clone(),
                ..PlayerStatus::default()
            },
        }
    }
}

impl Drop for PlaybackManager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("{} ❌ 释放播放管理器时关闭失败: {}", log_ctx(), e);
        }
    }
}

/// 加载线程的任务
struct LoadJob {
    context: Arc<PlayerContext>,
    callbacks: Arc<dyn PlaybackCallbacks>,
    state: Arc<StateMachine>,
    ready: Arc<ReadySignal>,
    shared: Arc<SessionShared>,
    item: MediaItem,
}

impl LoadJob {
    fn run(self) {
        // 加载期间的任何 panic 都转成打开失败，就绪信号总会被设置
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.start_session()))
            .unwrap_or_else(|payload| Err(PlayerError::WorkerPanicked(panic_message(payload))));
        if let Err(e) = outcome {
            self.fail(e);
        }
    }

    fn start_session(&self) -> Result<()> {
        let config = &self.context.config;
        let choices = self
            .context
            .rules
            .choose_components(&self.item, config.hardware_decoding);
        debug!("{} 组件选择: {:?}", log_ctx(), choices);

        let pipeline = self.context.assembler().build(&self.item, &choices)?;

        let control = pipeline.control();
        let clock = PlaybackClock::new();
        let (clock_tx, clock_rx) = unbounded();
        let executor = PlaybackExecutor::new(
            pipeline,
            self.state.clone(),
            clock_tx.clone(),
            self.callbacks.clone(),
            self.context.settings.clone(),
            config,
        );
        let command_loop = CommandLoop::spawn(self.state.clone(), executor)?;
        let commands = command_loop.sender();
        let core = RateCore::new(
            clock.clone(),
            control.clone(),
            commands.clone(),
            self.callbacks.clone(),
            config.drift_threshold_ms,
        );
        let rate_controller = RateController::spawn(clock_tx, clock_rx, core, config.tick_interval())?;

        *self.shared.session.lock() = Some(Session {
            item: self.item.clone(),
            control,
            clock,
            commands: commands.clone(),
            command_loop,
            rate_controller,
        });
        self.state.transition(PlayerState::Loaded)?;
        info!("{} ✅ 加载完成: {}", log_ctx(), self.item.location);
        self.ready.set();

        if self.shared.queued_stop.load(Ordering::SeqCst) {
            info!("{} 加载期间收到关闭请求，不自动播放", log_ctx());
            return Ok(());
        }

        if config.remember_position {
            let remembered = self
                .context
                .settings
                .load(self.item.identity(), POSITION_KEY)
                .and_then(|value| value.parse::<i64>().ok())
                .filter(|position| *position > 0);
            if let Some(position) = remembered {
                info!("{} 📍 恢复上次位置 {}ms", log_ctx(), position);
                commands.post(Command::Seek(position), false);
            }
        }
        if config.auto_play {
            commands.post(Command::Play { resume: false }, false);
        }
        Ok(())
    }

    fn fail(&self, err: PlayerError) {
        error!("{} ❌ 打开失败 {}: {}", log_ctx(), self.item.location, err);

        // 已启动的线程随会话一起回收
        let session = self.shared.session.lock().take();
        if let Some(mut session) = session {
            session.rate_controller.shutdown();
            session.command_loop.shutdown();
        }
        if let Err(e) = self.state.transition(PlayerState::Error) {
            error!("{} ❌ {}", log_ctx(), e);
        }
        let callbacks = &self.callbacks;
        if panic::catch_unwind(AssertUnwindSafe(|| callbacks.on_open_failed(&err))).is_err() {
            error!("{} ❌ on_open_failed 回调 panic", log_ctx());
        }
        *self.shared.last_error.lock() = Some(err);
        self.ready.set();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知 panic".to_string()
    }
}
