use crate::core::{log_ctx, PlayerState, Result};
use crate::player::state::StateMachine;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

/// 相对跳转方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    Forward,
    Backward,
}

/// 相对跳转步长（对应配置里的小/中/大）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStep {
    Small,
    Medium,
    Large,
}

impl SeekStep {
    pub fn index(&self) -> usize {
        match self {
            SeekStep::Small => 0,
            SeekStep::Medium => 1,
            SeekStep::Large => 2,
        }
    }
}

/// 管线回报的事件
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    EndOfStream,
    ErrorAbort(String),
    Other(i32),
}

/// 播放命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// 跳转到绝对位置（毫秒）
    Seek(i64),
    SeekRelative(SeekDirection, SeekStep),
    /// 按总时长比例跳转（0.0 ~ 1.0）
    SeekPercent(f64),
    /// 在播放/暂停之间切换
    Pause,
    Play { resume: bool },
    Stop { abrupt: bool },
    RateChange(f64),
    /// 手动步进的重定位（不触发 on_seek）
    Reposition(i64),
    PipelineEvent(PipelineEvent),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Seek(_) => "Seek",
            Command::SeekRelative(..) => "SeekRelative",
            Command::SeekPercent(_) => "SeekPercent",
            Command::Pause => "Pause",
            Command::Play { .. } => "Play",
            Command::Stop { .. } => "Stop",
            Command::RateChange(_) => "RateChange",
            Command::Reposition(_) => "Reposition",
            Command::PipelineEvent(_) => "PipelineEvent",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 投递结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    /// 已执行完毕（等待模式）
    Completed,
    /// 已入队，未等待
    Queued,
    /// 当前状态没有可操作的管线，命令被丢弃
    Discarded,
}

/// 命令线程的消费者
pub trait CommandHandler: Send + 'static {
    fn handle(&mut self, seq: u64, command: Command);

    /// 收到关闭请求后调用一次，之后命令线程退出
    fn shutdown(&mut self);
}

enum Envelope {
    Run {
        seq: u64,
        command: Command,
        done: Option<Sender<()>>,
    },
    Shutdown,
}

/// 只有存在管线的状态才接受命令
fn accepts_commands(state: PlayerState) -> bool {
    state.has_pipeline()
}

struct SenderInner {
    tx: Sender<Envelope>,
    state: Arc<StateMachine>,
    next_seq: Mutex<u64>,
    drain_thread: ThreadId,
}

/// 命令投递端，可在任意线程克隆使用
#[derive(Clone)]
pub struct CommandSender {
    inner: Arc<SenderInner>,
}

impl CommandSender {
    /// 投递命令；wait 为 true 时阻塞到命令执行完毕
    pub fn post(&self, command: Command, wait: bool) -> PostOutcome {
        let inner = &self.inner;
        let state = inner.state.current();
        if !accepts_commands(state) {
            debug!("{} 🗑️ 状态 {} 下丢弃命令 {}", log_ctx(), state, command.name());
            return PostOutcome::Discarded;
        }

        // 命令线程内部投递时不能等待自己
        let wait = wait && thread::current().id() != inner.drain_thread;
        let (done_tx, done_rx) = if wait {
            let (tx, rx) = bounded(1);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        {
            // 序号与入队在同一把锁内，序号顺序即队列顺序
            let mut seq = inner.next_seq.lock();
            *seq += 1;
            let envelope = Envelope::Run {
                seq: *seq,
                command,
                done: done_tx,
            };
            if inner.tx.send(envelope).is_err() {
                debug!("{} 命令线程已退出，丢弃命令", log_ctx());
                return PostOutcome::Discarded;
            }
        }

        match done_rx {
            // 发送端被丢弃说明命令线程退出前没有执行它
            Some(rx) => match rx.recv() {
                Ok(()) => PostOutcome::Completed,
                Err(_) => PostOutcome::Discarded,
            },
            None => PostOutcome::Queued,
        }
    }

    pub fn is_drain_thread(&self) -> bool {
        thread::current().id() == self.inner.drain_thread
    }
}

/// 命令循环：单消费者线程按 FIFO 执行命令
pub struct CommandLoop {
    sender: CommandSender,
    join_handle: Option<JoinHandle<()>>,
}

impl CommandLoop {
    pub fn spawn<H: CommandHandler>(state: Arc<StateMachine>, handler: H) -> Result<Self> {
        let (tx, rx) = unbounded();
        let loop_state = state.clone();
        let join_handle = thread::Builder::new()
            .name("command-loop".to_string())
            .spawn(move || run_loop(rx, loop_state, handler))?;

        let sender = CommandSender {
            inner: Arc::new(SenderInner {
                tx,
                state,
                next_seq: Mutex::new(0),
                drain_thread: join_handle.thread().id(),
            }),
        };
        info!("{} 🚀 命令线程已启动", log_ctx());
        Ok(Self {
            sender,
            join_handle: Some(join_handle),
        })
    }

    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// 请求关闭并等待命令线程退出（已入队的命令先执行完）
    pub fn shutdown(&mut self) {
        let Some(handle) = self.join_handle.take() else {
            return;
        };
        let _ = self.sender.inner.tx.send(Envelope::Shutdown);
        if handle.thread().id() == thread::current().id() {
            warn!("{} ⚠️ 命令线程内请求关闭，不等待自身", log_ctx());
            return;
        }
        if handle.join().is_err() {
            error!("{} ❌ 命令线程异常退出", log_ctx());
        }
        info!("{} 🛑 命令线程已停止", log_ctx());
    }
}

impl Drop for CommandLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop<H: CommandHandler>(rx: Receiver<Envelope>, state: Arc<StateMachine>, mut handler: H) {
    for envelope in rx.iter() {
        match envelope {
            Envelope::Run { seq, command, done } => {
                let current = state.current();
                if accepts_commands(current) {
                    let name = command.name();
                    let result = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(seq, command)));
                    if result.is_err() {
                        error!("{} ❌ 命令 #{} {} 执行时 panic", log_ctx(), seq, name);
                    }
                } else {
                    debug!("{} 🗑️ 状态 {} 下丢弃命令 #{} {}", log_ctx(), current, seq, command.name());
                }
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            Envelope::Shutdown => {
                handler.shutdown();
                break;
            }
        }
    }
    // 剩余的信封随 rx 一起丢弃，等待者随之解除阻塞
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::time::Duration;

    struct Recorder {
        log: Arc<Mutex<Vec<(u64, Command)>>>,
        shut: Arc<Mutex<bool>>,
    }

    impl CommandHandler for Recorder {
        fn handle(&mut self, seq: u64, command: Command) {
            self.log.lock().push((seq, command));
        }

        fn shutdown(&mut self) {
            *self.shut.lock() = true;
        }
    }

    fn loaded_state() -> Arc<StateMachine> {
        let state = Arc::new(StateMachine::new());
        state.transition(PlayerState::Loading).unwrap();
        state.transition(PlayerState::Loaded).unwrap();
        state
    }

    fn recorder() -> (Recorder, Arc<Mutex<Vec<(u64, Command)>>>, Arc<Mutex<bool>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shut = Arc::new(Mutex::new(false));
        (
            Recorder {
                log: log.clone(),
                shut: shut.clone(),
            },
            log,
            shut,
        )
    }

    #[test]
    fn test_fifo_with_concurrent_producers() {
        let (handler, log, _) = recorder();
        let mut command_loop = CommandLoop::spawn(loaded_state(), handler).unwrap();

        let producers: Vec<_> = (0..4)
            .map(|producer| {
                let sender = command_loop.sender();
                thread::spawn(move || {
                    let mut rng = rand::rng();
                    for i in 0..50 {
                        if rng.random_bool(0.3) {
                            thread::sleep(Duration::from_micros(rng.random_range(0..200)));
                        }
                        let wait = rng.random_bool(0.2);
                        let outcome = sender.post(Command::Seek(producer * 1000 + i), wait);
                        assert_ne!(outcome, PostOutcome::Discarded);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        command_loop.shutdown();

        let log = log.lock();
        assert_eq!(log.len(), 200);
        // 执行顺序与入队序号一致
        for pair in log.windows(2) {
            assert!(pair[0].0 < pair[1].0);
        }
        // 同一生产者的命令保持相对顺序
        for producer in 0..4i64 {
            let positions: Vec<i64> = log
                .iter()
                .filter_map(|(_, c)| match c {
                    Command::Seek(p) if p / 1000 == producer => Some(*p),
                    _ => None,
                })
                .collect();
            assert_eq!(positions.len(), 50);
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_discard_without_pipeline() {
        let state = Arc::new(StateMachine::new());
        let (handler, log, shut) = recorder();
        let mut command_loop = CommandLoop::spawn(state.clone(), handler).unwrap();
        let sender = command_loop.sender();

        assert_eq!(sender.post(Command::Pause, true), PostOutcome::Discarded);
        state.transition(PlayerState::Loading).unwrap();
        assert_eq!(sender.post(Command::Seek(10), true), PostOutcome::Discarded);

        state.transition(PlayerState::Loaded).unwrap();
        assert_eq!(sender.post(Command::Seek(20), true), PostOutcome::Completed);
        assert_eq!(sender.post(Command::Seek(30), false), PostOutcome::Queued);

        command_loop.shutdown();
        assert!(*shut.lock());
        let commands: Vec<Command> = log.lock().iter().map(|(_, c)| c.clone()).collect();
        assert_eq!(commands, vec![Command::Seek(20), Command::Seek(30)]);

        // 线程退出后的投递不会阻塞
        assert_eq!(sender.post(Command::Seek(40), true), PostOutcome::Discarded);
    }

    #[test]
    fn test_queued_command_dropped_after_closing() {
        struct Slow {
            state: Arc<StateMachine>,
            handled: Arc<Mutex<Vec<u64>>>,
        }

        impl CommandHandler for Slow {
            fn handle(&mut self, seq: u64, _command: Command) {
                if seq == 1 {
                    // 第一条命令执行期间进入 Closing
                    self.state.transition(PlayerState::Closing).unwrap();
                }
                self.handled.lock().push(seq);
            }

            fn shutdown(&mut self) {}
        }

        let state = loaded_state();
        let handled = Arc::new(Mutex::new(Vec::new()));
        let mut command_loop = CommandLoop::spawn(
            state.clone(),
            Slow {
                state: state.clone(),
                handled: handled.clone(),
            },
        )
        .unwrap();
        let sender = command_loop.sender();
        sender.post(Command::Pause, false);
        sender.post(Command::Seek(5), false);
        command_loop.shutdown();

        // 第二条在 Closing 下被丢弃
        assert_eq!(*handled.lock(), vec![1]);
    }
}
