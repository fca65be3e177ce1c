// 集成测试共用的模拟组件宿主 / 管线 / 回调
#![allow(dead_code)]

use myy_control::core::PlayerState;
use myy_control::pipeline::{
    ComponentDescriptor, ComponentHost, ComponentRegistry, GraphFactory, MediaControl, MediaGraph, PipelineStage,
    StageHandle,
};
use myy_control::player::{PlaybackCallbacks, StateMachine};
use myy_control::PlayerError;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 轮询直到条件成立或超时
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[derive(Default)]
struct HostShared {
    events: Mutex<Vec<String>>,
    release_states: Mutex<Vec<PlayerState>>,
    observer: Mutex<Option<Arc<StateMachine>>>,
}

impl HostShared {
    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

pub struct MockStage {
    name: String,
    ports: usize,
    shared: Arc<HostShared>,
}

impl PipelineStage for MockStage {
    fn output_port_count(&self) -> usize {
        self.ports
    }

    fn configure(&mut self, settings: &str) {
        self.shared.push(format!("configure:{}:{}", self.name, settings));
    }

    fn release(&mut self) {
        self.shared.push(format!("release:{}", self.name));
    }
}

impl Drop for MockStage {
    fn drop(&mut self) {
        if let Some(state) = self.shared.observer.lock().as_ref() {
            self.shared.release_states.lock().push(state.current());
        }
        self.shared.push(format!("drop:{}", self.name));
    }
}

/// 记录创建/释放事件的组件宿主
#[derive(Default)]
pub struct MockHost {
    shared: Arc<HostShared>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    ports: Mutex<HashMap<String, usize>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl MockHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, name: &str) {
        self.failing.lock().insert(name.to_string());
    }

    pub fn panic_on(&self, name: &str) {
        self.panicking.lock().insert(name.to_string());
    }

    pub fn set_ports(&self, name: &str, ports: usize) {
        self.ports.lock().insert(name.to_string(), ports);
    }

    pub fn delay(&self, name: &str, delay: Duration) {
        self.delays.lock().insert(name.to_string(), delay);
    }

    /// 之后每次 drop 组件时记录当时的播放状态
    pub fn observe(&self, state: Arc<StateMachine>) {
        *self.shared.observer.lock() = Some(state);
    }

    pub fn events(&self) -> Vec<String> {
        self.shared.events.lock().clone()
    }

    pub fn events_with(&self, prefix: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    pub fn release_states(&self) -> Vec<PlayerState> {
        self.shared.release_states.lock().clone()
    }

    pub fn clear(&self) {
        self.shared.events.lock().clear();
    }

    fn make(&self, name: &str) -> anyhow::Result<Box<dyn PipelineStage>> {
        if let Some(delay) = self.delays.lock().get(name).copied() {
            thread::sleep(delay);
        }
        if self.panicking.lock().contains(name) {
            panic!("组件 {} 构造时崩溃", name);
        }
        if self.failing.lock().contains(name) {
            return Err(anyhow::anyhow!("无法创建 {}", name));
        }
        self.shared.push(format!("create:{}", name));
        let ports = self.ports.lock().get(name).copied().unwrap_or(1);
        Ok(Box::new(MockStage {
            name: name.to_string(),
            ports,
            shared: self.shared.clone(),
        }))
    }
}

impl ComponentHost for MockHost {
    fn create_internal(&self, name: &str) -> anyhow::Result<Box<dyn PipelineStage>> {
        self.make(name)
    }

    fn load_module(&self, _path: &Path, name: &str) -> anyhow::Result<Box<dyn PipelineStage>> {
        self.make(name)
    }

    fn create_system(&self, id: &str) -> anyhow::Result<Box<dyn PipelineStage>> {
        self.make(id)
    }

    fn unload_module(&self, path: &Path) {
        self.shared.push(format!("unload:{}", path.display()));
    }
}

/// 记录所有控制操作的管线控制
pub struct MockControl {
    position: AtomicI64,
    duration: i64,
    native_rate: bool,
    ops: Mutex<Vec<String>>,
}

impl MockControl {
    pub fn new(duration: i64, native_rate: bool) -> Arc<Self> {
        Arc::new(Self {
            position: AtomicI64::new(0),
            duration,
            native_rate,
            ops: Mutex::new(Vec::new()),
        })
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().clone()
    }

    pub fn reset(&self) {
        self.position.store(0, Ordering::SeqCst);
        self.ops.lock().clear();
    }
}

impl MediaControl for MockControl {
    fn run(&self) -> anyhow::Result<()> {
        self.ops.lock().push("run".to_string());
        Ok(())
    }

    fn pause(&self) -> anyhow::Result<()> {
        self.ops.lock().push("pause".to_string());
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        self.ops.lock().push("stop".to_string());
        Ok(())
    }

    fn seek(&self, position_ms: i64) -> anyhow::Result<()> {
        self.position.store(position_ms, Ordering::SeqCst);
        self.ops.lock().push(format!("seek:{}", position_ms));
        Ok(())
    }

    fn position(&self) -> i64 {
        self.position.load(Ordering::SeqCst)
    }

    fn duration(&self) -> i64 {
        self.duration
    }

    fn set_rate(&self, rate: f64) -> anyhow::Result<()> {
        if self.native_rate {
            self.ops.lock().push(format!("rate:{}", rate));
            Ok(())
        } else {
            Err(anyhow::anyhow!("不支持原生变速"))
        }
    }
}

pub struct MockGraph {
    host: Arc<MockHost>,
    control: Arc<MockControl>,
    fail_link: Option<String>,
}

impl MediaGraph for MockGraph {
    fn link(&mut self, upstream: &StageHandle, downstream: &StageHandle) -> anyhow::Result<()> {
        if self.fail_link.as_deref() == Some(downstream.component.as_str()) {
            return Err(anyhow::anyhow!("没有兼容的媒体类型"));
        }
        self.host
            .shared
            .push(format!("link:{}->{}", upstream.component, downstream.component));
        Ok(())
    }

    fn remove(&mut self, stage: &StageHandle) {
        self.host.shared.push(format!("remove:{}", stage.component));
    }

    fn control(&self) -> Arc<dyn MediaControl> {
        self.control.clone()
    }
}

/// 每次创建新管线时把控制位置归零
pub fn graph_factory(host: Arc<MockHost>, control: Arc<MockControl>, fail_link: Option<&str>) -> GraphFactory {
    let fail_link = fail_link.map(str::to_string);
    Arc::new(move || {
        control.reset();
        Box::new(MockGraph {
            host: host.clone(),
            control: control.clone(),
            fail_link: fail_link.clone(),
        }) as Box<dyn MediaGraph>
    })
}

pub const MODULE_PATH: &str = "/filters/lav.ax";

/// 测试用组件表
pub fn registry(host: Arc<MockHost>) -> ComponentRegistry {
    ComponentRegistry::new(host)
        .with(ComponentDescriptor::internal("file-source"))
        .with(ComponentDescriptor::internal("net-source"))
        .with(ComponentDescriptor::module("lav-splitter", MODULE_PATH))
        .with(ComponentDescriptor::internal("sub-filter"))
        .with(ComponentDescriptor::internal("extra-a"))
        .with(ComponentDescriptor::internal("extra-b"))
        .with(ComponentDescriptor::module("lav-video", MODULE_PATH))
        .with(ComponentDescriptor::module("lav-audio", MODULE_PATH))
        .with(ComponentDescriptor::system("broken-video", "broken-video"))
        .with(ComponentDescriptor::system("system-audio-renderer", "system-audio-renderer"))
        .with(ComponentDescriptor::internal("video-renderer"))
}

/// 记录回调顺序
#[derive(Default)]
pub struct RecordingCallbacks {
    events: Mutex<Vec<String>>,
}

impl RecordingCallbacks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.events.lock().iter().any(|e| e == event)
    }

    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl PlaybackCallbacks for RecordingCallbacks {
    fn on_playback_started(&self) {
        self.push("started".to_string());
    }

    fn on_playback_ended(&self) {
        self.push("ended".to_string());
    }

    fn on_playback_stopped(&self) {
        self.push("stopped".to_string());
    }

    fn on_playback_paused(&self) {
        self.push("paused".to_string());
    }

    fn on_playback_resumed(&self) {
        self.push("resumed".to_string());
    }

    fn on_seek(&self, position_ms: i64, offset_ms: i64) {
        self.push(format!("seek:{}:{}", position_ms, offset_ms));
    }

    fn on_speed_changed(&self, rate: f64) {
        self.push(format!("speed:{}", rate));
    }

    fn on_open_failed(&self, error: &PlayerError) {
        self.push(format!("open_failed:{}", error));
    }
}
