//! 内存中的后端。
//!
//! 记录每一次写入，并允许宿主手动触发传输信号。适用于测试、演示，
//! 以及没有系统媒体服务的环境。克隆共享状态：把一个克隆交给桥接，
//! 用另一个克隆检查桥接做了什么。

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use super::{
    CommandStatus, NowPlayingDisplay, SignalHandler, TransportControls, TransportEvent,
    TransportSignal,
};
use crate::api::{NowPlayingInfo, PlaybackStatus};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// [`HeadlessDisplay`] 的状态快照。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayState {
    /// 当前的显示内容。
    pub info: Option<NowPlayingInfo>,
    /// 当前的播放状态。
    pub status: PlaybackStatus,
    /// 到目前为止 `set_now_playing` 的调用次数。
    pub writes: usize,
}

/// 存在于内存中的“正在播放”区域。
#[derive(Debug, Clone, Default)]
pub struct HeadlessDisplay {
    state: Arc<Mutex<DisplayState>>,
}

impl HeadlessDisplay {
    /// 创建一个空的显示。
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前状态的副本。
    pub fn snapshot(&self) -> DisplayState {
        lock(&self.state).clone()
    }

    /// 当前的显示内容。
    pub fn info(&self) -> Option<NowPlayingInfo> {
        lock(&self.state).info.clone()
    }

    /// 当前的播放状态。
    pub fn status(&self) -> PlaybackStatus {
        lock(&self.state).status
    }

    /// 当前显示的封面的来源（如果有）。
    pub fn artwork_origin(&self) -> Option<String> {
        lock(&self.state)
            .info
            .as_ref()
            .and_then(|info| info.artwork.as_ref())
            .map(|artwork| artwork.origin().to_string())
    }
}

impl NowPlayingDisplay for HeadlessDisplay {
    fn set_now_playing(&mut self, info: Option<&NowPlayingInfo>) {
        let mut state = lock(&self.state);
        state.info = info.cloned();
        state.writes += 1;
    }

    fn now_playing(&self) -> Option<NowPlayingInfo> {
        self.info()
    }

    fn set_playback_status(&mut self, status: PlaybackStatus) {
        lock(&self.state).status = status;
    }
}

/// 由宿主触发信号的传输控件。
#[derive(Clone, Default)]
pub struct HeadlessControls {
    inner: Arc<Mutex<ControlsState>>,
}

#[derive(Default)]
struct ControlsState {
    handlers: HashMap<TransportSignal, Arc<dyn SignalHandler>>,
    subscriptions: usize,
}

impl HeadlessControls {
    /// 创建一个没有任何订阅的控件。
    pub fn new() -> Self {
        Self::default()
    }

    /// 像系统一样为 `signal` 投递 `event`。
    ///
    /// 没有订阅 `signal` 时返回 `None`。
    pub fn fire(&self, signal: TransportSignal, event: TransportEvent) -> Option<CommandStatus> {
        let handler = lock(&self.inner).handlers.get(&signal).cloned()?;
        Some(handler.handle(&event))
    }

    /// 按下一个普通按钮。
    pub fn press(&self, signal: TransportSignal) -> Option<CommandStatus> {
        self.fire(signal, TransportEvent::Trigger)
    }

    /// `signal` 是否有处理器。
    pub fn is_subscribed(&self, signal: TransportSignal) -> bool {
        lock(&self.inner).handlers.contains_key(&signal)
    }

    /// 收到的 `subscribe` 调用总数。
    pub fn subscription_count(&self) -> usize {
        lock(&self.inner).subscriptions
    }
}

impl TransportControls for HeadlessControls {
    fn subscribe(&mut self, signal: TransportSignal, handler: Arc<dyn SignalHandler>) {
        let mut inner = lock(&self.inner);
        inner.handlers.insert(signal, handler);
        inner.subscriptions += 1;
    }
}
