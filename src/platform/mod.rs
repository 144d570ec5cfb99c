//! 面向操作系统的边界。
//!
//! 桥接从不直接调用操作系统 API，只向 [`NowPlayingDisplay`] 写入，
//! 并订阅 [`TransportControls`]。本模块中的每个后端都为一种环境实现这两个 trait。

pub mod headless;
#[cfg(windows)]
pub mod smtc;

use std::sync::Arc;

use crate::api::{NowPlayingInfo, PlaybackStatus};

/// 系统的“正在播放”区域。
///
/// 只会在桥接的后台工作线程上被调用。
pub trait NowPlayingDisplay: Send + 'static {
    /// 整体替换显示内容，`None` 表示清空。
    fn set_now_playing(&mut self, info: Option<&NowPlayingInfo>);

    /// 读回当前的显示内容（如果平台支持）。
    fn now_playing(&self) -> Option<NowPlayingInfo>;

    /// 设置播放、暂停或停止状态。
    fn set_playback_status(&mut self, status: PlaybackStatus);
}

/// 桥接监听的媒体传输信号。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportSignal {
    /// 播放按钮。
    Play,
    /// 暂停按钮。
    Pause,
    /// 播放/暂停切换按钮。
    TogglePlayPause,
    /// 下一首按钮。
    NextTrack,
    /// 上一首按钮。
    PreviousTrack,
    /// 在系统时间线上拖动进度。
    ChangePlaybackPosition,
}

impl TransportSignal {
    /// 所有信号，按订阅顺序排列。
    pub const ALL: [Self; 6] = [
        Self::Play,
        Self::Pause,
        Self::TogglePlayPause,
        Self::NextTrack,
        Self::PreviousTrack,
        Self::ChangePlaybackPosition,
    ];
}

/// 随信号一起投递的负载。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportEvent {
    /// 普通的按钮按下。
    Trigger,
    /// 请求把播放位置移动到 `position` 秒。
    PlaybackPositionChange {
        /// 请求的位置（秒）。
        position: f64,
    },
}

/// 每个信号处理完之后报告给系统的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// 命令已被接受。
    Success,
    /// 命令无法处理。
    CommandFailed,
}

/// 接收某一种信号。
///
/// 在系统投递事件的线程上调用，这个线程是任意的。
pub trait SignalHandler: Send + Sync + 'static {
    /// 处理一次投递并报告结果。
    fn handle(&self, event: &TransportEvent) -> CommandStatus;
}

/// 系统的远程命令控件。
pub trait TransportControls: Send + 'static {
    /// 启用 `signal`，并把它的投递交给 `handler`。
    ///
    /// 控件存活期间订阅不会被移除。
    fn subscribe(&mut self, signal: TransportSignal, handler: Arc<dyn SignalHandler>);
}
