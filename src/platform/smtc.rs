//! Windows 系统媒体传输控件 (SMTC) 后端。
//!
//! 持有一个 `MediaPlayer` 只是为了得到绑定到本进程的 SMTC 实例，
//! 这个播放器本身从不播放任何内容。

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use windows::{
    Foundation::{TimeSpan, TypedEventHandler},
    Media::{
        MediaPlaybackStatus, MediaPlaybackType, PlaybackPositionChangeRequestedEventArgs,
        Playback::MediaPlayer,
        SystemMediaTransportControls, SystemMediaTransportControlsButton,
        SystemMediaTransportControlsButtonPressedEventArgs,
        SystemMediaTransportControlsTimelineProperties,
    },
    Storage::Streams::{DataWriter, InMemoryRandomAccessStream, RandomAccessStreamReference},
    core::{HSTRING, Ref, Result as WinResult},
};
use windows_future::IAsyncOperation;

use super::{
    CommandStatus, NowPlayingDisplay, SignalHandler, TransportControls, TransportEvent,
    TransportSignal,
};
use crate::{
    api::{NowPlayingInfo, PlaybackStatus},
    artwork::Artwork,
};

type HandlerMap = Arc<Mutex<HashMap<TransportSignal, Arc<dyn SignalHandler>>>>;

/// 创建共享同一个 SMTC 实例的显示和传输控件。
///
/// # 返回
/// - `Ok((display, controls))`: 两者分别交给 [`MediaBridge::start`](crate::MediaBridge::start)。
/// - `Err(windows::core::Error)`: 如果无法创建 `MediaPlayer` 或取得 SMTC。
pub fn create() -> WinResult<(SmtcDisplay, SmtcControls)> {
    let player = MediaPlayer::new()?;
    if let Ok(command_manager) = player.CommandManager() {
        // 禁用播放器自带的命令处理，由我们自己响应按钮
        let _ = command_manager.SetIsEnabled(false);
    }
    let smtc = player.SystemMediaTransportControls()?;
    smtc.SetIsEnabled(true)?;
    smtc.SetPlaybackStatus(MediaPlaybackStatus::Closed)?;

    let controls = SmtcControls::new(player.clone(), smtc.clone())?;
    let display = SmtcDisplay {
        _player: player,
        smtc,
        current: None,
    };
    log::info!("[SMTC] 媒体传输控件已就绪。");
    Ok((display, controls))
}

/// SMTC 的元数据和时间线区域。
pub struct SmtcDisplay {
    _player: MediaPlayer,
    smtc: SystemMediaTransportControls,
    /// SMTC 无法读回正在显示的内容，因此在这里保存最近一次写入。
    current: Option<NowPlayingInfo>,
}

impl SmtcDisplay {
    fn write(&self, info: &NowPlayingInfo) -> WinResult<()> {
        let updater = self.smtc.DisplayUpdater()?;
        updater.ClearAll()?;
        updater.SetType(MediaPlaybackType::Music)?;

        let music = updater.MusicProperties()?;
        music.SetTitle(&HSTRING::from(info.title.as_str()))?;
        music.SetArtist(&HSTRING::from(info.artist.as_str()))?;
        music.SetAlbumTitle(&HSTRING::from(info.album.as_str()))?;

        if let Some(artwork) = &info.artwork {
            match thumbnail_from_artwork(artwork) {
                Ok(thumbnail) => updater.SetThumbnail(&thumbnail)?,
                Err(e) => log::warn!(
                    "[SMTC] 无法从 '{}' 创建缩略图: {e}",
                    artwork.origin()
                ),
            }
        }
        updater.Update()?;

        let timeline = SystemMediaTransportControlsTimelineProperties::new()?;
        timeline.SetStartTime(TimeSpan::from(Duration::ZERO))?;
        timeline.SetMinSeekTime(TimeSpan::from(Duration::ZERO))?;
        timeline.SetEndTime(TimeSpan::from(seconds(info.duration)))?;
        timeline.SetMaxSeekTime(TimeSpan::from(seconds(info.duration)))?;
        timeline.SetPosition(TimeSpan::from(seconds(info.elapsed)))?;
        self.smtc.UpdateTimelineProperties(&timeline)?;
        self.smtc.SetPlaybackRate(info.playback_rate)?;
        Ok(())
    }

    fn wipe(&self) -> WinResult<()> {
        let updater = self.smtc.DisplayUpdater()?;
        updater.ClearAll()?;
        updater.Update()
    }
}

impl NowPlayingDisplay for SmtcDisplay {
    fn set_now_playing(&mut self, info: Option<&NowPlayingInfo>) {
        let result = match info {
            Some(info) => self.write(info),
            None => self.wipe(),
        };
        if let Err(e) = result {
            log::warn!("[SMTC] 更新显示内容失败: {e}");
        }
        self.current = info.cloned();
    }

    fn now_playing(&self) -> Option<NowPlayingInfo> {
        self.current.clone()
    }

    fn set_playback_status(&mut self, status: PlaybackStatus) {
        let status = match status {
            PlaybackStatus::Stopped => MediaPlaybackStatus::Stopped,
            PlaybackStatus::Playing => MediaPlaybackStatus::Playing,
            PlaybackStatus::Paused => MediaPlaybackStatus::Paused,
        };
        if let Err(e) = self.smtc.SetPlaybackStatus(status) {
            log::warn!("[SMTC] 设置播放状态 {status:?} 失败: {e}");
        }
    }
}

/// SMTC 的按钮事件和时间线事件。
///
/// 释放时注销注册过的事件处理器。
pub struct SmtcControls {
    _player: MediaPlayer,
    smtc: SystemMediaTransportControls,
    handlers: HandlerMap,
    tokens: (i64, i64),
}

impl SmtcControls {
    fn new(player: MediaPlayer, smtc: SystemMediaTransportControls) -> WinResult<Self> {
        let handlers: HandlerMap = Arc::new(Mutex::new(HashMap::new()));

        let button_handlers = handlers.clone();
        let button_token = smtc.ButtonPressed(&TypedEventHandler::new(
            move |_, args: Ref<'_, SystemMediaTransportControlsButtonPressedEventArgs>| {
                let button = args.ok()?.Button()?;
                match signal_for_button(button) {
                    Some(signal) => deliver(&button_handlers, signal, TransportEvent::Trigger),
                    None => log::debug!("[SMTC] 忽略按钮 {button:?}。"),
                }
                Ok(())
            },
        ))?;

        let seek_handlers = handlers.clone();
        let seek_token = smtc.PlaybackPositionChangeRequested(&TypedEventHandler::new(
            move |_, args: Ref<'_, PlaybackPositionChangeRequestedEventArgs>| {
                let requested = args.ok()?.RequestedPlaybackPosition()?;
                deliver(
                    &seek_handlers,
                    TransportSignal::ChangePlaybackPosition,
                    TransportEvent::PlaybackPositionChange {
                        position: timespan_seconds(requested),
                    },
                );
                Ok(())
            },
        ))?;

        Ok(Self {
            _player: player,
            smtc,
            handlers,
            tokens: (button_token, seek_token),
        })
    }

    fn enable(&self, signal: TransportSignal) -> WinResult<()> {
        match signal {
            TransportSignal::Play => self.smtc.SetIsPlayEnabled(true),
            TransportSignal::Pause => self.smtc.SetIsPauseEnabled(true),
            TransportSignal::NextTrack => self.smtc.SetIsNextEnabled(true),
            TransportSignal::PreviousTrack => self.smtc.SetIsPreviousEnabled(true),
            // 没有对应的按钮；时间线事件始终有效
            TransportSignal::TogglePlayPause | TransportSignal::ChangePlaybackPosition => Ok(()),
        }
    }
}

impl TransportControls for SmtcControls {
    fn subscribe(&mut self, signal: TransportSignal, handler: Arc<dyn SignalHandler>) {
        if let Err(e) = self.enable(signal) {
            log::warn!("[SMTC] 启用 {signal:?} 失败: {e}");
        }
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(signal, handler);
    }
}

impl Drop for SmtcControls {
    fn drop(&mut self) {
        if let Err(e) = self.smtc.RemoveButtonPressed(self.tokens.0) {
            log::warn!("[SMTC] 注销 ButtonPressed 处理器失败: {e}");
        }
        if let Err(e) = self.smtc.RemovePlaybackPositionChangeRequested(self.tokens.1) {
            log::warn!("[SMTC] 注销 PlaybackPositionChangeRequested 处理器失败: {e}");
        }
    }
}

fn deliver(handlers: &HandlerMap, signal: TransportSignal, event: TransportEvent) {
    let handler = handlers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&signal)
        .cloned();
    let Some(handler) = handler else {
        log::debug!("[SMTC] {signal:?} 没有订阅者。");
        return;
    };
    if handler.handle(&event) == CommandStatus::CommandFailed {
        log::debug!("[SMTC] {signal:?} 被拒绝。");
    }
}

fn signal_for_button(button: SystemMediaTransportControlsButton) -> Option<TransportSignal> {
    match button {
        SystemMediaTransportControlsButton::Play => Some(TransportSignal::Play),
        SystemMediaTransportControlsButton::Pause => Some(TransportSignal::Pause),
        SystemMediaTransportControlsButton::Next => Some(TransportSignal::NextTrack),
        SystemMediaTransportControlsButton::Previous => Some(TransportSignal::PreviousTrack),
        _ => None,
    }
}

fn thumbnail_from_artwork(artwork: &Artwork) -> WinResult<RandomAccessStreamReference> {
    let stream = InMemoryRandomAccessStream::new()?;
    let writer = DataWriter::CreateDataWriter(&stream)?;
    writer.WriteBytes(artwork.bytes())?;
    let stored: IAsyncOperation<u32> = writer.StoreAsync()?;
    stored.get()?;
    writer.DetachStream()?;
    stream.Seek(0)?;
    RandomAccessStreamReference::CreateFromStream(&stream)
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or_default()
}

fn timespan_seconds(span: TimeSpan) -> f64 {
    // TimeSpan 以 100 纳秒为单位
    span.Duration as f64 / 10_000_000.0
}
