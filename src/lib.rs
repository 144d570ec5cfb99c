#![warn(missing_docs)]

//! 一个把应用的播放状态发布到操作系统“正在播放”区域，
//! 并把系统媒体控件的操作转发回应用的库。
//!
//! 应用通过 `update` / `clear` 方法调用推送松散类型的参数。桥接把标题、
//! 艺术家、专辑、时间线和封面写入系统，封面异步获取并按 URL 缓存。
//! 系统发出的播放、暂停、切换、下一首、上一首和跳转请求以
//! [`OutboundCommand`] 的形式返回给应用。
//!
//! ## 线程模型
//!
//! 所有桥接状态都位于一个专用的后台工作线程上。方法调用、系统传输信号
//! 和封面解析结果都排队到这个线程上逐个处理，因此曲目切换之后才加载完成的
//! 封面会被识别为过期结果，不会显示出来。封面的网络和磁盘 I/O 运行在
//! 一个独立的小型运行时上。
//!
//! ## 使用方法
//!
//! 1. 准备平台后端（Windows 上是 `platform::smtc`，其他环境可以使用
//!    [`platform::headless`]）。
//! 2. 调用 [`MediaBridge::start`]，得到 [`BridgeHandle`] 和命令接收端。
//! 3. 在一个单独的任务中循环接收 [`OutboundCommand`]，交给播放器处理。
//! 4. 播放状态变化时调用 [`BridgeHandle::update`]，停止播放时调用
//!    [`BridgeHandle::clear`]。
//! 5. 退出前调用 [`BridgeHandle::shutdown`]。
//!
//! ## 示例
//!
//! ```no_run
//! use nowplaying_bridge::platform::headless::{HeadlessControls, HeadlessDisplay};
//! use nowplaying_bridge::{BridgeConfig, MediaBridge};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (bridge, mut commands) = MediaBridge::start(
//!         HeadlessDisplay::new(),
//!         HeadlessControls::new(),
//!         BridgeConfig::default(),
//!     )?;
//!
//!     tokio::spawn(async move {
//!         while let Some(command) = commands.recv().await {
//!             println!("系统请求 '{}' {:?}", command.method, command.arguments);
//!         }
//!     });
//!
//!     bridge
//!         .update(json!({
//!             "title": "So What",
//!             "artist": "Miles Davis",
//!             "duration": 562.0,
//!             "position": 0.0,
//!             "isPlaying": true,
//!             "id": "kob-1",
//!             "imageUrl": "https://example.com/kind-of-blue.jpg",
//!         }))
//!         .await?;
//!
//!     bridge.clear().await?;
//!     bridge.shutdown()?;
//!     Ok(())
//! }
//! ```

mod api;
pub mod artwork;
mod bridge;
mod config;
mod error;
pub mod platform;
mod publisher;
mod remote;
mod worker;

pub use api::{
    BridgeHandle, METHOD_CLEAR, METHOD_UPDATE, NowPlayingInfo, OutboundCommand,
    PlaybackStateUpdate, PlaybackStatus, RemoteCommand, UNKNOWN_ALBUM, UNKNOWN_ARTIST,
    UNKNOWN_TITLE,
};
pub use config::{BridgeConfig, DEFAULT_MAX_ARTWORK_BYTES};
pub use error::{ArtworkError, BridgeError, MethodError, Result};
pub use publisher::NowPlayingPublisher;
pub use remote::{CommandSink, RemoteCommandRouter, command_for};

use std::sync::{Arc, Mutex};

use tokio::{runtime::Builder, sync::mpsc};
use tokio_util::sync::CancellationToken;

use crate::{
    artwork::{ArtworkCache, ArtworkFetcher, ArtworkSource, UrlArtworkSource},
    bridge::BridgeCore,
    platform::{NowPlayingDisplay, TransportControls},
    worker::{BridgeWorker, Dispatcher},
};

/// 把平台后端连接到一个运行中的桥接的入口。
pub struct MediaBridge;

impl MediaBridge {
    /// 在 `display` 和 `controls` 上启动桥接。
    ///
    /// 封面使用默认的 [`UrlArtworkSource`] 加载。
    ///
    /// # 返回
    /// - `Ok((handle, commands))`: 用于推送方法调用的句柄，以及接收
    ///   系统媒体控件所发出命令的接收端。
    /// - `Err(BridgeError)`: 如果 HTTP 客户端、运行时或后台线程无法创建。
    pub fn start(
        display: impl NowPlayingDisplay,
        controls: impl TransportControls,
        config: BridgeConfig,
    ) -> Result<(BridgeHandle, mpsc::Receiver<OutboundCommand>)> {
        let source = UrlArtworkSource::new(&config.user_agent, config.max_artwork_bytes)?;
        Self::start_with_source(display, controls, config, Arc::new(source))
    }

    /// 与 [`start`](Self::start) 相同，但使用自定义的封面数据源。
    ///
    /// 测试和需要额外协议的宿主可以借此替换网络访问。
    pub fn start_with_source(
        display: impl NowPlayingDisplay,
        controls: impl TransportControls,
        config: BridgeConfig,
        source: Arc<dyn ArtworkSource>,
    ) -> Result<(BridgeHandle, mpsc::Receiver<OutboundCommand>)> {
        log::info!("[MediaBridge] 正在启动。");

        let runtime = Builder::new_current_thread().enable_all().build()?;
        let io_runtime = Builder::new_multi_thread()
            .worker_threads(config.io_worker_threads.max(1))
            .thread_name("artwork-io")
            .enable_all()
            .build()?;

        let cache = ArtworkCache::new(config.artwork_cache_capacity);
        let fallback = config.load_fallback_artwork();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));

        let core = BridgeCore::new(
            NowPlayingPublisher::new(Box::new(display), cache.clone(), fallback),
            ArtworkFetcher::new(
                cache,
                source,
                io_runtime.handle().clone(),
                config.max_artwork_bytes,
            ),
            RemoteCommandRouter::new(Box::new(controls)),
            Dispatcher::new(event_tx.clone()),
            outbound_tx,
        );

        let shutdown = CancellationToken::new();
        let worker = BridgeWorker::new(core, event_rx, shutdown.clone());
        let thread = worker::start_worker_thread(worker, runtime, io_runtime)?;

        let handle = BridgeHandle {
            event_tx,
            shutdown,
            thread: Mutex::new(Some(thread)),
        };
        Ok((handle, outbound_rx))
    }
}
