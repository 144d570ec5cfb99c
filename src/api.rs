use serde::Serialize;
use serde_json::{Map, Value, json};
use std::{sync::Mutex, thread::JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
    artwork::Artwork,
    error::{BridgeError, MethodError, Result},
    worker::WorkerEvent,
};

/// 发布播放状态的方法名。
pub const METHOD_UPDATE: &str = "update";
/// 清空“正在播放”显示的方法名。
pub const METHOD_CLEAR: &str = "clear";

/// 更新中缺少标题时发布的占位文本。
pub const UNKNOWN_TITLE: &str = "Unknown Title";
/// 更新中缺少艺术家时发布的占位文本。
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
/// 更新中缺少专辑时发布的占位文本。
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

const INVALID_ARGS_MESSAGE: &str = "Expected now playing dictionary.";

/// 播放状态
///
/// 由操作系统显示的粗粒度状态标签。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PlaybackStatus {
    #[default]
    /// 已停止
    Stopped,
    /// 播放中
    Playing,
    /// 已暂停
    Paused,
}

/// 应用通过一次 `update` 调用推送的播放状态。
///
/// 线路上的每个字段都是可选的。类型不对的值按缺失处理，
/// 所以一个错误的 `"duration": "abc"` 只会发布默认值，而不会让整个更新失败。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackStateUpdate {
    /// 标题
    pub title: Option<String>,
    /// 艺术家
    pub artist: Option<String>,
    /// 专辑名
    pub album: Option<String>,
    /// 歌曲总时长（秒）
    pub duration: Option<f64>,
    /// 当前播放位置（秒）
    pub position: Option<f64>,
    /// 是否正在播放
    pub is_playing: bool,
    /// 不透明的曲目标识（线路键名为 `id`）
    pub track_id: Option<String>,
    /// 封面地址（线路键名为 `imageUrl`）
    pub image_url: Option<String>,
}

impl PlaybackStateUpdate {
    /// 从原始的方法参数构建更新。
    ///
    /// # 返回
    /// - `Ok(update)`: `args` 是一个映射。
    /// - `Err(MethodError::InvalidArgs)`: `args` 不是映射（例如一个裸数字）。
    pub fn from_args(args: &Value) -> std::result::Result<Self, MethodError> {
        let Value::Object(fields) = args else {
            return Err(MethodError::InvalidArgs {
                message: INVALID_ARGS_MESSAGE.to_string(),
            });
        };

        Ok(Self {
            title: string_field(fields, "title"),
            artist: string_field(fields, "artist"),
            album: string_field(fields, "album"),
            duration: number_field(fields, "duration"),
            position: number_field(fields, "position"),
            is_playing: fields
                .get("isPlaying")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            track_id: string_field(fields, "id"),
            image_url: string_field(fields, "imageUrl"),
        })
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}

fn number_field(fields: &Map<String, Value>, key: &str) -> Option<f64> {
    fields.get(key).and_then(Value::as_f64)
}

/// 写入系统“正在播放”槽位的完整字段集。
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlayingInfo {
    /// 标题
    pub title: String,
    /// 艺术家
    pub artist: String,
    /// 专辑名
    pub album: String,
    /// 歌曲总时长（秒）
    pub duration: f64,
    /// 已播放时长（秒），不会为负
    pub elapsed: f64,
    /// 播放时为 1.0，否则为 0.0
    pub playback_rate: f64,
    /// 与元数据一同显示的封面
    pub artwork: Option<Artwork>,
}

/// 由系统远程控制界面发出的控制命令。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteCommand {
    /// 播放
    Play,
    /// 暂停
    Pause,
    /// 在播放与暂停之间切换
    Toggle,
    /// 下一首
    Next,
    /// 上一首
    Previous,
    /// 跳转到指定位置
    Seek {
        /// 目标位置（秒）
        position: f64,
    },
}

impl RemoteCommand {
    /// 在出站通道上使用的方法名。
    pub fn method(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Toggle => "toggle",
            Self::Next => "next",
            Self::Previous => "previous",
            Self::Seek { .. } => "seek",
        }
    }

    /// 随命令一起发送的参数（如果有）。
    pub fn arguments(&self) -> Option<Value> {
        match self {
            Self::Seek { position } => Some(json!({ "position": position })),
            _ => None,
        }
    }
}

/// 通过出站通道发送给应用的消息。
///
/// 发送是“发后即忘”的：通道已满或已关闭时消息会被丢弃并记录日志。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundCommand {
    /// 命令名（`play`、`pause`、`toggle`、`next`、`previous`、`seek`）
    pub method: String,
    /// 可选的参数，例如 `seek` 的 `{ "position": 42.5 }`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl From<RemoteCommand> for OutboundCommand {
    fn from(command: RemoteCommand) -> Self {
        Self {
            method: command.method().to_string(),
            arguments: command.arguments(),
        }
    }
}

/// 与后台服务交互的句柄。
///
/// 所有调用都会被排入工作线程的事件队列，并按提交顺序依次处理。
/// 丢弃句柄会通知工作线程退出，但不会等待它结束；
/// 需要确定性关闭时请调用 [`shutdown`](Self::shutdown)。
pub struct BridgeHandle {
    pub(crate) event_tx: mpsc::UnboundedSender<WorkerEvent>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) thread: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeHandle {
    /// 提交一次方法调用，并等待桥接层接受或拒绝它。
    ///
    /// `update` 触发的封面解析会在返回之后继续在后台进行。
    pub async fn invoke(&self, method: &str, args: Value) -> Result<()> {
        let reply_rx = self.submit(method, args)?;
        reply_rx
            .await
            .map_err(|_| BridgeError::WorkerGone)?
            .map_err(BridgeError::from)
    }

    /// [`invoke`](Self::invoke) 的阻塞版本，供同步的宿主使用。
    ///
    /// 不能在异步上下文中调用。
    pub fn invoke_blocking(&self, method: &str, args: Value) -> Result<()> {
        let reply_rx = self.submit(method, args)?;
        reply_rx
            .blocking_recv()
            .map_err(|_| BridgeError::WorkerGone)?
            .map_err(BridgeError::from)
    }

    /// 发布一个播放状态。
    pub async fn update(&self, args: Value) -> Result<()> {
        self.invoke(METHOD_UPDATE, args).await
    }

    /// 清空“正在播放”显示。
    pub async fn clear(&self) -> Result<()> {
        self.invoke(METHOD_CLEAR, Value::Null).await
    }

    /// 工作线程是否仍在接受调用。
    pub fn is_running(&self) -> bool {
        !self.event_tx.is_closed() && !self.shutdown.is_cancelled()
    }

    /// 终止后台线程，并等待它退出。
    pub fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();
        let handle = self.thread.lock()?.take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            log::warn!("[BridgeHandle] 工作线程在关闭过程中发生了 panic。");
        }
        Ok(())
    }

    fn submit(
        &self,
        method: &str,
        args: Value,
    ) -> Result<oneshot::Receiver<std::result::Result<(), MethodError>>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.event_tx
            .send(WorkerEvent::Call {
                method: method.to_string(),
                args,
                reply: reply_tx,
            })
            .map_err(|_| BridgeError::WorkerGone)?;
        Ok(reply_rx)
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
