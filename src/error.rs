use std::time::Duration;

use thiserror::Error;

/// 定义库的统一错误枚举。
#[derive(Debug, Error)]
pub enum BridgeError {
    /// 无法启动后台工作线程。
    ///
    /// 这通常发生在 `std::thread::Builder::spawn` 失败时。
    #[error("无法启动后台工作线程: {0}")]
    WorkerThread(String),

    /// 创建 Tokio 异步运行时失败。
    ///
    /// 这是一个严重的初始化错误，会导致后台线程无法启动。
    #[error("Tokio 运行时创建失败: {0}")]
    TokioRuntime(#[from] std::io::Error),

    /// 后台工作线程已经退出。
    ///
    /// 调用无法投递，或者在得到回复之前工作线程就已关闭。
    #[error("后台工作线程已停止")]
    WorkerGone,

    /// 锁已被毒化。
    #[error("锁已被毒化: {0}")]
    MutexPoisoned(String),

    /// 方法调用被拒绝。
    ///
    /// 内部的 [`MethodError`] 携带了返回给调用方的错误码。
    #[error(transparent)]
    Method(#[from] MethodError),

    /// 默认的封面加载器无法创建（例如 HTTP 客户端初始化失败）。
    #[error("封面加载器初始化失败: {0}")]
    Artwork(#[from] ArtworkError),
}

impl<T> From<std::sync::PoisonError<T>> for BridgeError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        BridgeError::MutexPoisoned(err.to_string())
    }
}

/// 入站方法调用的失败类型，会原样返回给调用方。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MethodError {
    /// 参数结构不符合预期。
    ///
    /// `message` 是面向应用的固定文本，直接作为错误信息返回。
    #[error("{message}")]
    InvalidArgs {
        /// 可读的错误描述。
        message: String,
    },

    /// 桥接层不处理该方法名。
    #[error("方法 '{method}' 未实现")]
    NotImplemented {
        /// 被请求的方法名。
        method: String,
    },
}

impl MethodError {
    /// 在方法通道上使用的稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgs { .. } => "invalid_args",
            Self::NotImplemented { .. } => "not_implemented",
        }
    }
}

/// 获取封面时可能发生的错误。
///
/// 这些错误不会传递给 `update` 的调用方：获取器只记录日志，
/// 然后以“没有封面”完成本次解析。
#[derive(Debug, Error)]
pub enum ArtworkError {
    /// URL 无法解析，或使用了不支持的 scheme。
    #[error("不支持的封面 URL: {0}")]
    UnsupportedUrl(String),

    /// 服务器返回了非成功的状态码。
    #[error("封面请求返回 HTTP {0}")]
    HttpStatus(u16),

    /// 传输层失败。
    ///
    /// 封装了来自 `reqwest` 的错误。
    #[error("封面请求失败: {0}")]
    Http(#[from] reqwest::Error),

    /// 获取操作未能在时限内完成。
    #[error("封面获取超时 ({0:?})")]
    Timeout(Duration),

    /// 数据超过了配置的大小上限。
    ///
    /// `size` 是检测到超限时已知的字节数，可能小于完整的响应体。
    #[error("封面数据大小 ({size} 字节) 超过了 {limit} 字节的上限")]
    TooLarge {
        /// 已知的数据大小（字节）。
        size: usize,
        /// 配置的上限（字节）。
        limit: usize,
    },

    /// 数据为空。
    #[error("封面数据为空")]
    Empty,

    /// 数据不是可以解码的图片。
    ///
    /// 封装了来自 `image` 库的 `ImageError`，截断或损坏的数据也归于此类。
    #[error("封面解码失败: {0}")]
    Decode(#[from] image::ImageError),

    /// `data:` URL 中的 base64 无效。
    #[error("data URL 中的 base64 无效: {0}")]
    Base64(#[from] base64::DecodeError),

    /// 读取本地文件失败。
    #[error("封面读取失败: {0}")]
    Io(#[from] std::io::Error),

    /// 阻塞解码任务被取消或发生了 panic。
    #[error("封面解码任务失败: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// 本库统一的 `Result` 类型别名。
pub type Result<T> = std::result::Result<T, BridgeError>;
