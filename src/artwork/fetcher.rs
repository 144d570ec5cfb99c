use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{runtime::Handle, time::timeout};
use url::Url;

use super::{Artwork, ArtworkCache, ArtworkSource, parse_artwork_url};
use crate::error::ArtworkError;

/// 单次封面获取的超时时长。
pub const ARTWORK_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// 一次 [`ArtworkFetcher::resolve`] 调用的结果。
///
/// 携带解析开始时捕获的曲目标识，接收方据此判断结果是否仍然有效。
#[derive(Debug, Clone)]
pub struct ArtworkCompletion {
    /// 请求封面的那次更新的曲目 ID。
    pub track_id: Option<String>,
    /// 被解析的 URL。
    pub image_url: Option<String>,
    /// 封面；无法获取时为 `None`。
    pub artwork: Option<Artwork>,
}

/// 封面解析器：先查缓存，再走网络。
///
/// 获取任务运行在构造时传入的 I/O 运行时上。每次调用
/// [`resolve`](Self::resolve) 都会且只会调用一次完成回调。
/// 正在进行中的获取不会被取消，只受 [`ARTWORK_FETCH_TIMEOUT`] 限制。
#[derive(Clone)]
pub struct ArtworkFetcher {
    cache: ArtworkCache,
    source: Arc<dyn ArtworkSource>,
    io: Handle,
    max_bytes: usize,
}

impl ArtworkFetcher {
    /// 创建一个在 `io` 上执行网络任务的获取器。
    pub fn new(
        cache: ArtworkCache,
        source: Arc<dyn ArtworkSource>,
        io: Handle,
        max_bytes: usize,
    ) -> Self {
        Self {
            cache,
            source,
            io,
            max_bytes,
        }
    }

    /// 获取器读取和填充的缓存。
    pub fn cache(&self) -> &ArtworkCache {
        &self.cache
    }

    /// 开始为 `track_id` 解析 `image_url`。
    ///
    /// 缺失或格式错误的 URL 以及缓存命中会在返回之前完成。
    /// 其余情况在后台获取并完整解码：成功时写入缓存，`on_complete`
    /// 在 I/O 运行时上被调用。任何失败都只记录日志，不会重试，也不会写入缓存。
    pub fn resolve<F>(&self, image_url: Option<&str>, track_id: Option<&str>, on_complete: F)
    where
        F: FnOnce(ArtworkCompletion) + Send + 'static,
    {
        let completion = {
            let track_id = track_id.map(str::to_string);
            let image_url = image_url.map(str::to_string);
            move |artwork| ArtworkCompletion {
                track_id,
                image_url,
                artwork,
            }
        };

        let Some(raw_url) = image_url else {
            on_complete(completion(None));
            return;
        };
        let Some(url) = parse_artwork_url(raw_url) else {
            log::debug!("[Artwork Fetcher] 忽略格式错误的封面 URL '{raw_url}'。");
            on_complete(completion(None));
            return;
        };
        if let Some(artwork) = self.cache.get(raw_url) {
            log::trace!("[Artwork Fetcher] 缓存命中 '{raw_url}'。");
            on_complete(completion(Some(artwork)));
            return;
        }

        let fetcher = self.clone();
        let key = raw_url.to_string();
        self.io.spawn(async move {
            let start_time = Instant::now();
            let artwork = match fetcher.fetch_artwork(&url, &key).await {
                Ok(artwork) => {
                    log::trace!(
                        "[Artwork Fetcher] 已获取 '{key}' ({}x{}, {} 字节)，耗时 {:?}",
                        artwork.width(),
                        artwork.height(),
                        artwork.bytes().len(),
                        start_time.elapsed()
                    );
                    fetcher.cache.insert(key, artwork.clone());
                    Some(artwork)
                }
                Err(e) => {
                    log::warn!(
                        "[Artwork Fetcher] 无法加载 '{key}': {e} (耗时 {:?})",
                        start_time.elapsed()
                    );
                    None
                }
            };
            on_complete(completion(artwork));
        });
    }

    async fn fetch_artwork(&self, url: &Url, key: &str) -> Result<Artwork, ArtworkError> {
        let bytes = timeout(ARTWORK_FETCH_TIMEOUT, self.source.fetch(url))
            .await
            .map_err(|_| ArtworkError::Timeout(ARTWORK_FETCH_TIMEOUT))??;

        if bytes.is_empty() {
            return Err(ArtworkError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(ArtworkError::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }

        let origin = key.to_string();
        tokio::task::spawn_blocking(move || Artwork::decode(origin, bytes)).await?
    }
}
