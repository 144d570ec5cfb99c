use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use url::Url;

use super::fetcher::ARTWORK_FETCH_TIMEOUT;
use crate::error::ArtworkError;

/// 加载封面 URL 背后的原始数据。
#[async_trait]
pub trait ArtworkSource: Send + Sync + 'static {
    /// 获取 `url` 处的编码图片。
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ArtworkError>;
}

/// 把 `raw` 解析为默认数据源能够加载的 URL。
///
/// 无法解析的字符串和不支持的 scheme 返回 `None`。
pub fn parse_artwork_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    match url.scheme() {
        "http" | "https" | "file" | "data" => Some(url),
        _ => None,
    }
}

/// 默认数据源：通过 `reqwest` 获取 HTTP(S)，从磁盘读取 `file:`，
/// 以及解码内联的 base64 `data:` URL。
///
/// 三种来源都在把数据读入内存之前检查 `max_bytes`，
/// 超限的封面不会被完整缓冲。
pub struct UrlArtworkSource {
    client: reqwest::Client,
    max_bytes: usize,
}

impl UrlArtworkSource {
    /// 创建 HTTP 客户端。
    pub fn new(user_agent: &str, max_bytes: usize) -> Result<Self, ArtworkError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(ARTWORK_FETCH_TIMEOUT)
            .build()?;
        Ok(Self { client, max_bytes })
    }

    fn too_large(&self, size: u64) -> ArtworkError {
        ArtworkError::TooLarge {
            size: usize::try_from(size).unwrap_or(usize::MAX),
            limit: self.max_bytes,
        }
    }

    async fn fetch_http(&self, url: &Url) -> Result<Vec<u8>, ArtworkError> {
        let mut response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArtworkError::HttpStatus(status.as_u16()));
        }
        if let Some(length) = response.content_length()
            && length > self.max_bytes as u64
        {
            return Err(self.too_large(length));
        }

        // 没有 Content-Length（或者它不可信）时，边读边检查累计大小
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let received = body.len() + chunk.len();
            if received > self.max_bytes {
                log::debug!(
                    "[Artwork Source] '{url}' 在读取到 {received} 字节时超过上限，停止读取。"
                );
                return Err(self.too_large(received as u64));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    async fn fetch_file(&self, url: &Url) -> Result<Vec<u8>, ArtworkError> {
        let path = url
            .to_file_path()
            .map_err(|()| ArtworkError::UnsupportedUrl(url.to_string()))?;
        let length = tokio::fs::metadata(&path).await?.len();
        if length > self.max_bytes as u64 {
            return Err(self.too_large(length));
        }
        Ok(tokio::fs::read(path).await?)
    }

    /// 解码 `data:[<mediatype>];base64,<payload>`。
    ///
    /// 只有 base64 负载才能承载二进制图片，其他编码一律拒绝。
    fn decode_data_url(&self, url: &Url) -> Result<Vec<u8>, ArtworkError> {
        let unsupported = || ArtworkError::UnsupportedUrl(url.to_string());
        let (meta, payload) = url.path().split_once(',').ok_or_else(unsupported)?;
        if !meta.ends_with(";base64") {
            return Err(unsupported());
        }
        let payload = payload.trim();
        let decoded_len = payload.len() / 4 * 3;
        if decoded_len > self.max_bytes {
            return Err(self.too_large(decoded_len as u64));
        }
        Ok(BASE64.decode(payload)?)
    }
}

#[async_trait]
impl ArtworkSource for UrlArtworkSource {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ArtworkError> {
        match url.scheme() {
            "http" | "https" => self.fetch_http(url).await,
            "file" => self.fetch_file(url).await,
            "data" => self.decode_data_url(url),
            _ => Err(ArtworkError::UnsupportedUrl(url.to_string())),
        }
    }
}
