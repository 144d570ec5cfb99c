//! 封面获取：图片类型、按 URL 索引的有界缓存、可替换的数据源，
//! 以及把它们串起来的异步获取器。

mod cache;
mod fetcher;
mod source;

pub use cache::{ArtworkCache, DEFAULT_CACHE_CAPACITY};
pub use fetcher::{ARTWORK_FETCH_TIMEOUT, ArtworkCompletion, ArtworkFetcher};
pub use source::{ArtworkSource, UrlArtworkSource, parse_artwork_url};

#[cfg(test)]
pub(crate) use fetcher::tests::StubSource;

use std::{
    fmt,
    io::Cursor,
    sync::{Arc, OnceLock},
};

use image::{ImageReader, RgbaImage};

use crate::error::ArtworkError;

/// 一张可以直接显示的封面。
///
/// 保存原始的编码数据以及图片的像素尺寸。像素在第一次调用
/// [`Artwork::render`] 时解码并缓存下来；通过 [`Artwork::decode`]
/// 构建的封面在返回之前就已经完成了解码。克隆共享同一份缓冲区。
#[derive(Clone)]
pub struct Artwork {
    inner: Arc<ArtworkInner>,
}

struct ArtworkInner {
    origin: String,
    width: u32,
    height: u32,
    bytes: Vec<u8>,
    rendered: OnceLock<RgbaImage>,
}

impl Artwork {
    /// 读取图片头部来校验 `bytes`，并得到图片尺寸。
    ///
    /// 只检查头部，截断的数据也可能通过；需要确认图片完整时请使用
    /// [`decode`](Self::decode)。`origin` 记录图片的来源（通常是缓存它的 URL）。
    pub fn from_bytes(
        origin: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, ArtworkError> {
        if bytes.is_empty() {
            return Err(ArtworkError::Empty);
        }
        let (width, height) = ImageReader::new(Cursor::new(bytes.as_slice()))
            .with_guessed_format()?
            .into_dimensions()?;

        Ok(Self {
            inner: Arc::new(ArtworkInner {
                origin: origin.into(),
                width,
                height,
                bytes,
                rendered: OnceLock::new(),
            }),
        })
    }

    /// 完整解码 `bytes`。
    ///
    /// 截断或损坏的数据会返回 [`ArtworkError::Decode`]。解码得到的像素会被保留，
    /// 之后的 [`render`](Self::render) 不会再次解码。这是一个 CPU 密集的操作，
    /// 在异步上下文中应放到 `spawn_blocking` 里执行。
    pub fn decode(origin: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ArtworkError> {
        let artwork = Self::from_bytes(origin, bytes)?;
        artwork.render()?;
        Ok(artwork)
    }

    /// 图片的来源。
    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    /// 像素宽度。
    pub fn width(&self) -> u32 {
        self.inner.width
    }

    /// 像素高度。
    pub fn height(&self) -> u32 {
        self.inner.height
    }

    /// `(宽, 高)`，单位为像素。
    pub fn size(&self) -> (u32, u32) {
        (self.inner.width, self.inner.height)
    }

    /// 收到时的原始编码数据。
    pub fn bytes(&self) -> &[u8] {
        &self.inner.bytes
    }

    /// 解码后的 RGBA 像素，只在第一次使用时解码。
    pub fn render(&self) -> Result<&RgbaImage, ArtworkError> {
        if let Some(rendered) = self.inner.rendered.get() {
            return Ok(rendered);
        }
        let decoded = image::load_from_memory(&self.inner.bytes)?.to_rgba8();
        Ok(self.inner.rendered.get_or_init(|| decoded))
    }
}

impl PartialEq for Artwork {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.origin == other.inner.origin
                && self.size() == other.size()
                && self.inner.bytes == other.inner.bytes)
    }
}

impl fmt::Debug for Artwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artwork")
            .field("origin", &self.inner.origin)
            .field("width", &self.inner.width)
            .field("height", &self.inner.height)
            .field("bytes", &self.inner.bytes.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 90, 255]))
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// 头部完整、像素数据被截断的 PNG：只保留到第一个 IDAT 块开头之后的两个字节。
#[cfg(test)]
pub(crate) fn truncated_png_bytes() -> Vec<u8> {
    let mut bytes = png_bytes(64, 64);
    let idat = bytes.windows(4).position(|w| w == b"IDAT").unwrap();
    bytes.truncate(idat + 4 + 2);
    bytes
}
