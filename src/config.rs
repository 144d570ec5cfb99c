use std::path::PathBuf;

use serde::Deserialize;

use crate::artwork::{Artwork, DEFAULT_CACHE_CAPACITY};

/// 单张封面数据的默认大小上限 (20 MiB)。
pub const DEFAULT_MAX_ARTWORK_BYTES: usize = 20 * 1024 * 1024;

/// [`MediaBridge`](crate::MediaBridge) 的启动配置。
///
/// 每个字段都有默认值，因此 `{}` 就是一份有效的 JSON 配置。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// 内存中保留的封面数量。
    pub artwork_cache_capacity: u64,
    /// 超过该大小（字节）的封面数据会被丢弃。
    pub max_artwork_bytes: usize,
    /// 没有可用封面时显示的图片，通常是应用图标。
    pub fallback_artwork: Option<PathBuf>,
    /// 出站命令通道的容量。
    pub outbound_capacity: usize,
    /// 封面 I/O 运行时的工作线程数。
    pub io_worker_threads: usize,
    /// HTTP 封面请求携带的 `User-Agent`。
    pub user_agent: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            artwork_cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_artwork_bytes: DEFAULT_MAX_ARTWORK_BYTES,
            fallback_artwork: None,
            outbound_capacity: 32,
            io_worker_threads: 2,
            user_agent: concat!("nowplaying-bridge/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl BridgeConfig {
    /// 解析 JSON 配置文档。
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// 从磁盘加载 [`fallback_artwork`](Self::fallback_artwork) 并完整解码。
    ///
    /// 文件缺失、无法读取或不是完整的图片时记录警告并返回 `None`，
    /// 此时桥接在获取到封面之前不显示任何图片。
    pub fn load_fallback_artwork(&self) -> Option<Artwork> {
        let path = self.fallback_artwork.as_ref()?;
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!(
                    "[Config] 无法读取后备封面 '{}': {e}",
                    path.display()
                );
                return None;
            }
        };
        match Artwork::decode(path.display().to_string(), bytes) {
            Ok(artwork) => {
                log::debug!(
                    "[Config] 已加载后备封面 '{}' ({}x{})。",
                    path.display(),
                    artwork.width(),
                    artwork.height()
                );
                Some(artwork)
            }
            Err(e) => {
                log::warn!(
                    "[Config] 后备封面 '{}' 不是可用的图片: {e}",
                    path.display()
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::{png_bytes, truncated_png_bytes};

    #[test]
    fn empty_document_gives_defaults() {
        let config = BridgeConfig::from_json_str("{}").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.artwork_cache_capacity, 64);
        assert_eq!(config.max_artwork_bytes, 20 * 1024 * 1024);
        assert_eq!(config.outbound_capacity, 32);
        assert!(config.user_agent.starts_with("nowplaying-bridge/"));
    }

    #[test]
    fn partial_document_overrides_only_named_fields() {
        let config = BridgeConfig::from_json_str(
            r#"{ "artwork_cache_capacity": 4, "fallback_artwork": "/opt/app/icon.png" }"#,
        )
        .unwrap();
        assert_eq!(config.artwork_cache_capacity, 4);
        assert_eq!(config.fallback_artwork, Some(PathBuf::from("/opt/app/icon.png")));
        assert_eq!(config.io_worker_threads, 2);
    }

    #[test]
    fn fallback_artwork_loads_from_disk() {
        let path = std::env::temp_dir().join(format!("nowplaying-icon-{}.png", std::process::id()));
        std::fs::write(&path, png_bytes(3, 2)).unwrap();

        let config = BridgeConfig {
            fallback_artwork: Some(path.clone()),
            ..Default::default()
        };
        let artwork = config.load_fallback_artwork().unwrap();
        assert_eq!(artwork.size(), (3, 2));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unusable_fallback_is_skipped() {
        let missing = BridgeConfig {
            fallback_artwork: Some(PathBuf::from("/definitely/not/here.png")),
            ..Default::default()
        };
        assert!(missing.load_fallback_artwork().is_none());
        assert!(BridgeConfig::default().load_fallback_artwork().is_none());

        // 头部完整但数据被截断的图片同样不可用
        let path = std::env::temp_dir().join(format!("nowplaying-cut-{}.png", std::process::id()));
        std::fs::write(&path, truncated_png_bytes()).unwrap();
        let truncated = BridgeConfig {
            fallback_artwork: Some(path.clone()),
            ..Default::default()
        };
        assert!(truncated.load_fallback_artwork().is_none());
        std::fs::remove_file(&path).unwrap();
    }
}
