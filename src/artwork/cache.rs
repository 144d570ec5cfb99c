use moka::{policy::EvictionPolicy, sync::Cache};

use super::Artwork;

/// 内存中默认保留的封面数量。
pub const DEFAULT_CACHE_CAPACITY: u64 = 64;

/// 以图片 URL 为键的线程安全封面缓存。
///
/// 按条目数量限制大小，超出时淘汰最近最少使用的条目。
/// 克隆共享同一份存储，获取器写入、发布器读取用的是同一个缓存。
#[derive(Clone)]
pub struct ArtworkCache {
    entries: Cache<String, Artwork>,
}

impl ArtworkCache {
    /// 创建最多容纳 `capacity` 张封面的缓存。
    pub fn new(capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
        }
    }

    /// 查找 `url` 对应的缓存封面。
    pub fn get(&self, url: &str) -> Option<Artwork> {
        self.entries.get(url)
    }

    /// 以 `url` 为键存入 `artwork`，覆盖已有的条目。
    pub fn insert(&self, url: impl Into<String>, artwork: Artwork) {
        self.entries.insert(url.into(), artwork);
    }

    /// `url` 是否已有缓存的封面。
    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    /// 执行完待处理的淘汰之后，缓存中的封面数量。
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    /// 缓存是否为空。
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ArtworkCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
