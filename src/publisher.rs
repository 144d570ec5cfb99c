use crate::{
    api::{
        NowPlayingInfo, PlaybackStateUpdate, PlaybackStatus, UNKNOWN_ALBUM, UNKNOWN_ARTIST,
        UNKNOWN_TITLE,
    },
    artwork::{Artwork, ArtworkCache},
    platform::NowPlayingDisplay,
};

/// 把播放状态写入系统的“正在播放”区域。
///
/// 每次 [`publish`](Self::publish) 都整体替换显示内容；
/// [`patch_artwork`](Self::patch_artwork) 只替换封面，其余字段保持不变。
pub struct NowPlayingPublisher {
    display: Box<dyn NowPlayingDisplay>,
    cache: ArtworkCache,
    fallback_artwork: Option<Artwork>,
    /// 最近一次写入的字段集合，在无法从系统读回显示内容时使用。
    last_written: Option<NowPlayingInfo>,
}

impl NowPlayingPublisher {
    /// 创建发布器。
    ///
    /// 初始封面先从 `cache` 中查找；缓存里没有更新所指 URL 的封面时，
    /// 显示 `fallback_artwork`。
    pub fn new(
        display: Box<dyn NowPlayingDisplay>,
        cache: ArtworkCache,
        fallback_artwork: Option<Artwork>,
    ) -> Self {
        Self {
            display,
            cache,
            fallback_artwork,
            last_written: None,
        }
    }

    /// 为 `update` 构建字段集合，但不写入显示。
    ///
    /// 缺失的文本字段使用占位符，缺失或无效的数值按 0 处理。
    pub fn render(&self, update: &PlaybackStateUpdate) -> NowPlayingInfo {
        let artwork = update
            .image_url
            .as_deref()
            .and_then(|url| self.cache.get(url))
            .or_else(|| self.fallback_artwork.clone());

        NowPlayingInfo {
            title: update
                .title
                .clone()
                .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            artist: update
                .artist
                .clone()
                .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            album: update
                .album
                .clone()
                .unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
            duration: non_negative(update.duration),
            elapsed: non_negative(update.position),
            playback_rate: if update.is_playing { 1.0 } else { 0.0 },
            artwork,
        }
    }

    /// 用 `update` 的状态替换显示内容，然后设置播放或暂停状态。
    pub fn publish(&mut self, update: &PlaybackStateUpdate) {
        let info = self.render(update);
        log::debug!(
            "[Publisher] 正在播放: '{}' - '{}' ({:.1}/{:.1}s, 速率 {}, 封面: {})",
            info.artist,
            info.title,
            info.elapsed,
            info.duration,
            info.playback_rate,
            info.artwork.as_ref().map_or("无", Artwork::origin)
        );

        self.display.set_now_playing(Some(&info));
        self.display.set_playback_status(if update.is_playing {
            PlaybackStatus::Playing
        } else {
            PlaybackStatus::Paused
        });
        self.last_written = Some(info);
    }

    /// 清空显示内容并把播放状态标记为已停止。可以重复调用。
    pub fn clear(&mut self) {
        log::debug!("[Publisher] 清除正在播放信息。");
        self.display.set_now_playing(None);
        self.display.set_playback_status(PlaybackStatus::Stopped);
        self.last_written = None;
    }

    /// 只替换当前显示内容中的封面。
    ///
    /// 没有可以修改的内容时（例如在 [`clear`](Self::clear) 之后）不写入，
    /// 返回 `false`；封面与当前相同时同样返回 `false`。
    pub fn patch_artwork(&mut self, artwork: Artwork) -> bool {
        let Some(mut info) = self
            .display
            .now_playing()
            .or_else(|| self.last_written.clone())
        else {
            log::debug!("[Publisher] 当前没有显示内容，丢弃封面 '{}'。", artwork.origin());
            return false;
        };

        if info.artwork.as_ref() == Some(&artwork) {
            return false;
        }

        log::debug!("[Publisher] 更新封面为 '{}'。", artwork.origin());
        info.artwork = Some(artwork);
        self.display.set_now_playing(Some(&info));
        self.last_written = Some(info);
        true
    }
}

fn non_negative(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0).max(0.0)
}
