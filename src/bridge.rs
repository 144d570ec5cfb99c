use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{
    api::{METHOD_CLEAR, METHOD_UPDATE, OutboundCommand, PlaybackStateUpdate, RemoteCommand},
    artwork::{ArtworkCompletion, ArtworkFetcher},
    error::MethodError,
    publisher::NowPlayingPublisher,
    remote::RemoteCommandRouter,
    worker::Dispatcher,
};

/// 最近一次应用的更新所标识的曲目。
///
/// 解析完成的封面只有在属于同一首曲目时才会显示。如果当前更新
/// 指定了另一个封面 URL，旧 URL 的结果同样会被丢弃；当前更新
/// 没有提供 URL 时，同一曲目之前请求的封面仍然有效。
#[derive(Debug, Clone, Default, PartialEq)]
struct ActiveTrack {
    track_id: Option<String>,
    image_url: Option<String>,
}

impl ActiveTrack {
    fn accepts(&self, completion: &ArtworkCompletion) -> bool {
        self.track_id == completion.track_id
            && self
                .image_url
                .as_deref()
                .is_none_or(|url| Some(url) == completion.image_url.as_deref())
    }
}

/// 媒体命令桥接的状态与分发逻辑。
///
/// 只存在于工作线程上，所有方法都在那里执行，因此
/// [`on_artwork_resolved`](Self::on_artwork_resolved) 中的曲目检查和封面写入
/// 是一个不可分割的步骤。
pub(crate) struct BridgeCore {
    publisher: NowPlayingPublisher,
    fetcher: ArtworkFetcher,
    router: RemoteCommandRouter,
    dispatcher: Dispatcher,
    outbound_tx: mpsc::Sender<OutboundCommand>,
    active: ActiveTrack,
}

impl BridgeCore {
    /// 组装桥接并开始路由远程命令。
    pub(crate) fn new(
        publisher: NowPlayingPublisher,
        fetcher: ArtworkFetcher,
        router: RemoteCommandRouter,
        dispatcher: Dispatcher,
        outbound_tx: mpsc::Sender<OutboundCommand>,
    ) -> Self {
        let mut core = Self {
            publisher,
            fetcher,
            router,
            dispatcher,
            outbound_tx,
            active: ActiveTrack::default(),
        };
        core.router.start(Arc::new(core.dispatcher.clone()));
        core
    }

    /// 处理一次入站方法调用。
    ///
    /// `update` 和 `clear` 之外的方法名返回 [`MethodError::NotImplemented`]，
    /// 不会改变任何状态。
    pub(crate) fn handle(&mut self, method: &str, args: &Value) -> Result<(), MethodError> {
        match method {
            METHOD_UPDATE => {
                let update = PlaybackStateUpdate::from_args(args)?;
                self.apply_update(update);
                Ok(())
            }
            METHOD_CLEAR => {
                self.publisher.clear();
                Ok(())
            }
            other => {
                log::debug!("[Bridge] 未知的方法 '{other}'。");
                Err(MethodError::NotImplemented {
                    method: other.to_string(),
                })
            }
        }
    }

    fn apply_update(&mut self, update: PlaybackStateUpdate) {
        self.active = ActiveTrack {
            track_id: update.track_id.clone(),
            image_url: update.image_url.clone(),
        };
        self.publisher.publish(&update);

        if let Some(image_url) = update.image_url.as_deref() {
            let dispatcher = self.dispatcher.clone();
            self.fetcher
                .resolve(Some(image_url), update.track_id.as_deref(), move |completion| {
                    dispatcher.post_artwork(completion);
                });
        }
    }

    /// 如果解析结果所属的曲目仍然是当前曲目，就把封面写入显示。
    ///
    /// 返回显示内容是否发生了变化。
    pub(crate) fn on_artwork_resolved(&mut self, completion: ArtworkCompletion) -> bool {
        let Some(artwork) = completion.artwork.clone() else {
            log::debug!(
                "[Bridge] {:?} 没有得到封面，保留当前显示。",
                completion.image_url
            );
            return false;
        };
        if !self.active.accepts(&completion) {
            log::debug!(
                "[Bridge] 忽略曲目 {:?} 的过期封面 (当前曲目: {:?})。",
                completion.track_id,
                self.active.track_id
            );
            return false;
        }
        self.publisher.patch_artwork(artwork)
    }

    /// 把路由好的远程命令转发给应用。
    ///
    /// 出站通道已满或已关闭时丢弃该命令并记录警告。
    pub(crate) fn on_remote_command(&self, command: RemoteCommand) {
        match self.outbound_tx.try_send(OutboundCommand::from(command)) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                log::warn!(
                    "[Bridge] 出站通道已满，丢弃命令 '{}'。",
                    dropped.method
                );
            }
            Err(TrySendError::Closed(dropped)) => {
                log::warn!(
                    "[Bridge] 出站通道已关闭，丢弃命令 '{}'。",
                    dropped.method
                );
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn router(&self) -> &RemoteCommandRouter {
        &self.router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::PlaybackStatus,
        artwork::{Artwork, ArtworkCache, StubSource, png_bytes},
        platform::{
            CommandStatus, TransportEvent, TransportSignal,
            headless::{HeadlessControls, HeadlessDisplay},
        },
        worker::WorkerEvent,
    };
    use serde_json::json;
    use tokio::runtime::Handle;

    const COVER_A: &str = "https://img.example/a.png";
    const COVER_B: &str = "https://img.example/b.png";

    struct Harness {
        core: BridgeCore,
        display: HeadlessDisplay,
        controls: HeadlessControls,
        cache: ArtworkCache,
        source: Arc<StubSource>,
        events: mpsc::UnboundedReceiver<WorkerEvent>,
        outbound: mpsc::Receiver<OutboundCommand>,
    }

    impl Harness {
        fn new(fallback: Option<Artwork>) -> Self {
            let display = HeadlessDisplay::new();
            let controls = HeadlessControls::new();
            let cache = ArtworkCache::new(8);
            let source = Arc::new(
                StubSource::default()
                    .with(COVER_A, png_bytes(4, 4))
                    .with(COVER_B, png_bytes(8, 8)),
            );
            let (event_tx, events) = mpsc::unbounded_channel();
            let (outbound_tx, outbound) = mpsc::channel(8);

            let core = BridgeCore::new(
                NowPlayingPublisher::new(Box::new(display.clone()), cache.clone(), fallback),
                ArtworkFetcher::new(cache.clone(), source.clone(), Handle::current(), 1 << 20),
                RemoteCommandRouter::new(Box::new(controls.clone())),
                Dispatcher::new(event_tx),
                outbound_tx,
            );

            Self {
                core,
                display,
                controls,
                cache,
                source,
                events,
                outbound,
            }
        }

        async fn next_completion(&mut self) -> ArtworkCompletion {
            match self.events.recv().await {
                Some(WorkerEvent::Artwork(completion)) => completion,
                _ => panic!("expected an artwork completion"),
            }
        }

        async fn next_remote(&mut self) -> RemoteCommand {
            match self.events.recv().await {
                Some(WorkerEvent::Remote(command)) => command,
                _ => panic!("expected a remote command"),
            }
        }
    }

    fn track(id: &str, image_url: &str) -> Value {
        json!({
            "title": format!("Track {id}"),
            "artist": "Artist",
            "album": "Album",
            "duration": 200.0,
            "position": 1.0,
            "isPlaying": true,
            "id": id,
            "imageUrl": image_url,
        })
    }

    #[tokio::test]
    async fn update_publishes_then_patches_resolved_artwork() {
        let mut h = Harness::new(None);

        h.core.handle("update", &track("a", COVER_A)).unwrap();
        let info = h.display.info().unwrap();
        assert_eq!(info.title, "Track a");
        assert!(info.artwork.is_none());
        assert_eq!(h.display.status(), PlaybackStatus::Playing);

        let completion = h.next_completion().await;
        assert!(h.core.on_artwork_resolved(completion));
        assert_eq!(h.display.artwork_origin().as_deref(), Some(COVER_A));
        assert_eq!(h.display.info().unwrap().title, "Track a");
    }

    #[tokio::test]
    async fn late_artwork_for_a_previous_track_is_ignored() {
        let mut h = Harness::new(None);

        h.core.handle("update", &track("a", COVER_A)).unwrap();
        h.core.handle("update", &track("b", COVER_B)).unwrap();

        // 无论两次获取以什么顺序完成，都只能显示 b 的封面
        for _ in 0..2 {
            let completion = h.next_completion().await;
            let is_b = completion.track_id.as_deref() == Some("b");
            assert_eq!(h.core.on_artwork_resolved(completion), is_b);
        }

        assert_eq!(h.display.artwork_origin().as_deref(), Some(COVER_B));
        assert_eq!(h.display.info().unwrap().title, "Track b");
        // 过期的结果仍然留在缓存里，之后可以复用
        assert!(h.cache.contains(COVER_A));
    }

    #[tokio::test]
    async fn same_track_progress_updates_keep_the_artwork_applicable() {
        let mut h = Harness::new(None);

        h.core.handle("update", &track("a", COVER_A)).unwrap();
        let mut progress = track("a", COVER_A);
        progress["position"] = json!(2.0);
        h.core.handle("update", &progress).unwrap();

        let first = h.next_completion().await;
        let second = h.next_completion().await;
        let applied = [h.core.on_artwork_resolved(first), h.core.on_artwork_resolved(second)];
        assert_eq!(applied.iter().filter(|a| **a).count(), 1);
        assert_eq!(h.display.artwork_origin().as_deref(), Some(COVER_A));
        assert_eq!(h.display.info().unwrap().elapsed, 2.0);
    }

    #[tokio::test]
    async fn same_track_update_without_url_keeps_the_pending_artwork() {
        let mut h = Harness::new(None);

        h.core.handle("update", &track("a", COVER_A)).unwrap();
        let mut progress = track("a", COVER_A);
        progress.as_object_mut().unwrap().remove("imageUrl");
        progress["position"] = json!(5.0);
        h.core.handle("update", &progress).unwrap();

        let completion = h.next_completion().await;
        assert_eq!(completion.image_url.as_deref(), Some(COVER_A));
        assert!(h.core.on_artwork_resolved(completion));
        assert_eq!(h.display.artwork_origin().as_deref(), Some(COVER_A));
        assert_eq!(h.display.info().unwrap().elapsed, 5.0);
        // 第二次更新没有封面 URL，不会发起新的获取
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn same_track_with_a_new_url_drops_the_old_artwork() {
        let mut h = Harness::new(None);

        h.core.handle("update", &track("a", COVER_A)).unwrap();
        h.core.handle("update", &track("a", COVER_B)).unwrap();

        for _ in 0..2 {
            let completion = h.next_completion().await;
            let is_b = completion.image_url.as_deref() == Some(COVER_B);
            assert_eq!(h.core.on_artwork_resolved(completion), is_b);
        }
        assert_eq!(h.display.artwork_origin().as_deref(), Some(COVER_B));
    }

    #[tokio::test]
    async fn cached_artwork_is_shown_immediately_without_refetching() {
        let mut h = Harness::new(None);

        h.core.handle("update", &track("a", COVER_A)).unwrap();
        let completion = h.next_completion().await;
        h.core.on_artwork_resolved(completion);

        h.core.handle("update", &track("a2", COVER_A)).unwrap();
        assert_eq!(h.display.artwork_origin().as_deref(), Some(COVER_A));
        let completion = h.next_completion().await;
        assert!(completion.artwork.is_some());
        assert!(!h.core.on_artwork_resolved(completion));
        assert_eq!(h.source.hits(COVER_A), 1);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_the_fallback() {
        let fallback = Artwork::from_bytes("app-icon", png_bytes(1, 1)).unwrap();
        let mut h = Harness::new(Some(fallback));

        h.core
            .handle("update", &track("x", "https://img.example/missing.png"))
            .unwrap();
        assert_eq!(h.display.artwork_origin().as_deref(), Some("app-icon"));

        let completion = h.next_completion().await;
        assert!(completion.artwork.is_none());
        assert!(!h.core.on_artwork_resolved(completion));
        assert_eq!(h.display.artwork_origin().as_deref(), Some("app-icon"));
    }

    #[tokio::test]
    async fn update_without_image_url_fetches_nothing() {
        let mut h = Harness::new(None);
        h.core
            .handle("update", &json!({ "title": "Radio", "isPlaying": false }))
            .unwrap();
        assert_eq!(h.display.status(), PlaybackStatus::Paused);
        assert_eq!(h.source.total(), 0);
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn invalid_args_leave_state_untouched() {
        let mut h = Harness::new(None);
        h.core.handle("update", &track("a", COVER_A)).unwrap();
        let before = h.display.snapshot();

        let err = h.core.handle("update", &json!(7)).unwrap_err();
        assert_eq!(err.code(), "invalid_args");
        assert_eq!(h.display.snapshot(), before);

        // 当前曲目仍然是 "a"，它的封面照常应用
        let completion = h.next_completion().await;
        assert!(h.core.on_artwork_resolved(completion));
    }

    #[tokio::test]
    async fn unknown_method_is_not_implemented_and_changes_nothing() {
        let mut h = Harness::new(None);
        h.core.handle("update", &track("a", COVER_A)).unwrap();
        let before = h.display.snapshot();

        let err = h.core.handle("shuffle", &json!({ "on": true })).unwrap_err();
        assert_eq!(
            err,
            MethodError::NotImplemented {
                method: "shuffle".into()
            }
        );
        assert_eq!(h.display.snapshot(), before);

        let completion = h.next_completion().await;
        assert!(h.core.on_artwork_resolved(completion));
    }

    #[tokio::test]
    async fn clear_twice_leaves_display_stopped() {
        let mut h = Harness::new(None);
        h.core.handle("update", &track("a", COVER_A)).unwrap();

        for _ in 0..2 {
            h.core.handle("clear", &Value::Null).unwrap();
            assert!(h.display.info().is_none());
            assert_eq!(h.display.status(), PlaybackStatus::Stopped);
        }

        // 清除之后才完成的获取不会让显示重新出现
        let completion = h.next_completion().await;
        assert!(!h.core.on_artwork_resolved(completion));
        assert!(h.display.info().is_none());
    }

    #[tokio::test]
    async fn remote_signals_reach_the_outbound_channel() {
        let mut h = Harness::new(None);
        assert!(h.core.router().is_started());
        assert_eq!(h.controls.subscription_count(), 6);

        let status = h.controls.fire(
            TransportSignal::ChangePlaybackPosition,
            TransportEvent::PlaybackPositionChange { position: 42.5 },
        );
        assert_eq!(status, Some(CommandStatus::Success));

        let command = h.next_remote().await;
        h.core.on_remote_command(command);
        let sent = h.outbound.recv().await.unwrap();
        assert_eq!(sent.method, "seek");
        assert_eq!(sent.arguments, Some(json!({ "position": 42.5 })));
        assert!(h.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_outbound_channel_drops_commands() {
        let h = Harness::new(None);
        for _ in 0..20 {
            h.core.on_remote_command(RemoteCommand::Next);
        }
        let mut outbound = h.outbound;
        let mut received = 0;
        while outbound.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 8);
    }
}
