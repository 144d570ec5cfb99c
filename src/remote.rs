use std::sync::Arc;

use crate::{
    api::RemoteCommand,
    platform::{CommandStatus, SignalHandler, TransportControls, TransportEvent, TransportSignal},
};

/// 路由后的命令的去处。
///
/// `emit` 在系统投递信号的线程上调用，实现者应当把命令转交给
/// 桥接自己的上下文，而不是就地处理。
pub trait CommandSink: Send + Sync + 'static {
    /// 转发一条命令。
    fn emit(&self, command: RemoteCommand);
}

/// 订阅系统的媒体传输控件，并转发每一个信号。
pub struct RemoteCommandRouter {
    controls: Box<dyn TransportControls>,
    started: bool,
}

impl RemoteCommandRouter {
    /// 包装 `controls`；在调用 [`start`](Self::start) 之前不会订阅任何信号。
    pub fn new(controls: Box<dyn TransportControls>) -> Self {
        Self {
            controls,
            started: false,
        }
    }

    /// [`start`](Self::start) 是否已经执行过。
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// 订阅所有 [`TransportSignal`]，翻译后的命令交给 `sink`。
    ///
    /// 只有第一次调用生效，之后的调用什么也不做。
    pub fn start(&mut self, sink: Arc<dyn CommandSink>) {
        if self.started {
            log::debug!("[Remote Router] 已经订阅过，忽略本次 start。");
            return;
        }
        self.started = true;

        for signal in TransportSignal::ALL {
            self.controls.subscribe(
                signal,
                Arc::new(SignalRoute {
                    signal,
                    sink: Arc::clone(&sink),
                }),
            );
        }
        log::info!(
            "[Remote Router] 已订阅 {} 个传输信号。",
            TransportSignal::ALL.len()
        );
    }
}

/// 把收到的信号翻译为要发出的命令。
///
/// 负载与信号不匹配（例如跳转位置缺失或无效）时返回 `None`。
pub fn command_for(signal: TransportSignal, event: &TransportEvent) -> Option<RemoteCommand> {
    match signal {
        TransportSignal::Play => Some(RemoteCommand::Play),
        TransportSignal::Pause => Some(RemoteCommand::Pause),
        TransportSignal::TogglePlayPause => Some(RemoteCommand::Toggle),
        TransportSignal::NextTrack => Some(RemoteCommand::Next),
        TransportSignal::PreviousTrack => Some(RemoteCommand::Previous),
        TransportSignal::ChangePlaybackPosition => match *event {
            TransportEvent::PlaybackPositionChange { position }
                if position.is_finite() && position >= 0.0 =>
            {
                Some(RemoteCommand::Seek { position })
            }
            _ => None,
        },
    }
}

/// 单个信号的订阅，翻译后交给共享的 [`CommandSink`]。
struct SignalRoute {
    signal: TransportSignal,
    sink: Arc<dyn CommandSink>,
}

impl SignalHandler for SignalRoute {
    fn handle(&self, event: &TransportEvent) -> CommandStatus {
        let Some(command) = command_for(self.signal, event) else {
            log::warn!(
                "[Remote Router] {:?} 携带了无法使用的负载 {event:?}",
                self.signal
            );
            return CommandStatus::CommandFailed;
        };
        log::debug!("[Remote Router] 转发 {:?} -> {}", self.signal, command.method());
        self.sink.emit(command);
        CommandStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::headless::HeadlessControls;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<RemoteCommand>>);

    impl CommandSink for Recorder {
        fn emit(&self, command: RemoteCommand) {
            self.0.lock().unwrap().push(command);
        }
    }

    fn started() -> (RemoteCommandRouter, HeadlessControls, Arc<Recorder>) {
        let controls = HeadlessControls::new();
        let recorder = Arc::new(Recorder::default());
        let mut router = RemoteCommandRouter::new(Box::new(controls.clone()));
        router.start(recorder.clone());
        (router, controls, recorder)
    }

    #[test]
    fn every_signal_is_forwarded() {
        let (_router, controls, recorder) = started();

        for signal in [
            TransportSignal::Play,
            TransportSignal::Pause,
            TransportSignal::TogglePlayPause,
            TransportSignal::NextTrack,
            TransportSignal::PreviousTrack,
        ] {
            assert_eq!(controls.press(signal), Some(CommandStatus::Success));
        }

        let methods: Vec<_> = recorder.0.lock().unwrap().iter().map(RemoteCommand::method).collect();
        assert_eq!(methods, ["play", "pause", "toggle", "next", "previous"]);
    }

    #[test]
    fn seek_carries_the_position() {
        let (_router, controls, recorder) = started();
        let status = controls.fire(
            TransportSignal::ChangePlaybackPosition,
            TransportEvent::PlaybackPositionChange { position: 42.5 },
        );
        assert_eq!(status, Some(CommandStatus::Success));
        assert_eq!(
            *recorder.0.lock().unwrap(),
            [RemoteCommand::Seek { position: 42.5 }]
        );
    }

    #[test]
    fn unusable_seek_payload_fails_without_emitting() {
        let (_router, controls, recorder) = started();

        assert_eq!(
            controls.press(TransportSignal::ChangePlaybackPosition),
            Some(CommandStatus::CommandFailed)
        );
        assert_eq!(
            controls.fire(
                TransportSignal::ChangePlaybackPosition,
                TransportEvent::PlaybackPositionChange { position: f64::NAN },
            ),
            Some(CommandStatus::CommandFailed)
        );
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[test]
    fn start_subscribes_once() {
        let (mut router, controls, recorder) = started();
        assert!(router.is_started());
        assert_eq!(controls.subscription_count(), 6);

        router.start(recorder.clone());
        assert_eq!(controls.subscription_count(), 6);

        controls.press(TransportSignal::Play);
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }
}
