use std::thread;

use serde_json::Value;
use tokio::{
    runtime::Runtime,
    sync::{mpsc, oneshot},
};
use tokio_util::sync::CancellationToken;

use crate::{
    api::RemoteCommand,
    artwork::ArtworkCompletion,
    bridge::BridgeCore,
    error::{BridgeError, MethodError, Result},
    remote::CommandSink,
};

/// 工作线程事件循环处理的所有事件，按到达顺序处理。
pub(crate) enum WorkerEvent {
    /// 来自 [`BridgeHandle`](crate::BridgeHandle) 的方法调用，结果通过 `reply` 返回。
    Call {
        method: String,
        args: Value,
        reply: oneshot::Sender<std::result::Result<(), MethodError>>,
    },
    /// 由远程命令路由器翻译好的系统传输信号。
    Remote(RemoteCommand),
    /// I/O 运行时上完成的一次封面解析。
    Artwork(ArtworkCompletion),
}

/// 把其他线程上产生的工作投递到工作线程的队列中。
///
/// 系统回调和封面任务都运行在别的线程上，它们只能通过这里回到串行上下文。
#[derive(Clone)]
pub(crate) struct Dispatcher {
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl Dispatcher {
    pub(crate) fn new(event_tx: mpsc::UnboundedSender<WorkerEvent>) -> Self {
        Self { event_tx }
    }

    pub(crate) fn post_artwork(&self, completion: ArtworkCompletion) {
        if self.event_tx.send(WorkerEvent::Artwork(completion)).is_err() {
            log::trace!("[Worker] 工作线程已停止，丢弃封面解析结果。");
        }
    }
}

impl CommandSink for Dispatcher {
    fn emit(&self, command: RemoteCommand) {
        if self.event_tx.send(WorkerEvent::Remote(command)).is_err() {
            log::debug!(
                "[Worker] 工作线程已停止，丢弃远程命令 '{}'。",
                command.method()
            );
        }
    }
}

/// 所有桥接状态所在的串行上下文。
///
/// 方法调用、远程命令和封面解析结果按入队顺序逐个处理，
/// 因此 [`BridgeCore`] 不需要任何锁。
pub(crate) struct BridgeWorker {
    core: BridgeCore,
    event_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    shutdown: CancellationToken,
}

impl BridgeWorker {
    pub(crate) fn new(
        core: BridgeCore,
        event_rx: mpsc::UnboundedReceiver<WorkerEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            core,
            event_rx,
            shutdown,
        }
    }

    async fn main_event_loop(&mut self) {
        loop {
            tokio::select! {
                // 关闭信号优先于队列中的工作
                biased;

                () = self.shutdown.cancelled() => {
                    log::debug!("[Worker] 收到关闭信号，退出事件循环。");
                    break;
                }

                event = self.event_rx.recv() => {
                    let Some(event) = event else {
                        log::debug!("[Worker] 事件队列已关闭，退出事件循环。");
                        break;
                    };
                    self.handle_event(event);
                }
            }
        }
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Call {
                method,
                args,
                reply,
            } => {
                log::trace!("[Worker] 处理方法调用 '{method}'。");
                let result = self.core.handle(&method, &args);
                if let Err(e) = &result {
                    log::debug!("[Worker] 方法 '{method}' 被拒绝: {} ({e})", e.code());
                }
                if reply.send(result).is_err() {
                    log::trace!("[Worker] 方法 '{method}' 的调用方在收到回复之前已离开。");
                }
            }
            WorkerEvent::Remote(command) => self.core.on_remote_command(command),
            WorkerEvent::Artwork(completion) => {
                self.core.on_artwork_resolved(completion);
            }
        }
    }
}

/// 启动后台工作线程。
///
/// `runtime` 在新线程上驱动事件循环；`io_runtime` 承载封面获取任务，
/// 事件循环退出后随之关闭。
pub(crate) fn start_worker_thread(
    mut worker: BridgeWorker,
    runtime: Runtime,
    io_runtime: Runtime,
) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("nowplaying_bridge_worker".to_string())
        .spawn(move || {
            log::info!("[Worker] 工作线程已启动。");
            runtime.block_on(worker.main_event_loop());

            // 先释放平台后端，再关闭封面运行时
            drop(worker);
            io_runtime.shutdown_background();
            log::info!("[Worker] 工作线程已停止。");
        })
        .map_err(|e| BridgeError::WorkerThread(e.to_string()))
}
