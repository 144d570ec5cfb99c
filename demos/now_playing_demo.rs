//! 在内存后端上演示桥接的完整流程：发布、获取封面、系统按钮、清除。
//!
//! ```text
//! RUST_LOG=debug cargo run --example now_playing_demo -- https://example.com/cover.jpg
//! ```

use std::time::Duration;

use nowplaying_bridge::{
    BridgeConfig, MediaBridge,
    platform::{
        TransportEvent, TransportSignal,
        headless::{HeadlessControls, HeadlessDisplay},
    },
};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let image_url = std::env::args().nth(1);
    let config = match std::env::var("NOWPLAYING_CONFIG") {
        Ok(path) => BridgeConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        Err(_) => BridgeConfig::default(),
    };

    let display = HeadlessDisplay::new();
    let controls = HeadlessControls::new();
    let (bridge, mut commands) = MediaBridge::start(display.clone(), controls.clone(), config)?;

    let listener = tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            println!("<- {}", serde_json::to_string(&command).unwrap_or_default());
        }
    });

    bridge
        .update(json!({
            "title": "Blue in Green",
            "artist": "Miles Davis",
            "album": "Kind of Blue",
            "duration": 337.0,
            "position": 12.0,
            "isPlaying": true,
            "id": "kob-3",
            "imageUrl": image_url,
        }))
        .await?;
    println!("-> update 已接受: {:?}", display.info().map(|info| info.title));

    // 等待封面获取完成
    tokio::time::sleep(Duration::from_secs(2)).await;
    match display.info().and_then(|info| info.artwork) {
        Some(artwork) => println!(
            "封面: {} ({}x{}, {} 字节)",
            artwork.origin(),
            artwork.width(),
            artwork.height(),
            artwork.bytes().len()
        ),
        None => println!("封面: 无"),
    }

    controls.press(TransportSignal::Pause);
    controls.fire(
        TransportSignal::ChangePlaybackPosition,
        TransportEvent::PlaybackPositionChange { position: 42.5 },
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    if let Err(e) = bridge.invoke("shuffle", json!({})).await {
        println!("-> shuffle 被拒绝: {e}");
    }

    bridge.clear().await?;
    println!("最终状态: {:?}", display.snapshot().status);

    bridge.shutdown()?;
    listener.await?;
    Ok(())
}
