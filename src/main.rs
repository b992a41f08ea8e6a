use anyhow::{Context, Result};
use log::{info, warn};
use myy_sync::player::{PassthroughCodecFactory, RecordingSink, SyntheticContainer};
use myy_sync::{PlaybackConfig, PlaybackEngine, PlayerEvent, TrackDuration, TrackType};
use std::time::{Duration, Instant};

/// 用法: myy_sync [config.json] [循环次数]
fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("🎬 MYY Sync - 合成片段播放演示");

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) if path != "-" => {
            let json = std::fs::read_to_string(&path).with_context(|| format!("读取配置失败: {}", path))?;
            PlaybackConfig::from_json(&json).with_context(|| format!("解析配置失败: {}", path))?
        }
        _ => PlaybackConfig::default(),
    };
    let loops: i32 = match args.next() {
        Some(value) => value.parse().with_context(|| format!("无效的循环次数: {}", value))?,
        None => 1,
    };

    let container = SyntheticContainer::builder(TrackDuration::from_millis(2000))
        .video(TrackDuration::from_millis(40))
        .audio(TrackDuration::from_millis(20))
        .subtitle(TrackDuration::from_millis(500))
        .build();

    let mut engine = PlaybackEngine::new(Box::new(container), Box::new(PassthroughCodecFactory::new()), config)?;
    let events = engine.events();

    let video = RecordingSink::new();
    let audio = RecordingSink::new().with_latency(Duration::from_millis(30));
    let (video_log, audio_log) = (video.log(), audio.log());
    engine.set_sink(TrackType::Video, Some(video.into_shared()));
    engine.set_sink(TrackType::Audio, Some(audio.into_shared()));
    engine.set_loops(loops);

    let started = Instant::now();
    engine.play();

    let mut finished = false;
    while !finished {
        engine.wait_for_events(Duration::from_millis(100));

        for event in events.try_iter() {
            match event {
                PlayerEvent::EndOfStream => finished = true,
                PlayerEvent::Error { kind, message } => {
                    warn!("❌ 播放错误 ({:?}): {}", kind, message);
                    finished = true;
                }
                other => info!("📣 {:?}", other),
            }
        }

        if started.elapsed() > Duration::from_secs(60) {
            warn!("⚠️  等待播放结束超时");
            break;
        }
    }

    info!(
        "✅ 播放完成: 用时 {:?}, 视频 {} 帧, 音频 {} 帧, 位置 {} ms",
        started.elapsed(),
        video_log.len(),
        audio_log.len(),
        engine.current_position().as_millis()
    );
    Ok(())
}
