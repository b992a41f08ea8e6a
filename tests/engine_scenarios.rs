use crossbeam_channel::Receiver;
use myy_sync::player::{PassthroughCodecFactory, RecordingSink, SinkLog, SyntheticContainer};
use myy_sync::{
    ErrorKind, FrameBudget, PlaybackConfig, PlaybackEngine, PlaybackState, PlayerEvent,
    TrackDuration, TrackPosition, TrackType,
};
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(10);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ms(value: i64) -> TrackDuration {
    TrackDuration::from_millis(value)
}

fn pos(value: i64) -> TrackPosition {
    TrackPosition::from_millis(value)
}

fn strictly_increasing(positions: &[TrackPosition]) -> bool {
    positions.windows(2).all(|w| w[0] < w[1])
}

struct Session {
    engine: PlaybackEngine,
    events: Receiver<PlayerEvent>,
    seen: Vec<PlayerEvent>,
    video: SinkLog,
    audio: SinkLog,
    subtitle: SinkLog,
}

impl Session {
    fn new(container: SyntheticContainer, codecs: PassthroughCodecFactory) -> Self {
        Self::with_config(container, codecs, PlaybackConfig::default())
    }

    fn with_config(container: SyntheticContainer, codecs: PassthroughCodecFactory, config: PlaybackConfig) -> Self {
        init_logger();
        let mut engine = PlaybackEngine::new(Box::new(container), Box::new(codecs), config).unwrap();
        let events = engine.events();

        let video = RecordingSink::new();
        let audio = RecordingSink::new();
        let subtitle = RecordingSink::new();
        let (video_log, audio_log, subtitle_log) = (video.log(), audio.log(), subtitle.log());
        engine.set_sink(TrackType::Video, Some(video.into_shared()));
        engine.set_sink(TrackType::Audio, Some(audio.into_shared()));
        engine.set_sink(TrackType::Subtitle, Some(subtitle.into_shared()));

        Self {
            engine,
            events,
            seen: Vec::new(),
            video: video_log,
            audio: audio_log,
            subtitle: subtitle_log,
        }
    }

    fn collect(&mut self) {
        self.seen.extend(self.events.try_iter());
    }

    /// 处理事件直到 cond 成立，超时返回 false
    fn wait_until(&mut self, mut cond: impl FnMut(&Self) -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            self.collect();
            if cond(self) {
                return true;
            }
            if Instant::now() > deadline {
                return false;
            }
            self.engine.wait_for_events(Duration::from_millis(10));
        }
    }

    fn wait_for_event(&mut self, pred: impl Fn(&PlayerEvent) -> bool) -> bool {
        self.wait_until(|s| s.seen.iter().any(&pred))
    }

    fn wait_for_end(&mut self) -> bool {
        self.wait_for_event(|e| *e == PlayerEvent::EndOfStream)
    }

    /// 持续处理事件一段时间
    fn pump(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            self.engine.wait_for_events(Duration::from_millis(10));
        }
        self.collect();
    }

    fn count(&self, pred: impl Fn(&PlayerEvent) -> bool) -> usize {
        self.seen.iter().filter(|e| pred(e)).count()
    }
}

#[test]
fn test_av_clip_plays_to_end_once() {
    let mut s = Session::new(SyntheticContainer::av_clip(ms(400)), PassthroughCodecFactory::new());
    s.engine.play();

    assert!(s.wait_for_end());
    s.pump(Duration::from_millis(200));

    assert_eq!(s.seen[0], PlayerEvent::DurationChanged(ms(400)));
    assert!(s.seen.contains(&PlayerEvent::StateChanged(PlaybackState::Playing)));
    assert!(s.seen.contains(&PlayerEvent::BufferingStarted));
    assert_eq!(s.count(|e| *e == PlayerEvent::EndOfStream), 1);

    assert_eq!(s.engine.state(), PlaybackState::Stopped);
    assert_eq!(s.engine.current_position(), pos(400));
    assert!(s.engine.thread_roles().is_empty());

    assert_eq!(s.video.len(), 10);
    assert_eq!(s.audio.len(), 20);
    assert!(strictly_increasing(&s.video.positions()));
    assert!(strictly_increasing(&s.audio.positions()));
}

#[test]
fn test_video_only_clip_reaches_end() {
    let clip = SyntheticContainer::builder(ms(300)).video(ms(40)).build();
    let mut s = Session::new(clip, PassthroughCodecFactory::new());
    s.engine.play();

    assert!(s.wait_for_end());
    assert_eq!(s.video.len(), 8);
    assert!(s.audio.is_empty());
    assert_eq!(s.video.positions().last(), Some(&pos(280)));
}

#[test]
fn test_looped_playback_keeps_positions_monotonic() {
    let mut s = Session::new(SyntheticContainer::av_clip(ms(300)), PassthroughCodecFactory::new());
    s.engine.set_loops(2);
    assert_eq!(s.engine.loops(), 2);
    s.engine.play();

    assert!(s.wait_for_end());
    s.pump(Duration::from_millis(100));

    assert_eq!(s.count(|e| *e == PlayerEvent::EndOfStream), 1);
    assert!(s.seen.contains(&PlayerEvent::LoopChanged { index: 1 }));
    assert_eq!(s.engine.loop_offset_corrections(), 0);

    let positions = s.video.positions();
    assert_eq!(positions.len(), 16);
    assert!(strictly_increasing(&positions));
    assert_eq!(positions.last(), Some(&pos(580)));

    let second_loop = s.video.frames().iter().filter(|f| f.loop_index == 1).count();
    assert_eq!(second_loop, 8);
}

#[test]
fn test_seek_while_paused_shows_target_frame() {
    let clip = SyntheticContainer::av_clip(ms(1000));
    let seeks = clip.seek_log();
    let mut s = Session::new(clip, PassthroughCodecFactory::new());

    s.engine.play();
    assert!(s.wait_until(|s| s.video.len() >= 3));

    s.engine.pause();
    s.pump(Duration::from_millis(100));
    assert_eq!(s.engine.state(), PlaybackState::Paused);

    s.video.clear();
    s.engine.seek(pos(500));

    // 暂停状态下 seek 后强制呈现一帧
    assert!(s.wait_until(|s| !s.video.is_empty()));
    s.pump(Duration::from_millis(100));
    assert_eq!(s.video.positions(), vec![pos(500)]);
    assert_eq!(s.engine.current_position(), pos(500));
    assert!(seeks.lock().contains(&pos(500)));

    s.engine.play();
    assert!(s.wait_for_end());

    let positions = s.video.positions();
    assert_eq!(positions.first(), Some(&pos(500)));
    assert_eq!(positions.len(), 13);
    assert!(strictly_increasing(&positions));
}

#[test]
fn test_playback_rate_change_keeps_continuity() {
    let mut s = Session::new(SyntheticContainer::av_clip(ms(1000)), PassthroughCodecFactory::new());
    s.engine.play();
    assert!(s.wait_until(|s| s.audio.len() >= 10));

    s.engine.set_playback_rate(2.0);
    s.engine.set_playback_rate(-1.0);
    s.engine.set_playback_rate(f32::NAN);
    assert_eq!(s.engine.playback_rate(), 2.0);

    assert!(s.wait_for_end());
    assert_eq!(s.audio.rates(), vec![2.0]);
    assert_eq!(s.video.rates(), vec![2.0]);

    assert_eq!(s.audio.len(), 50);
    assert_eq!(s.video.len(), 25);
    assert!(strictly_increasing(&s.audio.positions()));
    assert!(strictly_increasing(&s.video.positions()));
}

#[test]
fn test_audio_track_switch_continues_from_current_position() {
    let clip = SyntheticContainer::builder(ms(1000))
        .video(ms(40))
        .audio(ms(20))
        .audio(ms(20))
        .build();
    let mut s = Session::new(clip, PassthroughCodecFactory::new());
    assert_eq!(s.engine.active_track(TrackType::Audio), Some(0));

    s.engine.play();
    assert!(s.wait_until(|s| s.audio.len() >= 10));

    let before = s.engine.current_position();
    let old_source = s.audio.frames()[0].source_id;
    assert!(s.engine.set_active_track(TrackType::Audio, Some(1)));
    assert!(!s.engine.set_active_track(TrackType::Audio, Some(1)));
    assert_eq!(s.engine.active_track(TrackType::Audio), Some(1));

    assert!(s.wait_for_end());

    let switched: Vec<_> = s
        .audio
        .frames()
        .into_iter()
        .filter(|f| f.source_id != old_source)
        .collect();
    assert!(!switched.is_empty());
    // 新轨道从当前位置附近继续，而不是从头开始
    assert!(switched[0].absolute_pts + ms(100) >= before);

    let video = s.video.positions();
    assert!(strictly_increasing(&video));
    assert_eq!(video.last(), Some(&pos(960)));
}

#[test]
fn test_dropping_engine_mid_playback_stops_output() {
    init_logger();
    let mut engine = PlaybackEngine::new(
        Box::new(SyntheticContainer::av_clip(ms(2000))),
        Box::new(PassthroughCodecFactory::new()),
        PlaybackConfig::default(),
    )
    .unwrap();

    let video = RecordingSink::new();
    let log = video.log();
    engine.set_sink(TrackType::Video, Some(video.into_shared()));
    engine.play();

    let deadline = Instant::now() + TIMEOUT;
    while log.len() < 3 && Instant::now() < deadline {
        engine.wait_for_events(Duration::from_millis(10));
    }
    assert!(log.len() >= 3);

    let started = Instant::now();
    drop(engine);
    assert!(started.elapsed() < Duration::from_secs(2));

    let presented = log.len();
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(log.len(), presented);
    assert!(log.flushes() >= 1);
}

#[test]
fn test_unsupported_codec_disables_only_that_track() {
    let mut s = Session::new(
        SyntheticContainer::av_clip(ms(300)),
        PassthroughCodecFactory::new().failing_for(TrackType::Audio),
    );
    s.engine.play();

    assert!(s.wait_for_end());
    assert_eq!(
        s.count(|e| matches!(e, PlayerEvent::Error { kind: ErrorKind::Format, .. })),
        1
    );
    assert_eq!(s.video.len(), 8);
    assert!(s.audio.is_empty());
    assert_eq!(s.engine.state(), PlaybackState::Stopped);
}

#[test]
fn test_resource_error_stops_playback() {
    let clip = SyntheticContainer::builder(ms(1000))
        .video(ms(40))
        .audio(ms(20))
        .fatal_error_at(20)
        .build();
    let mut s = Session::new(clip, PassthroughCodecFactory::new());
    s.engine.play();

    assert!(s.wait_for_event(|e| matches!(e, PlayerEvent::Error { kind: ErrorKind::Resource, .. })));
    s.pump(Duration::from_millis(100));

    assert_eq!(s.engine.state(), PlaybackState::Stopped);
    assert!(s.seen.contains(&PlayerEvent::StateChanged(PlaybackState::Stopped)));
    assert_eq!(s.count(|e| *e == PlayerEvent::EndOfStream), 0);
    assert!(s.engine.current_position() < pos(1000));
}

#[test]
fn test_resource_error_in_later_loop_keeps_position() {
    // 限制预读，让读取错误发生在第二遍播放中
    let config = PlaybackConfig {
        max_buffered_duration_us: 60_000,
        frame_budget: FrameBudget { video: 2, audio: 2, subtitle: 2 },
        ..PlaybackConfig::default()
    };
    let clip = SyntheticContainer::builder(ms(300))
        .video(ms(40))
        .audio(ms(20))
        .fatal_error_at(36)
        .build();
    let mut s = Session::with_config(clip, PassthroughCodecFactory::new(), config);
    s.engine.set_loops(3);
    s.engine.play();

    assert!(s.wait_for_event(|e| matches!(e, PlayerEvent::Error { kind: ErrorKind::Resource, .. })));
    s.pump(Duration::from_millis(100));
    assert!(s.seen.contains(&PlayerEvent::LoopChanged { index: 1 }));
    assert_eq!(s.engine.state(), PlaybackState::Stopped);

    // 停在本遍内的位置，而不是被夹到时长上
    let stopped_at = s.engine.current_position();
    assert!(stopped_at < pos(300));

    s.video.clear();
    s.engine.play();
    assert!(s.wait_until(|s| !s.video.is_empty()));
    let first = s.video.positions()[0];
    assert!(first <= stopped_at);
    assert!(stopped_at < first + ms(40));
    s.engine.stop();
}

#[test]
fn test_end_of_stream_waits_for_longer_video_track() {
    let clip = SyntheticContainer::builder(ms(800))
        .video(ms(40))
        .audio(ms(20))
        .ends_at(ms(200))
        .build();
    let mut s = Session::new(clip, PassthroughCodecFactory::new());
    s.engine.play();

    assert!(s.wait_until(|s| s.audio.len() == 10));
    s.pump(Duration::from_millis(150));
    // 音频已结束，视频还在播
    assert_eq!(s.count(|e| *e == PlayerEvent::EndOfStream), 0);
    assert!(s.video.len() < 20);

    assert!(s.wait_for_end());
    s.pump(Duration::from_millis(100));
    assert_eq!(s.count(|e| *e == PlayerEvent::EndOfStream), 1);
    assert_eq!(s.audio.len(), 10);
    assert_eq!(s.video.len(), 20);
    assert_eq!(s.video.positions().last(), Some(&pos(760)));
    assert_eq!(s.engine.current_position(), pos(800));
}

#[test]
fn test_subtitles_do_not_hold_back_end_of_media() {
    let clip = SyntheticContainer::builder(ms(1000))
        .video(ms(40))
        .ends_at(ms(300))
        .audio(ms(20))
        .ends_at(ms(300))
        .subtitle(ms(100))
        .build();
    let mut s = Session::new(clip, PassthroughCodecFactory::new());
    assert!(s.engine.set_active_track(TrackType::Subtitle, Some(0)));
    s.engine.play();

    assert!(s.wait_for_end());
    s.pump(Duration::from_millis(200));

    assert_eq!(s.count(|e| *e == PlayerEvent::EndOfStream), 1);
    assert_eq!(s.video.len(), 8);
    assert_eq!(s.audio.len(), 15);
    assert!(!s.subtitle.is_empty());
    assert!(s.subtitle.len() < 10);
    assert_eq!(s.engine.state(), PlaybackState::Stopped);
}

#[test]
fn test_subtitle_only_clip_reaches_end() {
    let clip = SyntheticContainer::builder(ms(300)).subtitle(ms(100)).build();
    let mut s = Session::new(clip, PassthroughCodecFactory::new());
    assert!(s.engine.set_active_track(TrackType::Subtitle, Some(0)));
    s.engine.play();

    assert!(s.wait_for_end());
    s.pump(Duration::from_millis(100));
    assert_eq!(s.count(|e| *e == PlayerEvent::EndOfStream), 1);
    assert_eq!(s.subtitle.positions(), vec![pos(0), pos(100), pos(200)]);
    assert!(s.video.is_empty());
}

#[test]
fn test_out_of_range_track_disables_type() {
    let mut s = Session::new(SyntheticContainer::av_clip(ms(300)), PassthroughCodecFactory::new());
    assert!(s.engine.set_active_track(TrackType::Video, Some(5)));
    assert_eq!(s.engine.active_track(TrackType::Video), None);

    s.engine.play();
    assert!(s.wait_for_end());
    assert!(s.video.is_empty());
    assert_eq!(s.audio.len(), 15);
}

#[test]
fn test_unseekable_media_rejects_seek_and_loops() {
    let clip = SyntheticContainer::builder(ms(300))
        .video(ms(40))
        .seekable(false)
        .build();
    let seeks = clip.seek_log();
    let mut s = Session::new(clip, PassthroughCodecFactory::new());
    assert!(!s.engine.is_seekable());

    s.engine.set_loops(3);
    assert_eq!(s.engine.loops(), 1);

    s.engine.seek(pos(100));
    s.engine.play();
    assert!(s.wait_for_end());

    assert!(seeks.lock().is_empty());
    assert_eq!(s.video.positions().first(), Some(&pos(0)));
}

#[test]
fn test_invalid_config_is_rejected() {
    init_logger();
    let config = PlaybackConfig {
        frame_budget: FrameBudget { video: 0, audio: 9, subtitle: 6 },
        ..PlaybackConfig::default()
    };
    let result = PlaybackEngine::new(
        Box::new(SyntheticContainer::av_clip(ms(300))),
        Box::new(PassthroughCodecFactory::new()),
        config,
    );
    assert!(result.is_err());
}
