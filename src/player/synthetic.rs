//! 内存中的合成媒体源：演示程序和测试用
//!
//! - `SyntheticContainer`：按固定间隔为每条轨道生成包，可注入读取错误
//! - `PassthroughCodecFactory`：每个包解出一帧，可模拟创建失败和解码延迟
//! - `RecordingSink`：记录所有呈现过的帧

use crate::core::{
    AudioFrame, Frame, FramePayload, MediaInfo, Packet, PixelFormat, PlayerError, Result,
    SampleFormat, StreamInfo, SubtitleFrame, TrackDuration, TrackPosition, TrackType, VideoFrame,
};
use crate::player::source::{
    Codec, CodecFactory, ContainerReader, DecodedFrame, FrameSink, RawPacket, SharedContainer,
    SharedSink, SinkStatus,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct TrackCursor {
    stream_index: usize,
    track_type: TrackType,
    interval: TrackDuration,
    packet_size: usize,
    next_pts: TrackPosition,
    /// 本轨道生成包的终点
    end: TrackPosition,
}

struct TrackSetup {
    track_type: TrackType,
    interval: TrackDuration,
    is_default: bool,
    /// 轨道自己的时长，None 时取容器时长
    duration: Option<TrackDuration>,
}

/// 合成容器
pub struct SyntheticContainer {
    info: MediaInfo,
    tracks: Vec<TrackCursor>,
    packets_read: usize,
    transient_errors: Option<(usize, u32)>,
    fatal_error_at: Option<usize>,
    seeks: Arc<Mutex<Vec<TrackPosition>>>,
}

/// 合成容器的构建器
pub struct SyntheticContainerBuilder {
    duration: TrackDuration,
    tracks: Vec<TrackSetup>,
    seekable: bool,
    overrun: TrackDuration,
    transient_errors: Option<(usize, u32)>,
    fatal_error_at: Option<usize>,
}

impl SyntheticContainerBuilder {
    fn track(mut self, track_type: TrackType, interval: TrackDuration) -> Self {
        self.tracks.push(TrackSetup {
            track_type,
            interval,
            is_default: false,
            duration: None,
        });
        self
    }

    pub fn video(self, interval: TrackDuration) -> Self {
        self.track(TrackType::Video, interval)
    }

    pub fn audio(self, interval: TrackDuration) -> Self {
        self.track(TrackType::Audio, interval)
    }

    pub fn subtitle(self, interval: TrackDuration) -> Self {
        self.track(TrackType::Subtitle, interval)
    }

    /// 把最后添加的轨道标记为 default
    pub fn default_track(mut self) -> Self {
        if let Some(last) = self.tracks.last_mut() {
            last.is_default = true;
        }
        self
    }

    /// 最后添加的轨道在 duration 处结束（流头也声明这个时长）
    pub fn ends_at(mut self, duration: TrackDuration) -> Self {
        if let Some(last) = self.tracks.last_mut() {
            last.duration = Some(duration);
        }
        self
    }

    pub fn seekable(mut self, seekable: bool) -> Self {
        self.seekable = seekable;
        self
    }

    /// 包一直生成到轨道时长 + overrun，但流头里仍声明轨道时长
    pub fn overrun(mut self, overrun: TrackDuration) -> Self {
        self.overrun = overrun;
        self
    }

    /// 读第 at_packet 个包之前先返回 count 次暂时性错误
    pub fn transient_errors(mut self, at_packet: usize, count: u32) -> Self {
        self.transient_errors = Some((at_packet, count));
        self
    }

    /// 读第 at_packet 个包时返回不可恢复的错误
    pub fn fatal_error_at(mut self, at_packet: usize) -> Self {
        self.fatal_error_at = Some(at_packet);
        self
    }

    pub fn build(self) -> SyntheticContainer {
        let streams: Vec<StreamInfo> = self
            .tracks
            .iter()
            .enumerate()
            .map(|(index, setup)| StreamInfo {
                index,
                track_type: setup.track_type,
                codec: format!("synthetic-{}", setup.track_type),
                is_default: setup.is_default,
                raw_duration_us: setup.duration.unwrap_or(self.duration).as_micros(),
                tag_duration: None,
            })
            .collect();

        let tracks = self
            .tracks
            .iter()
            .enumerate()
            .map(|(stream_index, setup)| TrackCursor {
                stream_index,
                track_type: setup.track_type,
                interval: setup.interval,
                packet_size: match setup.track_type {
                    TrackType::Video => 4096,
                    TrackType::Audio => 512,
                    TrackType::Subtitle => 32,
                },
                next_pts: TrackPosition::ZERO,
                end: setup.duration.unwrap_or(self.duration).as_position() + self.overrun,
            })
            .collect();

        SyntheticContainer {
            info: MediaInfo::from_streams(streams, self.seekable, true),
            tracks,
            packets_read: 0,
            transient_errors: self.transient_errors,
            fatal_error_at: self.fatal_error_at,
            seeks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn build_shared(self) -> SharedContainer {
        self.build().into_shared()
    }
}

impl SyntheticContainer {
    pub fn builder(duration: TrackDuration) -> SyntheticContainerBuilder {
        SyntheticContainerBuilder {
            duration,
            tracks: Vec::new(),
            seekable: true,
            overrun: TrackDuration::ZERO,
            transient_errors: None,
            fatal_error_at: None,
        }
    }

    /// 常用片段：25fps 视频 + 20ms 音频包
    pub fn av_clip(duration: TrackDuration) -> Self {
        Self::builder(duration)
            .video(TrackDuration::from_millis(40))
            .audio(TrackDuration::from_millis(20))
            .build()
    }

    /// 所有 seek 请求的记录
    pub fn seek_log(&self) -> Arc<Mutex<Vec<TrackPosition>>> {
        self.seeks.clone()
    }

    pub fn into_shared(self) -> SharedContainer {
        Arc::new(Mutex::new(Box::new(self) as Box<dyn ContainerReader>))
    }
}

impl ContainerReader for SyntheticContainer {
    fn media_info(&self) -> &MediaInfo {
        &self.info
    }

    fn read_packet(&mut self) -> Result<Option<RawPacket>> {
        if let Some((at, remaining)) = self.transient_errors.as_mut() {
            if *at == self.packets_read && *remaining > 0 {
                *remaining -= 1;
                return Err(PlayerError::TransientIo("合成容器：暂时无数据".to_string()));
            }
        }
        if self.fatal_error_at == Some(self.packets_read) {
            return Err(PlayerError::Resource("合成容器：连接已断开".to_string()));
        }

        // 按时间戳交错输出，时间戳相同按流索引
        let Some(cursor) = self
            .tracks
            .iter_mut()
            .filter(|cursor| cursor.next_pts < cursor.end)
            .min_by_key(|cursor| (cursor.next_pts, cursor.stream_index))
        else {
            return Ok(None);
        };

        let pts = cursor.next_pts;
        let duration = cursor.interval.min(cursor.end - pts);
        cursor.next_pts = pts + cursor.interval;
        self.packets_read += 1;

        Ok(Some(RawPacket {
            stream_index: cursor.stream_index,
            track_type: cursor.track_type,
            pts,
            duration,
            data: vec![0u8; cursor.packet_size],
        }))
    }

    fn seek(&mut self, position: TrackPosition) -> Result<()> {
        if !self.info.seekable {
            return Err(PlayerError::Resource("合成容器不支持 seek".to_string()));
        }
        self.seeks.lock().push(position);

        // 向前对齐到包边界（相当于关键帧）
        for cursor in self.tracks.iter_mut() {
            let interval = cursor.interval.as_micros().max(1);
            let aligned = position.as_micros().max(0) / interval * interval;
            cursor.next_pts = TrackPosition::from_micros(aligned);
        }
        Ok(())
    }

    fn description(&self) -> String {
        format!("synthetic({} streams, {})", self.tracks.len(), self.info.duration)
    }
}

/// 直通解码器：每个包解出一帧
pub struct PassthroughCodec {
    track_type: TrackType,
    delay: usize,
    pending: VecDeque<DecodedFrame>,
}

impl PassthroughCodec {
    fn payload(&self, pts: TrackPosition) -> FramePayload {
        match self.track_type {
            TrackType::Video => FramePayload::Video(VideoFrame {
                width: 2,
                height: 2,
                format: PixelFormat::RGBA,
                data: vec![0xff; 16],
            }),
            TrackType::Audio => FramePayload::Audio(AudioFrame {
                sample_rate: 48000,
                channels: 2,
                format: SampleFormat::F32,
                data: vec![0.0; 64],
            }),
            TrackType::Subtitle => FramePayload::Subtitle(SubtitleFrame {
                text: format!("subtitle @ {}ms", pts.as_millis()),
            }),
        }
    }
}

impl Codec for PassthroughCodec {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedFrame>> {
        if packet.data.is_empty() {
            return Err(PlayerError::Decode(format!("空包 pts={}", packet.pts)));
        }

        let frame = DecodedFrame {
            pts: packet.pts,
            duration: packet.duration,
            payload: self.payload(packet.pts),
        };
        self.pending.push_back(frame);

        let mut out = Vec::new();
        while self.pending.len() > self.delay {
            if let Some(frame) = self.pending.pop_front() {
                out.push(frame);
            }
        }
        Ok(out)
    }

    fn flush(&mut self) -> Result<Vec<DecodedFrame>> {
        Ok(self.pending.drain(..).collect())
    }
}

/// 直通解码器工厂
#[derive(Default)]
pub struct PassthroughCodecFactory {
    failing: Vec<TrackType>,
    delay: usize,
}

impl PassthroughCodecFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为该类型的流创建解码器时返回格式错误
    pub fn failing_for(mut self, track_type: TrackType) -> Self {
        self.failing.push(track_type);
        self
    }

    /// 解码器内部缓存 delay 帧，flush 时才全部输出
    pub fn with_delay(mut self, delay: usize) -> Self {
        self.delay = delay;
        self
    }
}

impl CodecFactory for PassthroughCodecFactory {
    fn create(&self, stream: &StreamInfo) -> Result<Box<dyn Codec>> {
        if self.failing.contains(&stream.track_type) {
            return Err(PlayerError::Format(format!(
                "不支持的编码: {} (流 {})",
                stream.codec, stream.index
            )));
        }
        Ok(Box::new(PassthroughCodec {
            track_type: stream.track_type,
            delay: self.delay,
            pending: VecDeque::new(),
        }))
    }
}

/// 一次呈现的记录
#[derive(Debug, Clone)]
pub struct PresentedFrame {
    pub track_type: TrackType,
    pub source_id: u64,
    pub absolute_pts: TrackPosition,
    pub loop_index: i32,
    pub presented_at: Instant,
}

#[derive(Default)]
struct SinkLogInner {
    frames: Vec<PresentedFrame>,
    flushes: usize,
    rates: Vec<f32>,
}

/// `RecordingSink` 的记录，可以在 sink 交给引擎后继续读取
#[derive(Clone, Default)]
pub struct SinkLog {
    inner: Arc<Mutex<SinkLogInner>>,
}

impl SinkLog {
    pub fn frames(&self) -> Vec<PresentedFrame> {
        self.inner.lock().frames.clone()
    }

    pub fn positions(&self) -> Vec<TrackPosition> {
        self.inner.lock().frames.iter().map(|f| f.absolute_pts).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flushes(&self) -> usize {
        self.inner.lock().flushes
    }

    pub fn rates(&self) -> Vec<f32> {
        self.inner.lock().rates.clone()
    }

    pub fn clear(&self) {
        self.inner.lock().frames.clear();
    }
}

/// 记录呈现帧的输出端
pub struct RecordingSink {
    log: SinkLog,
    latency: Duration,
    busy_retries: u32,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            log: SinkLog::default(),
            latency: Duration::ZERO,
            busy_retries: 0,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// 前 n 次 present 返回 Retry
    pub fn with_busy_retries(mut self, retries: u32) -> Self {
        self.busy_retries = retries;
        self
    }

    pub fn log(&self) -> SinkLog {
        self.log.clone()
    }

    pub fn into_shared(self) -> SharedSink {
        Arc::new(Mutex::new(self))
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink for RecordingSink {
    fn present(&mut self, frame: &Frame) -> SinkStatus {
        if self.busy_retries > 0 {
            self.busy_retries -= 1;
            return SinkStatus::Retry(Duration::from_millis(2));
        }

        self.log.inner.lock().frames.push(PresentedFrame {
            track_type: frame.track_type,
            source_id: frame.source_id,
            absolute_pts: frame.absolute_pts(),
            loop_index: frame.loop_offset.index,
            presented_at: Instant::now(),
        });
        SinkStatus::Presented
    }

    fn latency(&self) -> Duration {
        self.latency
    }

    fn on_playback_rate_changed(&mut self, rate: f32) {
        self.log.inner.lock().rates.push(rate);
    }

    fn on_flush(&mut self) {
        self.log.inner.lock().flushes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(container: &mut SyntheticContainer) -> Vec<RawPacket> {
        let mut packets = Vec::new();
        while let Ok(Some(packet)) = container.read_packet() {
            packets.push(packet);
        }
        packets
    }

    #[test]
    fn test_packets_are_interleaved_by_pts() {
        let mut container = SyntheticContainer::av_clip(TrackDuration::from_millis(200));
        let packets = read_all(&mut container);

        assert_eq!(packets.iter().filter(|p| p.track_type == TrackType::Video).count(), 5);
        assert_eq!(packets.iter().filter(|p| p.track_type == TrackType::Audio).count(), 10);
        assert!(packets.windows(2).all(|w| w[0].pts <= w[1].pts));
    }

    #[test]
    fn test_track_can_end_before_container() {
        let mut container = SyntheticContainer::builder(TrackDuration::from_millis(200))
            .video(TrackDuration::from_millis(40))
            .audio(TrackDuration::from_millis(30))
            .ends_at(TrackDuration::from_millis(100))
            .build();
        let info = container.media_info();
        assert_eq!(info.duration, TrackDuration::from_millis(200));
        assert_eq!(info.streams[1].raw_duration_us, 100_000);

        let packets = read_all(&mut container);
        let audio: Vec<_> = packets.iter().filter(|p| p.track_type == TrackType::Audio).collect();
        assert_eq!(audio.len(), 4);
        // 最后一个包截断到轨道终点
        assert_eq!(audio[3].pts, TrackPosition::from_millis(90));
        assert_eq!(audio[3].duration, TrackDuration::from_millis(10));
        assert_eq!(packets.iter().filter(|p| p.track_type == TrackType::Video).count(), 5);
    }

    #[test]
    fn test_seek_aligns_backward() {
        let mut container = SyntheticContainer::builder(TrackDuration::from_millis(1000))
            .video(TrackDuration::from_millis(40))
            .build();
        container.seek(TrackPosition::from_millis(130)).unwrap();
        let packet = container.read_packet().unwrap().unwrap();
        assert_eq!(packet.pts, TrackPosition::from_millis(120));
    }

    #[test]
    fn test_transient_errors_then_packet() {
        let mut container = SyntheticContainer::builder(TrackDuration::from_millis(100))
            .audio(TrackDuration::from_millis(20))
            .transient_errors(1, 2)
            .build();
        assert!(container.read_packet().unwrap().is_some());
        assert!(container.read_packet().unwrap_err().is_transient());
        assert!(container.read_packet().unwrap_err().is_transient());
        assert!(container.read_packet().unwrap().is_some());
    }

    #[test]
    fn test_codec_delay_released_on_flush() {
        let factory = PassthroughCodecFactory::new().with_delay(2);
        let container = SyntheticContainer::av_clip(TrackDuration::from_millis(100));
        let mut codec = factory.create(&container.media_info().streams[0]).unwrap();

        let packet = |ms: i64| Packet {
            source_id: 1,
            track_type: TrackType::Video,
            stream_index: 0,
            pts: TrackPosition::from_millis(ms),
            duration: TrackDuration::from_millis(40),
            loop_offset: Default::default(),
            size: 1,
            data: vec![1],
        };
        assert!(codec.decode(&packet(0)).unwrap().is_empty());
        assert!(codec.decode(&packet(40)).unwrap().is_empty());
        assert_eq!(codec.decode(&packet(80)).unwrap().len(), 1);
        assert_eq!(codec.flush().unwrap().len(), 2);
    }
}
