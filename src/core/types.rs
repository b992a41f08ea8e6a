use crate::core::time::{LoopOffset, TrackDuration, TrackPosition};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 轨道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Video,
    Audio,
    Subtitle,
}

impl TrackType {
    pub const COUNT: usize = 3;
    pub const ALL: [TrackType; TrackType::COUNT] = [TrackType::Video, TrackType::Audio, TrackType::Subtitle];

    /// 用作按轨道类型索引的数组下标
    pub const fn index(self) -> usize {
        match self {
            TrackType::Video => 0,
            TrackType::Audio => 1,
            TrackType::Subtitle => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackType::Video => "video",
            TrackType::Audio => "audio",
            TrackType::Subtitle => "subtitle",
        }
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    RGBA,
    RGB,
    YUV420P,
    NV12,
}

/// 音频采样格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
    I16,
}

/// 视频图像数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,      // CPU 内存数据
}

/// 音频缓冲数据
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    pub data: Vec<f32>,     // 统一使用 f32 格式
}

/// 字幕数据，空文本表示清除当前字幕
#[derive(Debug, Clone, Default)]
pub struct SubtitleFrame {
    pub text: String,
}

/// 解码后的负载
#[derive(Debug, Clone)]
pub enum FramePayload {
    Video(VideoFrame),
    Audio(AudioFrame),
    Subtitle(SubtitleFrame),
}

/// 压缩数据包：由 Demuxer 创建，交给 StreamDecoder 后在解码或 flush 时销毁
#[derive(Debug, Clone)]
pub struct Packet {
    pub source_id: u64,         // 产生它的 Demuxer 的对象 id
    pub track_type: TrackType,
    pub stream_index: usize,
    pub pts: TrackPosition,     // 循环内时间戳
    pub duration: TrackDuration,
    pub loop_offset: LoopOffset,
    pub size: usize,            // 字节数估计
    pub data: Vec<u8>,
}

impl Packet {
    pub fn end(&self) -> TrackPosition {
        self.pts + self.duration
    }

    pub fn absolute_end(&self) -> TrackPosition {
        self.end() + self.loop_offset.loop_start.as_duration()
    }
}

/// 解码帧：由 StreamDecoder 创建，交给 Renderer 后在渲染或丢弃时销毁
#[derive(Debug, Clone)]
pub struct Frame {
    pub source_id: u64,         // 产生它的 StreamDecoder 的对象 id
    pub track_type: TrackType,
    pub pts: TrackPosition,     // 循环内时间戳
    pub duration: TrackDuration,
    pub loop_offset: LoopOffset,
    pub payload: FramePayload,
}

impl Frame {
    pub fn end(&self) -> TrackPosition {
        self.pts + self.duration
    }

    pub fn absolute_pts(&self) -> TrackPosition {
        self.pts + self.loop_offset.loop_start.as_duration()
    }

    pub fn absolute_end(&self) -> TrackPosition {
        self.end() + self.loop_offset.loop_start.as_duration()
    }

    /// 帧是否在 pos 之前（含 pos）就已经结束；零时长帧按起点判断
    pub fn is_outdated(&self, pos: TrackPosition) -> bool {
        if self.duration > TrackDuration::ZERO {
            self.absolute_end() <= pos
        } else {
            self.absolute_pts() < pos
        }
    }
}

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// 单条流的信息（由容器读取器提供）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: usize,               // 容器内的流索引
    pub track_type: TrackType,
    pub codec: String,
    pub is_default: bool,
    pub raw_duration_us: i64,       // 流头里的时长，可能缺失（0）或非法（负数）
    pub tag_duration: Option<TrackDuration>,  // 元数据标签 DURATION
}

impl StreamInfo {
    /// 流时长：流头时长合法时使用，否则回退到元数据标签
    pub fn effective_duration(&self) -> Option<TrackDuration> {
        if self.raw_duration_us > 0 {
            return Some(TrackDuration::from_micros(self.raw_duration_us));
        }
        if self.raw_duration_us < 0 {
            warn!(
                "⚠️  流 {} 时长 {} 非法，改用元数据中的时长",
                self.index, self.raw_duration_us
            );
        }
        self.tag_duration
    }
}

/// 媒体信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration: TrackDuration,    // 所有流时长的最大值
    pub seekable: bool,
    pub duration_from_streams: bool,  // 时长是否由流头估计（决定是否检查流时长上限）
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    /// 由流列表构建，时长取各流有效时长的最大值
    pub fn from_streams(streams: Vec<StreamInfo>, seekable: bool, duration_from_streams: bool) -> Self {
        let duration = streams
            .iter()
            .filter_map(StreamInfo::effective_duration)
            .max()
            .unwrap_or(TrackDuration::ZERO);

        Self {
            duration,
            seekable,
            duration_from_streams,
            streams,
        }
    }

    /// 指定类型的所有流（按出现顺序）
    pub fn streams_of(&self, track_type: TrackType) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter().filter(move |s| s.track_type == track_type)
    }

    /// 默认轨道：音视频优先 default 标记的流，其次第一条；字幕默认不启用
    pub fn default_track(&self, track_type: TrackType) -> Option<usize> {
        if track_type == TrackType::Subtitle {
            return None;
        }

        let streams: Vec<_> = self.streams_of(track_type).collect();
        streams
            .iter()
            .position(|s| s.is_default)
            .or(if streams.is_empty() { None } else { Some(0) })
    }
}

impl Default for MediaInfo {
    fn default() -> Self {
        Self {
            duration: TrackDuration::ZERO,
            seekable: false,
            duration_from_streams: false,
            streams: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(index: usize, track_type: TrackType, raw: i64, tag: Option<i64>) -> StreamInfo {
        StreamInfo {
            index,
            track_type,
            codec: "test".to_string(),
            is_default: false,
            raw_duration_us: raw,
            tag_duration: tag.map(TrackDuration::from_micros),
        }
    }

    #[test]
    fn test_negative_stream_duration_falls_back_to_tag() {
        let s = stream(0, TrackType::Video, -42, Some(2_000_000));
        assert_eq!(s.effective_duration(), Some(TrackDuration::from_micros(2_000_000)));

        let s = stream(0, TrackType::Video, 0, None);
        assert_eq!(s.effective_duration(), None);
    }

    #[test]
    fn test_media_duration_is_max_of_streams() {
        let info = MediaInfo::from_streams(
            vec![
                stream(0, TrackType::Video, 1_000_000, None),
                stream(1, TrackType::Audio, -1, Some(1_500_000)),
            ],
            true,
            true,
        );
        assert_eq!(info.duration, TrackDuration::from_micros(1_500_000));
    }

    #[test]
    fn test_default_track_selection() {
        let mut second = stream(2, TrackType::Audio, 0, None);
        second.is_default = true;
        let info = MediaInfo::from_streams(
            vec![
                stream(0, TrackType::Video, 0, None),
                stream(1, TrackType::Audio, 0, None),
                second,
                stream(3, TrackType::Subtitle, 0, None),
            ],
            true,
            false,
        );
        assert_eq!(info.default_track(TrackType::Video), Some(0));
        assert_eq!(info.default_track(TrackType::Audio), Some(1));
        assert_eq!(info.default_track(TrackType::Subtitle), None);
    }

    #[test]
    fn test_frame_outdated() {
        let frame = Frame {
            source_id: 1,
            track_type: TrackType::Video,
            pts: TrackPosition::from_millis(40),
            duration: TrackDuration::from_millis(20),
            loop_offset: LoopOffset::new(TrackPosition::from_millis(1000), 1),
            payload: FramePayload::Subtitle(SubtitleFrame::default()),
        };
        assert!(frame.is_outdated(TrackPosition::from_millis(1060)));
        assert!(!frame.is_outdated(TrackPosition::from_millis(1050)));

        let closing = Frame { duration: TrackDuration::ZERO, ..frame };
        assert!(!closing.is_outdated(TrackPosition::from_millis(1040)));
        assert!(closing.is_outdated(TrackPosition::from_millis(1041)));
    }
}
