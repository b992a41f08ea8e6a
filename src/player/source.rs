use crate::core::{
    Frame, FramePayload, MediaInfo, Packet, Result, StreamInfo, TrackDuration, TrackPosition,
    TrackType,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// 容器读取器读出的原始包（还没有打上循环偏移和来源 id）
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub stream_index: usize,
    pub track_type: TrackType,
    pub pts: TrackPosition,
    pub duration: TrackDuration,
    pub data: Vec<u8>,
}

impl RawPacket {
    /// 用于缓冲统计的字节数（空包按 1 字节计，保证计数能归零）
    pub fn size(&self) -> usize {
        self.data.len().max(1)
    }
}

/// 容器读取器抽象接口
///
/// 不同的媒体源（本地文件、网络流、内存流等）实现这个接口。
/// 同一个读取器会被先后创建的多个 Demuxer 复用（seek / 切换轨道时重建 Demuxer），
/// 所以以 `SharedContainer` 的形式共享。
pub trait ContainerReader: Send {
    fn media_info(&self) -> &MediaInfo;

    /// 读取下一个包
    ///
    /// 返回：
    /// - Ok(Some(packet)): 成功读取一个包
    /// - Ok(None): 到达文件末尾
    /// - Err(PlayerError::TransientIo): 暂时无数据，可以重试
    /// - Err(e): 其他读取错误
    fn read_packet(&mut self) -> Result<Option<RawPacket>>;

    /// Seek 到指定位置（向前找最近的关键帧）
    fn seek(&mut self, position: TrackPosition) -> Result<()>;

    /// 获取描述信息（用于调试）
    fn description(&self) -> String {
        "container".to_string()
    }
}

pub type SharedContainer = Arc<Mutex<Box<dyn ContainerReader>>>;

/// 解码器输出的一帧（还没有打上循环偏移和来源 id）
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub pts: TrackPosition,
    pub duration: TrackDuration,
    pub payload: FramePayload,
}

/// 单条流的解码器
pub trait Codec: Send {
    /// 解码一个包，可能输出零帧或多帧
    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedFrame>>;

    /// 清空解码器，取出剩余帧
    fn flush(&mut self) -> Result<Vec<DecodedFrame>>;
}

/// 解码器工厂：创建失败视为格式错误
pub trait CodecFactory: Send + Sync {
    fn create(&self, stream: &StreamInfo) -> Result<Box<dyn Codec>>;
}

/// 输出端对一帧的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Presented,
    /// 输出端忙（例如音频缓冲已满），稍后重试
    Retry(Duration),
}

/// 帧输出端（视频窗口、音频设备、字幕层）
pub trait FrameSink: Send {
    fn present(&mut self, frame: &Frame) -> SinkStatus;

    /// 输出延迟：音频设备里尚未播放的缓冲时长
    fn latency(&self) -> Duration {
        Duration::ZERO
    }

    fn on_playback_rate_changed(&mut self, _rate: f32) {}

    /// Renderer 被销毁时调用（seek / 停止 / 切换轨道）
    fn on_flush(&mut self) {}
}

pub type SharedSink = Arc<Mutex<dyn FrameSink>>;
