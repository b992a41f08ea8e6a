use crate::core::{
    LoopOffset, Packet, PlaybackConfig, PlayerError, TrackDuration, TrackPosition, TrackType,
};
use crate::player::decoder::DecoderMessage;
use crate::player::object::{EngineEvent, Mailbox, ObjectBase, PipelineObject};
use crate::player::source::{RawPacket, SharedContainer};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::process;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 解码器处理完一个包后的回执
#[derive(Debug, Clone, Copy)]
pub struct PacketAck {
    pub source_id: u64,
    pub stream_index: usize,
    pub duration: TrackDuration,
    pub size: usize,
    pub absolute_end: TrackPosition,
}

impl From<&Packet> for PacketAck {
    fn from(packet: &Packet) -> Self {
        Self {
            source_id: packet.source_id,
            stream_index: packet.stream_index,
            duration: packet.duration,
            size: packet.size,
            absolute_end: packet.absolute_end(),
        }
    }
}

pub enum DemuxerMessage {
    PacketProcessed(PacketAck),
}

/// 每条激活流的缓冲统计（只在 Demuxer 线程内访问）
#[derive(Debug)]
struct StreamData {
    track_type: TrackType,
    duration_ceiling: Option<TrackPosition>,
    buffered_duration: TrackDuration,
    buffered_size: usize,
    max_sent_pos: TrackPosition,
    max_processed_pos: TrackPosition,
    data_limit_reached: bool,
}

impl StreamData {
    fn update_limit_flag(&mut self, config: &PlaybackConfig) {
        let max_duration = config.max_buffered_duration();
        let pos_diff = self.max_sent_pos - self.max_processed_pos;
        self.data_limit_reached = self.buffered_duration >= max_duration
            || (self.buffered_duration == TrackDuration::ZERO && pos_diff >= max_duration)
            || self.buffered_size >= config.max_buffered_size;
    }
}

/// 创建 Demuxer 需要的参数
pub struct DemuxerSetup {
    /// 循环内起始位置
    pub position: TrackPosition,
    pub seek_pending: bool,
    pub loop_offset: LoopOffset,
    /// 与引擎共享，运行中修改立即生效
    pub loops: Arc<AtomicI32>,
    /// 每种轨道：(流索引, 对应 StreamDecoder 的邮箱)
    pub decoders: Vec<(TrackType, usize, Mailbox<DecoderMessage>)>,
}

/// 解封装器：读取容器，把包分发给各轨道的 StreamDecoder
///
/// 任何一条流的缓冲超过上限时暂停读取，直到解码器回执释放缓冲。
pub struct Demuxer {
    base: ObjectBase,
    container: SharedContainer,
    config: PlaybackConfig,
    seekable: bool,
    media_duration: TrackDuration,

    seeked: bool,
    pos_in_loop: TrackPosition,
    loop_offset: LoopOffset,
    loops: Arc<AtomicI32>,
    max_packets_end: TrackPosition,

    streams: HashMap<usize, StreamData>,
    decoders: HashMap<TrackType, Mailbox<DecoderMessage>>,

    buffered: bool,
    first_packet_found: bool,
    retry_count: u32,
    retry_at: Option<Instant>,
    failed: bool,
}

impl Demuxer {
    pub fn new(base: ObjectBase, container: SharedContainer, config: PlaybackConfig, setup: DemuxerSetup) -> Self {
        let (seekable, media_duration, duration_from_streams, stream_durations) = {
            let reader = container.lock();
            let info = reader.media_info();
            let durations: HashMap<usize, i64> =
                info.streams.iter().map(|s| (s.index, s.raw_duration_us)).collect();
            (info.seekable, info.duration, info.duration_from_streams, durations)
        };

        info!(
            "{} 📦 创建 Demuxer #{}: pos={} loop_start={} loop_index={} loops={}",
            log_ctx(),
            base.id(),
            setup.position,
            setup.loop_offset.loop_start,
            setup.loop_offset.index,
            setup.loops.load(Ordering::Acquire)
        );

        let mut streams = HashMap::new();
        let mut decoders = HashMap::new();
        for (track_type, stream_index, mailbox) in setup.decoders {
            debug!("{} 📦 激活流 {} ({})", log_ctx(), stream_index, track_type);

            // 只有时长来自流头估计时才检查流时长上限
            let duration_ceiling = match stream_durations.get(&stream_index) {
                Some(&raw) if duration_from_streams && raw > 0 => Some(TrackPosition::from_micros(raw)),
                _ => None,
            };

            streams.insert(
                stream_index,
                StreamData {
                    track_type,
                    duration_ceiling,
                    buffered_duration: TrackDuration::ZERO,
                    buffered_size: 0,
                    max_sent_pos: TrackPosition::ZERO,
                    max_processed_pos: TrackPosition::ZERO,
                    data_limit_reached: false,
                },
            );
            decoders.insert(track_type, mailbox);
        }

        Self {
            base,
            container,
            config,
            seekable,
            media_duration,
            // 没有显式 seek 请求时不 seek 到 0
            seeked: !setup.seek_pending && setup.position == TrackPosition::ZERO,
            pos_in_loop: setup.position,
            loop_offset: setup.loop_offset,
            loops: setup.loops,
            max_packets_end: TrackPosition::ZERO,
            streams,
            decoders,
            buffered: false,
            first_packet_found: false,
            retry_count: 0,
            retry_at: None,
            failed: false,
        }
    }

    fn ensure_seeked(&mut self) {
        if std::mem::replace(&mut self.seeked, true) {
            return;
        }
        if !self.seekable {
            return;
        }

        debug!("{} 🎯 Demuxer seek 到循环内 {}", log_ctx(), self.pos_in_loop);
        let result = self.container.lock().seek(self.pos_in_loop);

        if let Err(e) = result {
            warn!("{} ⚠️  Seek 失败: pos={} err={}", log_ctx(), self.pos_in_loop, e);

            // 时长未知的流 seek 到 0 失败可以忽略
            if self.pos_in_loop != TrackPosition::ZERO || self.media_duration > TrackDuration::ZERO {
                self.fail(PlayerError::Resource(format!("Seek 失败: {}", e)));
            }
        }
    }

    fn fail(&mut self, error: PlayerError) {
        error!("{} ❌ Demuxer #{} 停止: {}", log_ctx(), self.base.id(), error);
        self.failed = true;
        self.base.emit_error(error);
    }

    fn is_within_stream_duration(&self, packet: &RawPacket) -> bool {
        match self.streams.get(&packet.stream_index).and_then(|s| s.duration_ceiling) {
            Some(ceiling) => packet.pts <= ceiling,
            None => true,
        }
    }

    fn on_loop_end(&mut self) {
        self.loop_offset.index += 1;

        let loops = self.loops.load(Ordering::Acquire);
        if loops >= 0 && self.loop_offset.index >= loops {
            info!(
                "{} 🏁 Demuxer #{} 解封装完成（循环 {} 次）",
                log_ctx(),
                self.base.id(),
                self.loop_offset.index
            );

            if !std::mem::replace(&mut self.buffered, true) {
                self.base.emit(EngineEvent::PacketsBuffered { id: self.base.id() });
            }
            // 一个包都没读到时也要让 Renderer 启动，否则结束标记无法被消费
            if !std::mem::replace(&mut self.first_packet_found, true) {
                self.base.emit(EngineEvent::FirstPacketFound {
                    id: self.base.id(),
                    position: self.pos_in_loop + self.loop_offset.loop_start.as_duration(),
                });
            }

            self.base.set_at_end();
            for decoder in self.decoders.values() {
                decoder.post(DecoderMessage::FinalPacket);
            }
            return;
        }

        // 开始下一轮循环
        self.seeked = false;
        self.pos_in_loop = TrackPosition::ZERO;
        self.loop_offset.loop_start = self.max_packets_end;
        self.max_packets_end = TrackPosition::ZERO;

        self.ensure_seeked();

        info!(
            "{} 🔁 Demuxer 进入新循环: index={} offset={}",
            log_ctx(),
            self.loop_offset.index,
            self.loop_offset.loop_start
        );
    }

    fn on_read_error(&mut self, error: PlayerError) {
        warn!("{} ⚠️  读取失败: {}", log_ctx(), error);

        if error.is_transient() && self.retry_count < self.config.demuxer_max_retries {
            self.retry_count += 1;
            self.retry_at = Some(Instant::now() + self.config.demuxer_retry_interval());
            debug!("{} 🔄 第 {} 次重试", log_ctx(), self.retry_count);
            return;
        }

        self.fail(PlayerError::Resource(format!("解封装失败: {}", error)));
    }

    fn on_packet(&mut self, raw: RawPacket) {
        self.retry_count = 0;
        self.retry_at = None;

        let id = self.base.id();
        let loop_offset = self.loop_offset;
        let Some(stream) = self.streams.get_mut(&raw.stream_index) else {
            // 未激活的流直接丢弃
            return;
        };

        let packet = Packet {
            source_id: id,
            track_type: stream.track_type,
            stream_index: raw.stream_index,
            pts: raw.pts,
            duration: raw.duration,
            loop_offset,
            size: raw.size(),
            data: raw.data,
        };

        let end = packet.absolute_end();
        self.max_packets_end = self.max_packets_end.max(end);

        stream.buffered_duration += packet.duration;
        stream.buffered_size += packet.size;
        stream.max_sent_pos = stream.max_sent_pos.max(end);
        stream.update_limit_flag(&self.config);

        if !self.buffered && stream.data_limit_reached {
            self.buffered = true;
            debug!("{} 📦 轨道 {} 缓冲已满", log_ctx(), stream.track_type);
            self.base.emit(EngineEvent::PacketsBuffered { id });
        }

        if !self.first_packet_found {
            self.first_packet_found = true;
            self.base.emit(EngineEvent::FirstPacketFound {
                id,
                position: self.pos_in_loop + self.loop_offset.loop_start.as_duration(),
            });
        }

        if let Some(decoder) = self.decoders.get(&packet.track_type) {
            decoder.post(DecoderMessage::Packet(packet));
        }
    }

    fn on_packet_processed(&mut self, ack: PacketAck) {
        if ack.source_id != self.base.id() {
            return;
        }

        if let Some(stream) = self.streams.get_mut(&ack.stream_index) {
            stream.buffered_duration -= ack.duration;
            stream.buffered_size = stream.buffered_size.saturating_sub(ack.size);
            stream.max_processed_pos = stream.max_processed_pos.max(ack.absolute_end);
            stream.update_limit_flag(&self.config);
        }
    }
}

impl PipelineObject for Demuxer {
    type Message = DemuxerMessage;

    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn handle_message(&mut self, message: DemuxerMessage) {
        match message {
            DemuxerMessage::PacketProcessed(ack) => self.on_packet_processed(ack),
        }
    }

    /// 暂停、结束、失败、没有激活的流、或任一流缓冲已满时等待
    fn can_do_next_step(&self) -> bool {
        self.base.can_step()
            && !self.failed
            && !self.streams.is_empty()
            && !self.streams.values().any(|s| s.data_limit_reached)
    }

    fn next_step_time(&self, now: Instant) -> Instant {
        self.retry_at.unwrap_or(now)
    }

    fn do_next_step(&mut self) {
        self.ensure_seeked();
        if self.failed {
            return;
        }

        let result = self.container.lock().read_packet();
        match result {
            Ok(Some(packet)) if self.is_within_stream_duration(&packet) => self.on_packet(packet),
            Ok(_) => self.on_loop_end(),
            Err(e) => self.on_read_error(e),
        }
    }
}
