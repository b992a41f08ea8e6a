use crate::core::{Frame, LoopOffset, Packet, TrackPosition, TrackType};
use crate::player::demuxer::{DemuxerMessage, PacketAck};
use crate::player::object::{Mailbox, ObjectBase, ObjectId, PipelineObject};
use crate::player::renderer::RendererMessage;
use crate::player::source::{Codec, DecodedFrame};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::process;
use std::thread;

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

pub enum DecoderMessage {
    Packet(Packet),
    /// Demuxer 已经读完，队列里排在最后
    FinalPacket,
    /// Renderer 处理完一帧，source_id 为产生该帧的解码器
    FrameProcessed { source_id: ObjectId },
}

/// 单条轨道的解码器：包 → 帧
///
/// 发给 Renderer 但还没被确认的帧数不超过预算，超过时暂停解码。
pub struct StreamDecoder {
    base: ObjectBase,
    track_type: TrackType,
    codec: Box<dyn Codec>,
    abs_seek_pos: TrackPosition,
    frame_budget: u32,
    pending_frames: u32,
    /// None 表示结束标记
    packets: VecDeque<Option<Packet>>,
    last_loop_offset: LoopOffset,
    renderer: Mailbox<RendererMessage>,
    demuxer: Mailbox<DemuxerMessage>,
}

impl StreamDecoder {
    pub fn new(
        base: ObjectBase,
        track_type: TrackType,
        codec: Box<dyn Codec>,
        abs_seek_pos: TrackPosition,
        frame_budget: u32,
        renderer: Mailbox<RendererMessage>,
        demuxer: Mailbox<DemuxerMessage>,
    ) -> Self {
        debug!(
            "{} 🎬 创建 {} 解码器 #{}: seek_pos={} budget={}",
            log_ctx(),
            track_type,
            base.id(),
            abs_seek_pos,
            frame_budget
        );

        Self {
            base,
            track_type,
            codec,
            abs_seek_pos,
            frame_budget,
            pending_frames: 0,
            packets: VecDeque::new(),
            last_loop_offset: LoopOffset::default(),
            renderer,
            demuxer,
        }
    }

    pub fn pending_frames(&self) -> u32 {
        self.pending_frames
    }

    fn on_frame_found(&mut self, decoded: DecodedFrame, loop_offset: LoopOffset) {
        let frame = Frame {
            source_id: self.base.id(),
            track_type: self.track_type,
            pts: decoded.pts,
            duration: decoded.duration,
            loop_offset,
            payload: decoded.payload,
        };

        // seek 目标之前就结束的帧不占预算，直接丢弃
        if frame.is_outdated(self.abs_seek_pos) {
            debug!(
                "{} 🗑️  丢弃过期帧: {} abs_end={} seek_pos={}",
                log_ctx(),
                self.track_type,
                frame.absolute_end(),
                self.abs_seek_pos
            );
            return;
        }

        self.pending_frames += 1;
        self.renderer.post(RendererMessage::Frame(frame));
    }

    fn decode_packet(&mut self, packet: Packet) {
        match self.codec.decode(&packet) {
            Ok(frames) => {
                for frame in frames {
                    self.on_frame_found(frame, packet.loop_offset);
                }
            }
            Err(e) => {
                warn!("{} ⚠️  {} 解码失败，跳过该包: {}", log_ctx(), self.track_type, e);
            }
        }

        self.last_loop_offset = packet.loop_offset;
        self.demuxer.post(DemuxerMessage::PacketProcessed(PacketAck::from(&packet)));
    }

    fn drain(&mut self) {
        match self.codec.flush() {
            Ok(frames) => {
                let loop_offset = self.last_loop_offset;
                for frame in frames {
                    self.on_frame_found(frame, loop_offset);
                }
            }
            Err(e) => {
                warn!("{} ⚠️  {} 解码器 flush 失败: {}", log_ctx(), self.track_type, e);
            }
        }

        info!("{} 🏁 {} 解码器 #{} 解码完成", log_ctx(), self.track_type, self.base.id());
        self.base.set_at_end();
        self.renderer.post(RendererMessage::FinalFrame { source_id: self.base.id() });
    }
}

impl PipelineObject for StreamDecoder {
    type Message = DecoderMessage;

    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn handle_message(&mut self, message: DecoderMessage) {
        match message {
            DecoderMessage::Packet(packet) => self.packets.push_back(Some(packet)),
            DecoderMessage::FinalPacket => self.packets.push_back(None),
            DecoderMessage::FrameProcessed { source_id } => {
                if source_id == self.base.id() {
                    self.pending_frames = self.pending_frames.saturating_sub(1);
                }
            }
        }
    }

    fn can_do_next_step(&self) -> bool {
        self.base.can_step() && !self.packets.is_empty() && self.pending_frames < self.frame_budget
    }

    fn do_next_step(&mut self) {
        match self.packets.pop_front() {
            Some(Some(packet)) => self.decode_packet(packet),
            Some(None) => self.drain(),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PlayerError, Result, SubtitleFrame, FramePayload, TrackDuration};
    use crate::player::object::{Doorbell, Envelope};
    use crossbeam_channel::{bounded, unbounded, Receiver};

    /// 每个包解出一帧；data 为空时解码失败
    struct OneToOne;

    impl Codec for OneToOne {
        fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedFrame>> {
            if packet.data.is_empty() {
                return Err(PlayerError::Decode("corrupt".to_string()));
            }
            Ok(vec![DecodedFrame {
                pts: packet.pts,
                duration: packet.duration,
                payload: FramePayload::Subtitle(SubtitleFrame::default()),
            }])
        }

        fn flush(&mut self) -> Result<Vec<DecodedFrame>> {
            Ok(Vec::new())
        }
    }

    struct Harness {
        decoder: StreamDecoder,
        renderer: Receiver<Envelope<RendererMessage>>,
        demuxer: Receiver<Envelope<DemuxerMessage>>,
        _bell: Receiver<()>,
    }

    fn harness(seek_pos: TrackPosition, budget: u32) -> Harness {
        let (events_tx, _events_rx) = unbounded();
        let (bell_tx, bell) = bounded(1);
        let (renderer_mb, renderer) = Mailbox::channel(Doorbell::new(bell_tx.clone()));
        let (demuxer_mb, demuxer) = Mailbox::channel(Doorbell::new(bell_tx));
        let decoder = StreamDecoder::new(
            ObjectBase::new(5, events_tx),
            TrackType::Video,
            Box::new(OneToOne),
            seek_pos,
            budget,
            renderer_mb,
            demuxer_mb,
        );
        Harness { decoder, renderer, demuxer, _bell: bell }
    }

    fn packet(ms: i64) -> Packet {
        Packet {
            source_id: 1,
            track_type: TrackType::Video,
            stream_index: 0,
            pts: TrackPosition::from_millis(ms),
            duration: TrackDuration::from_millis(40),
            loop_offset: LoopOffset::default(),
            size: 100,
            data: vec![0; 100],
        }
    }

    fn frames(rx: &Receiver<Envelope<RendererMessage>>) -> Vec<Frame> {
        rx.try_iter()
            .filter_map(|e| match e {
                Envelope::Message(RendererMessage::Frame(frame)) => Some(frame),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_frame_budget_blocks_decoding() {
        let mut h = harness(TrackPosition::ZERO, 2);
        for i in 0..4 {
            h.decoder.handle_message(DecoderMessage::Packet(packet(i * 40)));
        }

        while h.decoder.can_do_next_step() {
            h.decoder.do_next_step();
        }
        assert_eq!(frames(&h.renderer).len(), 2);
        assert_eq!(h.decoder.pending_frames(), 2);

        // 其他解码器的回执不影响预算
        h.decoder.handle_message(DecoderMessage::FrameProcessed { source_id: 42 });
        assert!(!h.decoder.can_do_next_step());

        h.decoder.handle_message(DecoderMessage::FrameProcessed { source_id: 5 });
        assert!(h.decoder.can_do_next_step());
        h.decoder.do_next_step();
        assert_eq!(frames(&h.renderer).len(), 1);
    }

    #[test]
    fn test_frames_before_seek_position_are_dropped() {
        let mut h = harness(TrackPosition::from_millis(100), 8);
        for i in 0..5 {
            h.decoder.handle_message(DecoderMessage::Packet(packet(i * 40)));
        }
        while h.decoder.can_do_next_step() {
            h.decoder.do_next_step();
        }

        let pts: Vec<i64> = frames(&h.renderer).iter().map(|f| f.pts.as_millis()).collect();
        // 80ms 帧覆盖 100ms，保留
        assert_eq!(pts, vec![80, 120, 160]);
        assert_eq!(h.decoder.pending_frames(), 3);
        // 每个包都有回执
        assert_eq!(h.demuxer.try_iter().count(), 5);
    }

    #[test]
    fn test_decode_error_skips_packet_but_acks() {
        let mut h = harness(TrackPosition::ZERO, 8);
        let mut corrupt = packet(40);
        corrupt.data.clear();
        h.decoder.handle_message(DecoderMessage::Packet(packet(0)));
        h.decoder.handle_message(DecoderMessage::Packet(corrupt));
        h.decoder.handle_message(DecoderMessage::Packet(packet(80)));
        while h.decoder.can_do_next_step() {
            h.decoder.do_next_step();
        }

        assert_eq!(frames(&h.renderer).len(), 2);
        assert_eq!(h.demuxer.try_iter().count(), 3);
    }

    #[test]
    fn test_final_packet_flushes_and_ends() {
        let mut h = harness(TrackPosition::ZERO, 8);
        h.decoder.handle_message(DecoderMessage::Packet(packet(0)));
        h.decoder.handle_message(DecoderMessage::FinalPacket);
        while h.decoder.can_do_next_step() {
            h.decoder.do_next_step();
        }

        assert!(h.decoder.base().is_at_end());
        let messages: Vec<_> = h.renderer.try_iter().collect();
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[1], Envelope::Message(RendererMessage::FinalFrame { source_id: 5 })));
    }
}
