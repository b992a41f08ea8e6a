use crate::core::{Frame, TimeController, TrackPosition, TrackType};
use crate::player::decoder::DecoderMessage;
use crate::player::object::{EngineEvent, Mailbox, ObjectBase, ObjectId, PipelineObject};
use crate::player::source::{SharedSink, SinkStatus};
use log::{debug, info};
use std::collections::VecDeque;
use std::process;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

pub enum RendererMessage {
    Frame(Frame),
    /// 上游解码器已经结束
    FinalFrame { source_id: ObjectId },
    /// 新的上游解码器；在它开始解码之前送达
    SetUpstream { id: ObjectId, mailbox: Mailbox<DecoderMessage> },
    SetSink(SharedSink),
    /// 开始按时钟呈现（引擎时钟的一个副本）
    Start(TimeController),
    SyncSoft { instant: Instant, position: TrackPosition },
    SetPlaybackRate(f32),
    /// 立即呈现一帧（暂停预览 / seek 后刷新画面）
    ForceStep,
}

/// Renderer 与引擎共享的状态，引擎不需要发消息就能读取
#[derive(Debug)]
pub struct RendererShared {
    last_position: AtomicI64,
    seek_position: AtomicI64,
    step_forced: AtomicBool,
}

impl RendererShared {
    fn new(position: TrackPosition) -> Self {
        Self {
            last_position: AtomicI64::new(position.as_micros()),
            seek_position: AtomicI64::new(position.as_micros()),
            step_forced: AtomicBool::new(false),
        }
    }

    /// 已呈现的最大绝对位置
    pub fn last_position(&self) -> TrackPosition {
        TrackPosition::from_micros(self.last_position.load(Ordering::Acquire))
    }

    /// 早于此位置结束的帧视为过期
    pub fn seek_position(&self) -> TrackPosition {
        TrackPosition::from_micros(self.seek_position.load(Ordering::Relaxed))
    }

    pub fn is_step_forced(&self) -> bool {
        self.step_forced.load(Ordering::Acquire)
    }

    /// 标记强制单步；已经在进行中时返回 false
    pub fn request_force_step(&self) -> bool {
        self.step_forced
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// 按时钟把帧交给输出端
///
/// 每个 Renderer 运行在引擎时钟的一个副本上；音频 Renderer 是主时钟，
/// 呈现第一帧后按输出延迟重新校准并通知引擎，其他 Renderer 软同步跟随。
pub struct Renderer {
    base: ObjectBase,
    track_type: TrackType,
    sink: SharedSink,
    clock: TimeController,
    shared: Arc<RendererShared>,
    soft_sync_fixing_time: Duration,

    started: bool,
    is_master: bool,
    needs_master_sync: bool,
    frames: VecDeque<Option<Frame>>,
    upstream: Option<(ObjectId, Mailbox<DecoderMessage>)>,
    explicit_next_time: Option<Instant>,
    last_frame_end: TrackPosition,
    loop_index: i32,
}

impl Renderer {
    pub fn new(
        base: ObjectBase,
        track_type: TrackType,
        sink: SharedSink,
        clock: &TimeController,
        soft_sync_fixing_time: Duration,
    ) -> Self {
        let clock = clock.fork();
        let position = clock.current_position();
        debug!("{} 🖼️  创建 {} Renderer #{}: pos={}", log_ctx(), track_type, base.id(), position);

        Self {
            base,
            track_type,
            sink,
            clock,
            shared: Arc::new(RendererShared::new(position)),
            soft_sync_fixing_time,
            started: false,
            is_master: track_type == TrackType::Audio,
            needs_master_sync: false,
            frames: VecDeque::new(),
            upstream: None,
            explicit_next_time: None,
            last_frame_end: position,
            loop_index: 0,
        }
    }

    pub fn shared(&self) -> Arc<RendererShared> {
        self.shared.clone()
    }

    fn acknowledge(&self, frame: &Frame) {
        if let Some((_, upstream)) = &self.upstream {
            upstream.post(DecoderMessage::FrameProcessed { source_id: frame.source_id });
        }
    }

    /// 来自已被替换的解码器
    fn is_stale_source(&self, source_id: ObjectId) -> bool {
        self.upstream.as_ref().is_some_and(|(id, _)| *id != source_id)
    }

    fn set_upstream(&mut self, id: ObjectId, mailbox: Mailbox<DecoderMessage>) {
        // 已排队的帧继续呈现；旧解码器的结束标记作废，新解码器会重新送达
        if self.frames.iter().any(Option::is_none) {
            debug!("{} 🗑️  {} 丢弃旧解码器的结束标记", log_ctx(), self.track_type);
            self.frames.retain(Option::is_some);
        }
        self.upstream = Some((id, mailbox));
    }

    /// 已排队帧的终点，新帧必须在此之后
    fn queued_end(&self) -> Option<TrackPosition> {
        self.frames.iter().rev().flatten().next().map(Frame::absolute_end)
    }

    fn render(&mut self, frame: Frame) {
        if self.is_stale_source(frame.source_id) {
            return;
        }

        // 新解码器从 seek_position 起重新解码，和队列里的帧重叠的部分丢弃
        let reference = match self.queued_end() {
            Some(end) => end.max(self.shared.seek_position()),
            None => self.shared.seek_position(),
        };
        if frame.is_outdated(reference) {
            debug!(
                "{} 🗑️  {} 帧过期: abs_pts={} ref={}",
                log_ctx(),
                self.track_type,
                frame.absolute_pts(),
                reference
            );
            self.acknowledge(&frame);
            return;
        }
        self.frames.push_back(Some(frame));
    }

    fn on_force_step(&mut self) {
        if self.base.is_at_end() {
            self.set_force_step_done();
        } else {
            self.explicit_next_time = Some(Instant::now());
        }
    }

    fn set_force_step_done(&mut self) -> bool {
        if self
            .shared
            .step_forced
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.explicit_next_time = None;
        self.base.emit(EngineEvent::ForceStepDone { id: self.base.id() });
        true
    }

    /// 主 Renderer：让刚呈现的帧在 now + 输出延迟时刻对齐
    fn synchronize(&mut self, frame: &Frame) {
        let latency = self.sink.lock().latency();
        let instant = Instant::now() + latency;
        let position = frame.absolute_pts();

        self.clock.sync_at(instant, position);
        self.needs_master_sync = false;
        debug!("{} 🕐 主时钟校准: pos={} latency={:?}", log_ctx(), position, latency);
        self.base.emit(EngineEvent::RendererSynchronized {
            id: self.base.id(),
            instant,
            position,
        });
    }

    fn on_frame_presented(&mut self, frame: Frame) {
        let last = self.shared.last_position().max(frame.absolute_pts());
        self.shared.last_position.store(last.as_micros(), Ordering::Release);

        self.last_frame_end = frame.absolute_end();
        self.shared
            .seek_position
            .store(self.last_frame_end.as_micros(), Ordering::Relaxed);

        if frame.loop_offset.index > self.loop_index {
            self.loop_index = frame.loop_offset.index;
            info!(
                "{} 🔁 {} Renderer 进入循环 {} (offset={})",
                log_ctx(),
                self.track_type,
                self.loop_index,
                frame.loop_offset.loop_start
            );
            self.base.emit(EngineEvent::RendererLoopChanged {
                id: self.base.id(),
                offset: frame.loop_offset.loop_start,
                index: self.loop_index,
            });
        }

        if self.is_master && self.needs_master_sync {
            self.synchronize(&frame);
        }

        self.acknowledge(&frame);
    }

    fn on_final_frame_presented(&mut self) {
        let last = self.shared.last_position().max(self.last_frame_end);
        self.shared.last_position.store(last.as_micros(), Ordering::Release);

        info!("{} 🏁 {} Renderer #{} 播放完成", log_ctx(), self.track_type, self.base.id());
        self.base.set_at_end();
        self.base.emit(EngineEvent::RendererAtEnd { id: self.base.id() });
    }
}

impl PipelineObject for Renderer {
    type Message = RendererMessage;

    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn handle_message(&mut self, message: RendererMessage) {
        match message {
            RendererMessage::Frame(frame) => self.render(frame),
            RendererMessage::FinalFrame { source_id } => {
                if !self.is_stale_source(source_id) {
                    self.frames.push_back(None);
                }
            }
            RendererMessage::SetUpstream { id, mailbox } => self.set_upstream(id, mailbox),
            RendererMessage::SetSink(sink) => self.sink = sink,
            RendererMessage::Start(clock) => {
                self.clock = clock;
                self.started = true;
                self.needs_master_sync = self.is_master;
            }
            RendererMessage::SyncSoft { instant, position } => {
                self.clock.sync_soft(instant, position, self.soft_sync_fixing_time);
            }
            RendererMessage::SetPlaybackRate(rate) => {
                self.clock.set_playback_rate(rate);
                self.sink.lock().on_playback_rate_changed(rate);
            }
            RendererMessage::ForceStep => self.on_force_step(),
        }
    }

    fn set_paused(&mut self, paused: bool) {
        self.clock.set_paused(paused);
        self.base.set_paused(paused);
    }

    fn can_do_next_step(&self) -> bool {
        if self.frames.is_empty() || self.base.is_killed() {
            return false;
        }
        if self.shared.is_step_forced() {
            return true;
        }
        self.started && self.base.can_step()
    }

    fn next_step_time(&self, now: Instant) -> Instant {
        if let Some(explicit) = self.explicit_next_time {
            return explicit;
        }

        match self.frames.front() {
            Some(Some(frame)) => self.clock.time_from_position(frame.absolute_pts()),
            Some(None) if self.last_frame_end > TrackPosition::ZERO => {
                self.clock.time_from_position(self.last_frame_end)
            }
            _ => now,
        }
    }

    fn do_next_step(&mut self) {
        self.set_force_step_done();

        let status = match self.frames.front() {
            Some(Some(frame)) => self.sink.lock().present(frame),
            Some(None) => SinkStatus::Presented,
            None => return,
        };

        match status {
            SinkStatus::Presented => {
                self.explicit_next_time = None;
                match self.frames.pop_front() {
                    Some(Some(frame)) => self.on_frame_presented(frame),
                    Some(None) => self.on_final_frame_presented(),
                    None => {}
                }
            }
            SinkStatus::Retry(after) => {
                self.explicit_next_time = Some(Instant::now() + after);
            }
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.sink.lock().on_flush();
    }
}
