use crate::core::{
    ErrorKind, LoopOffset, MediaInfo, PlaybackConfig, PlaybackState, PlayerError, Result,
    StreamInfo, TimeController, TrackDuration, TrackPosition, TrackType,
};
use crate::player::decoder::{DecoderMessage, StreamDecoder};
use crate::player::demuxer::{Demuxer, DemuxerMessage, DemuxerSetup};
use crate::player::object::{EngineEvent, Envelope, Mailbox, ObjectBase, ObjectHandle, ObjectId};
use crate::player::renderer::{Renderer, RendererMessage, RendererShared};
use crate::player::source::{CodecFactory, ContainerReader, SharedContainer, SharedSink};
use crate::player::worker::ThreadRegistry;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::process;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

const DEMUXER_ROLE: &str = "demuxer";

fn decoder_role(track_type: TrackType) -> String {
    format!("decoder-{}", track_type)
}

fn renderer_role(track_type: TrackType) -> String {
    format!("renderer-{}", track_type)
}

/// 播放器对外事件
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    DurationChanged(TrackDuration),
    StateChanged(PlaybackState),
    /// 创建了新的 Demuxer，开始缓冲
    BufferingStarted,
    BufferingReady,
    LoopChanged { index: i32 },
    EndOfStream,
    Error { kind: ErrorKind, message: String },
}

struct RendererSlot {
    handle: ObjectHandle<RendererMessage>,
    shared: Arc<RendererShared>,
}

/// 播放引擎：管理 Demuxer / StreamDecoder / Renderer 的创建、连接与销毁
///
/// 引擎本身运行在控制线程上，组件事件通过 `process_events()` / `wait_for_events()` 处理；
/// 对外事件从 `events()` 返回的通道读取。
pub struct PlaybackEngine {
    container: SharedContainer,
    codecs: Box<dyn CodecFactory>,
    config: PlaybackConfig,
    media: MediaInfo,

    /// 每种轨道当前选中的流（在同类流中的序号）
    active_tracks: [Option<usize>; TrackType::COUNT],
    /// 解码器创建失败的轨道，重新选择轨道前不再尝试
    disabled_tracks: [bool; TrackType::COUNT],
    sinks: [Option<SharedSink>; TrackType::COUNT],

    state: PlaybackState,
    clock: TimeController,
    loop_offset: LoopOffset,
    loops: Arc<AtomicI32>,
    seek_pending: bool,
    should_update_time_on_first_packet: bool,

    demuxer: Option<ObjectHandle<DemuxerMessage>>,
    decoders: [Option<ObjectHandle<DecoderMessage>>; TrackType::COUNT],
    renderers: [Option<RendererSlot>; TrackType::COUNT],

    threads: ThreadRegistry,
    threads_dirty: bool,
    next_object_id: ObjectId,
    loop_offset_corrections: usize,

    engine_events_tx: Sender<EngineEvent>,
    engine_events_rx: Receiver<EngineEvent>,
    player_events_tx: Sender<PlayerEvent>,
    player_events_rx: Receiver<PlayerEvent>,
}

impl PlaybackEngine {
    pub fn new(
        container: Box<dyn ContainerReader>,
        codecs: Box<dyn CodecFactory>,
        config: PlaybackConfig,
    ) -> Result<Self> {
        config.validate()?;

        let media = container.media_info().clone();
        info!(
            "{} 🎮 创建播放引擎: {} duration={} seekable={} streams={}",
            log_ctx(),
            container.description(),
            media.duration,
            media.seekable,
            media.streams.len()
        );

        let active_tracks = TrackType::ALL.map(|track_type| media.default_track(track_type));
        let (engine_events_tx, engine_events_rx) = unbounded();
        let (player_events_tx, player_events_rx) = unbounded();

        let engine = Self {
            container: Arc::new(Mutex::new(container)),
            codecs,
            config,
            media,
            active_tracks,
            disabled_tracks: [false; TrackType::COUNT],
            sinks: [None, None, None],
            state: PlaybackState::Stopped,
            clock: TimeController::new(),
            loop_offset: LoopOffset::default(),
            loops: Arc::new(AtomicI32::new(1)),
            seek_pending: false,
            should_update_time_on_first_packet: false,
            demuxer: None,
            decoders: [None, None, None],
            renderers: [None, None, None],
            threads: ThreadRegistry::new(),
            threads_dirty: false,
            next_object_id: 1,
            loop_offset_corrections: 0,
            engine_events_tx,
            engine_events_rx,
            player_events_tx,
            player_events_rx,
        };

        engine.emit(PlayerEvent::DurationChanged(engine.media.duration));
        Ok(engine)
    }

    /// 对外事件通道
    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.player_events_rx.clone()
    }

    pub fn media_info(&self) -> &MediaInfo {
        &self.media
    }

    pub fn duration(&self) -> TrackDuration {
        self.media.duration
    }

    pub fn is_seekable(&self) -> bool {
        self.media.seekable
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn playback_rate(&self) -> f32 {
        self.clock.playback_rate()
    }

    pub fn loops(&self) -> i32 {
        self.loops.load(Ordering::Acquire)
    }

    pub fn active_track(&self, track_type: TrackType) -> Option<usize> {
        self.active_tracks[track_type.index()]
    }

    /// 循环偏移不一致被纠正的次数（正常播放应为 0）
    pub fn loop_offset_corrections(&self) -> usize {
        self.loop_offset_corrections
    }

    /// 当前存活的工作线程角色
    pub fn thread_roles(&self) -> Vec<String> {
        self.threads.roles()
    }

    // ========== 播放控制 ==========

    pub fn play(&mut self) {
        info!("{} ▶️  播放", log_ctx());
        self.set_state(PlaybackState::Playing);
    }

    pub fn pause(&mut self) {
        info!("{} ⏸️  暂停", log_ctx());
        self.set_state(PlaybackState::Paused);
    }

    pub fn stop(&mut self) {
        info!("{} ⏹️  停止", log_ctx());
        self.set_state(PlaybackState::Stopped);
    }

    /// 设置某种轨道的输出端；有无输出端发生变化时重建对象
    pub fn set_sink(&mut self, track_type: TrackType, sink: Option<SharedSink>) {
        let slot = track_type.index();
        let had_sink = self.sinks[slot].is_some();
        self.sinks[slot] = sink.clone();

        match sink {
            Some(sink) if had_sink => {
                if let Some(renderer) = &self.renderers[slot] {
                    renderer.handle.post(RendererMessage::SetSink(sink));
                }
            }
            Some(_) => self.force_update(),
            None if had_sink => self.force_update(),
            None => {}
        }
    }

    pub fn seek(&mut self, position: TrackPosition) {
        if !self.media.seekable {
            warn!("{} ⚠️  媒体不支持 seek，忽略: {}", log_ctx(), position);
            return;
        }

        let position = self.bound_position(position);
        info!("{} 🎯 Seek 到: {} ms", log_ctx(), position.as_millis());

        self.clock.set_paused(true);
        self.clock.sync(self.loop_offset.loop_start + position.as_duration());
        self.seek_pending = true;

        self.force_update();
    }

    pub fn set_playback_rate(&mut self, rate: f32) {
        if !rate.is_finite() || rate <= 0.0 {
            warn!("{} ⚠️  无效的播放速率: {}", log_ctx(), rate);
            return;
        }
        if rate == self.playback_rate() {
            return;
        }

        info!("{} ⏩ 播放速率: {}", log_ctx(), rate);
        self.clock.set_playback_rate(rate);
        for renderer in self.renderers.iter().flatten() {
            renderer.handle.post(RendererMessage::SetPlaybackRate(rate));
        }
    }

    /// 设置循环次数，负数表示无限循环
    pub fn set_loops(&mut self, loops: i32) {
        if !self.media.seekable {
            warn!("{} ⚠️  媒体不支持 seek，无法设置循环", log_ctx());
            return;
        }

        let previous = self.loops.swap(loops, Ordering::AcqRel);
        if previous != loops {
            info!(
                "{} 🔁 循环次数: {} -> {} (当前循环 {})",
                log_ctx(),
                previous,
                loops,
                self.loop_offset.index
            );
        }
    }

    /// 切换轨道；序号超出范围（或 None）表示关闭该类轨道。返回是否发生了变化
    pub fn set_active_track(&mut self, track_type: TrackType, index: Option<usize>) -> bool {
        let count = self.media.streams_of(track_type).count();
        let index = match index {
            Some(i) if i < count => Some(i),
            Some(i) => {
                warn!("{} ⚠️  {} 轨道序号 {} 超出范围（共 {} 条），关闭该轨道", log_ctx(), track_type, i, count);
                None
            }
            None => None,
        };

        let slot = track_type.index();
        if self.active_tracks[slot] == index {
            return false;
        }

        info!("{} 🔀 切换 {} 轨道: {:?} -> {:?}", log_ctx(), track_type, self.active_tracks[slot], index);
        self.active_tracks[slot] = index;
        self.disabled_tracks[slot] = false;

        self.renderers[slot] = None;
        self.decoders = [None, None, None];
        self.demuxer = None;
        self.threads_dirty = true;

        if let Err(e) = self.create_objects_if_needed() {
            self.on_error(e);
        }
        self.update_objects_paused_state();

        // 切换轨道时不调整时钟，依靠 Renderer 里已缓冲的帧弥补 Demuxer 的延迟
        self.should_update_time_on_first_packet = false;
        true
    }

    /// 当前位置：各 Renderer 已呈现位置的最大值（减去循环偏移）
    pub fn current_position(&self) -> TrackPosition {
        self.position(true)
    }

    // ========== 事件处理 ==========

    /// 处理所有已到达的组件事件，返回处理的数量
    pub fn process_events(&mut self) -> usize {
        let events: Vec<EngineEvent> = self.engine_events_rx.try_iter().collect();
        let count = events.len();
        for event in events {
            self.handle_event(event);
        }

        if self.threads_dirty {
            self.delete_free_threads();
        }
        count
    }

    /// 最多等待 timeout 直到有组件事件，然后处理所有已到达的事件
    pub fn wait_for_events(&mut self, timeout: Duration) -> usize {
        match self.engine_events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                1 + self.process_events()
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => self.process_events(),
        }
    }

    fn handle_event(&mut self, event: EngineEvent) {
        if !self.owns(event.source()) {
            debug!("{} 忽略已销毁对象 #{} 的事件", log_ctx(), event.source());
            return;
        }

        match event {
            EngineEvent::FirstPacketFound { id, position } => self.on_first_packet_found(id, position),
            EngineEvent::PacketsBuffered { .. } => {
                debug!("{} ✅ 缓冲完成", log_ctx());
                self.emit(PlayerEvent::BufferingReady);
            }
            EngineEvent::RendererSynchronized { id, instant, position } => {
                self.on_renderer_synchronized(id, instant, position)
            }
            EngineEvent::RendererLoopChanged { offset, index, .. } => {
                self.on_renderer_loop_changed(offset, index)
            }
            EngineEvent::ForceStepDone { .. } => {
                if self.config.pause_streams {
                    self.update_objects_paused_state();
                }
            }
            EngineEvent::RendererAtEnd { .. } => self.on_renderer_finished(),
            EngineEvent::Error { error, .. } => self.on_error(error),
        }
    }

    fn on_first_packet_found(&mut self, id: ObjectId, position: TrackPosition) {
        if self.demuxer.as_ref().map(|d| d.id()) != Some(id) {
            return;
        }

        if self.should_update_time_on_first_packet {
            let now = Instant::now();
            let expected = self.clock.time_from_position(position);
            debug!(
                "{} 🕐 Demuxer 初始化延迟: {:?}",
                log_ctx(),
                now.saturating_duration_since(expected)
            );
            self.clock.sync_at(now, position);
            self.should_update_time_on_first_packet = false;
        }

        for renderer in self.renderers.iter().flatten() {
            renderer.handle.post(RendererMessage::Start(self.clock.fork()));
        }
    }

    /// 主 Renderer 校准后：引擎时钟硬同步，其他 Renderer 软同步
    fn on_renderer_synchronized(&mut self, id: ObjectId, instant: Instant, position: TrackPosition) {
        let is_master = self.renderers[TrackType::Audio.index()]
            .as_ref()
            .is_some_and(|r| r.handle.id() == id);
        if !is_master {
            return;
        }

        self.clock.sync_at(instant, position);
        for renderer in self.renderers.iter().flatten() {
            if renderer.handle.id() != id {
                renderer.handle.post(RendererMessage::SyncSoft { instant, position });
            }
        }
    }

    fn on_renderer_loop_changed(&mut self, offset: TrackPosition, index: i32) {
        if index > self.loop_offset.index {
            self.loop_offset = LoopOffset::new(offset, index);
            info!("{} 🔁 进入循环 {} (offset={})", log_ctx(), index, offset);
            self.emit(PlayerEvent::LoopChanged { index });
        } else if index == self.loop_offset.index && offset != self.loop_offset.loop_start {
            warn!(
                "{} ⚠️  循环 {} 的偏移不一致: {} vs {}",
                log_ctx(),
                index,
                offset,
                self.loop_offset.loop_start
            );
            self.loop_offset.loop_start = offset;
            self.loop_offset_corrections += 1;
        }
    }

    /// 所有参与结束判断的 Renderer 都结束后发出 EndOfStream（只发一次）
    fn on_renderer_finished(&mut self) {
        let is_at_end = |track_type: TrackType| {
            self.renderers[track_type.index()]
                .as_ref()
                .map_or(true, |r| r.handle.is_at_end())
        };

        if !is_at_end(TrackType::Video) || !is_at_end(TrackType::Audio) {
            return;
        }
        if !is_at_end(TrackType::Subtitle) && !self.has_media_stream() {
            return;
        }

        if std::mem::replace(&mut self.state, PlaybackState::Stopped) == PlaybackState::Stopped {
            return;
        }

        self.finalize_time(self.duration().as_position());
        self.force_update();

        info!("{} 🏁 播放结束", log_ctx());
        self.emit(PlayerEvent::StateChanged(PlaybackState::Stopped));
        self.emit(PlayerEvent::EndOfStream);
    }

    fn on_error(&mut self, error: PlayerError) {
        let kind = error.kind();
        error!("{} ❌ 播放错误 ({:?}): {}", log_ctx(), kind, error);

        if kind == ErrorKind::Resource && self.state != PlaybackState::Stopped {
            // 停止播放，但保留当前位置
            let position = self.position(true);
            self.state = PlaybackState::Stopped;
            self.finalize_time(position);
            self.force_update();
            self.emit(PlayerEvent::StateChanged(PlaybackState::Stopped));
        }

        self.emit(PlayerEvent::Error {
            kind,
            message: error.to_string(),
        });
    }

    // ========== 对象管理 ==========

    fn set_state(&mut self, state: PlaybackState) {
        if state == self.state {
            return;
        }

        let previous = std::mem::replace(&mut self.state, state);

        if state == PlaybackState::Stopped {
            self.finalize_time(TrackPosition::ZERO);
        } else if previous == PlaybackState::Stopped
            && self.media.duration > TrackDuration::ZERO
            && self.clock.current_position() >= self.media.duration.as_position()
        {
            // 播放结束后再次播放从头开始
            self.finalize_time(TrackPosition::ZERO);
        }

        if previous == PlaybackState::Stopped || state == PlaybackState::Stopped {
            self.recreate_objects();
        }

        if previous == PlaybackState::Stopped {
            self.trigger_step_if_needed();
        }

        self.update_objects_paused_state();
        self.emit(PlayerEvent::StateChanged(state));
    }

    fn force_update(&mut self) {
        self.recreate_objects();
        self.trigger_step_if_needed();
        self.update_objects_paused_state();
    }

    fn recreate_objects(&mut self) {
        self.clock.set_paused(true);
        self.destroy_objects();

        if let Err(e) = self.create_objects_if_needed() {
            self.on_error(e);
        }
    }

    /// Drop 句柄即 kill；线程留到下一次 process_events 回收
    fn destroy_objects(&mut self) {
        self.demuxer = None;
        self.decoders = [None, None, None];
        self.renderers = [None, None, None];
        self.threads_dirty = true;
    }

    fn create_objects_if_needed(&mut self) -> Result<()> {
        if self.state == PlaybackState::Stopped {
            return Ok(());
        }

        let wanted: Vec<TrackType> = TrackType::ALL
            .into_iter()
            .filter(|&t| self.current_stream(t).is_some() && self.sinks[t.index()].is_some())
            .collect();
        if wanted.is_empty() {
            debug!("{} 没有可播放的轨道", log_ctx());
            return Ok(());
        }

        let (demuxer_mailbox, demuxer_inbox) = self.threads.worker(DEMUXER_ROLE)?.mailbox();

        for track_type in wanted {
            self.create_stream_and_renderer(track_type, &demuxer_mailbox)?;
        }

        self.create_demuxer(demuxer_mailbox, demuxer_inbox)
    }

    fn create_stream_and_renderer(
        &mut self,
        track_type: TrackType,
        demuxer_mailbox: &Mailbox<DemuxerMessage>,
    ) -> Result<()> {
        let slot = track_type.index();
        let (Some(stream), Some(sink)) = (self.current_stream(track_type).cloned(), self.sinks[slot].clone())
        else {
            return Ok(());
        };

        let codec = match self.codecs.create(&stream) {
            Ok(codec) => codec,
            Err(e) => {
                warn!("{} ❌ 创建 {} 解码器失败: {}，关闭该轨道", log_ctx(), track_type, e);
                self.disabled_tracks[slot] = true;
                let message = match e {
                    PlayerError::Format(message) => message,
                    other => other.to_string(),
                };
                self.emit(PlayerEvent::Error {
                    kind: ErrorKind::Format,
                    message,
                });
                return Ok(());
            }
        };

        if self.renderers[slot].is_none() {
            let id = self.next_id();
            let base = ObjectBase::new(id, self.engine_events_tx.clone());
            let renderer = Renderer::new(
                base,
                track_type,
                sink,
                &self.clock,
                self.config.soft_sync_fixing_time(),
            );
            let shared = renderer.shared();

            let worker = self.threads.worker(&renderer_role(track_type))?;
            let (mailbox, inbox) = worker.mailbox();
            let handle = worker.attach(renderer, mailbox, inbox);
            self.renderers[slot] = Some(RendererSlot { handle, shared });
        }

        let (renderer_mailbox, abs_seek_pos) = match &self.renderers[slot] {
            Some(renderer) => (renderer.handle.mailbox(), renderer.shared.seek_position()),
            None => return Ok(()),
        };

        let id = self.next_id();
        let base = ObjectBase::new(id, self.engine_events_tx.clone());
        let decoder = StreamDecoder::new(
            base,
            track_type,
            codec,
            abs_seek_pos,
            self.config.frame_budget.for_track(track_type),
            renderer_mailbox,
            demuxer_mailbox.clone(),
        );

        let worker = self.threads.worker(&decoder_role(track_type))?;
        let (mailbox, inbox) = worker.mailbox();
        // Renderer 必须先认识新的上游，再收到它的帧
        if let Some(renderer) = &self.renderers[slot] {
            renderer.handle.post(RendererMessage::SetUpstream { id, mailbox: mailbox.clone() });
        }
        let handle = worker.attach(decoder, mailbox, inbox);
        self.decoders[slot] = Some(handle);
        Ok(())
    }

    fn create_demuxer(
        &mut self,
        mailbox: Mailbox<DemuxerMessage>,
        inbox: Receiver<Envelope<DemuxerMessage>>,
    ) -> Result<()> {
        let decoders: Vec<_> = TrackType::ALL
            .into_iter()
            .filter_map(|t| {
                let decoder = self.decoders[t.index()].as_ref()?;
                let stream = self.current_stream(t)?;
                Some((t, stream.index, decoder.mailbox()))
            })
            .collect();

        if decoders.is_empty() {
            self.threads_dirty = true;
            return Ok(());
        }

        let setup = DemuxerSetup {
            position: self.position(false),
            seek_pending: self.seek_pending,
            loop_offset: self.loop_offset,
            loops: self.loops.clone(),
            decoders,
        };
        self.seek_pending = false;

        let id = self.next_id();
        let base = ObjectBase::new(id, self.engine_events_tx.clone());
        let demuxer = Demuxer::new(base, self.container.clone(), self.config.clone(), setup);

        let worker = self.threads.worker(DEMUXER_ROLE)?;
        self.demuxer = Some(worker.attach(demuxer, mailbox, inbox));

        self.should_update_time_on_first_packet = true;
        self.emit(PlayerEvent::BufferingStarted);
        Ok(())
    }

    fn update_objects_paused_state(&mut self) {
        let paused = self.state != PlaybackState::Playing;
        self.clock.set_paused(paused);

        for renderer in self.renderers.iter().flatten() {
            renderer.handle.set_paused(paused);
        }

        let step_in_progress =
            |slot: &Option<RendererSlot>| slot.as_ref().is_some_and(|r| r.shared.is_step_forced());
        let pause_streams = self.config.pause_streams;

        for (slot, decoder) in self.decoders.iter().enumerate() {
            if let Some(decoder) = decoder {
                decoder.set_paused(pause_streams && paused && !step_in_progress(&self.renderers[slot]));
            }
        }

        if let Some(demuxer) = &self.demuxer {
            let any_step = self.renderers.iter().any(step_in_progress);
            demuxer.set_paused(pause_streams && paused && !any_step);
        }
    }

    /// 暂停状态下（例如刚 seek 完）强制视频渲染一帧作为预览
    fn trigger_step_if_needed(&mut self) {
        if self.state != PlaybackState::Paused {
            return;
        }

        if let Some(video) = &self.renderers[TrackType::Video.index()] {
            if video.shared.request_force_step() {
                video.handle.post(RendererMessage::ForceStep);
            }
        }
    }

    fn delete_free_threads(&mut self) {
        self.threads_dirty = false;

        let mut live: HashSet<String> = HashSet::new();
        if self.demuxer.is_some() {
            live.insert(DEMUXER_ROLE.to_string());
        }
        for track_type in TrackType::ALL {
            if self.decoders[track_type.index()].is_some() {
                live.insert(decoder_role(track_type));
            }
            if self.renderers[track_type.index()].is_some() {
                live.insert(renderer_role(track_type));
            }
        }

        self.threads.delete_free_threads(&live);
    }

    // ========== 辅助 ==========

    fn next_id(&mut self) -> ObjectId {
        let id = self.next_object_id;
        self.next_object_id += 1;
        id
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.player_events_tx.send(event);
    }

    fn owns(&self, id: ObjectId) -> bool {
        self.demuxer.as_ref().is_some_and(|d| d.id() == id)
            || self.decoders.iter().flatten().any(|d| d.id() == id)
            || self.renderers.iter().flatten().any(|r| r.handle.id() == id)
    }

    fn has_media_stream(&self) -> bool {
        self.renderers[TrackType::Audio.index()].is_some()
            || self.renderers[TrackType::Video.index()].is_some()
    }

    fn current_stream(&self, track_type: TrackType) -> Option<&StreamInfo> {
        let slot = track_type.index();
        if self.disabled_tracks[slot] {
            return None;
        }
        let index = self.active_tracks[slot]?;
        self.media.streams_of(track_type).nth(index)
    }

    fn bound_position(&self, position: TrackPosition) -> TrackPosition {
        position.bounded(self.media.duration)
    }

    /// top=true 取各 Renderer 位置的最大值；false 取最小值（有音视频时忽略字幕）
    fn position(&self, top: bool) -> TrackPosition {
        let mut position: Option<TrackPosition> = None;

        for track_type in TrackType::ALL {
            let Some(renderer) = &self.renderers[track_type.index()] else {
                continue;
            };
            if !top && track_type == TrackType::Subtitle && self.has_media_stream() {
                continue;
            }

            let renderer_pos = renderer.shared.last_position();
            position = Some(match position {
                None => renderer_pos,
                Some(pos) if top => pos.max(renderer_pos),
                Some(pos) => pos.min(renderer_pos),
            });
        }

        let position = position.unwrap_or_else(|| self.clock.current_position());
        self.bound_position(position - self.loop_offset.loop_start.as_duration())
    }

    fn finalize_time(&mut self, position: TrackPosition) {
        self.clock.set_paused(true);
        self.clock.sync(position);
        self.loop_offset = LoopOffset::default();
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        info!("{} 🎮 销毁播放引擎", log_ctx());
        self.destroy_objects();
        self.delete_free_threads();
    }
}
