use crate::core::{PlayerError, TrackPosition};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// 流水线对象 id，由引擎分配，单调递增
pub type ObjectId = u64;

/// 组件发给控制线程的事件
#[derive(Debug)]
pub enum EngineEvent {
    /// Demuxer 读到第一个包，position 为 seek 起点的绝对位置
    FirstPacketFound { id: ObjectId, position: TrackPosition },
    /// 某条轨道第一次缓冲到上限
    PacketsBuffered { id: ObjectId },
    /// 主 Renderer 重新校准了时钟
    RendererSynchronized { id: ObjectId, instant: Instant, position: TrackPosition },
    RendererLoopChanged { id: ObjectId, offset: TrackPosition, index: i32 },
    ForceStepDone { id: ObjectId },
    RendererAtEnd { id: ObjectId },
    Error { id: ObjectId, error: PlayerError },
}

impl EngineEvent {
    pub fn source(&self) -> ObjectId {
        match self {
            EngineEvent::FirstPacketFound { id, .. }
            | EngineEvent::PacketsBuffered { id }
            | EngineEvent::RendererSynchronized { id, .. }
            | EngineEvent::RendererLoopChanged { id, .. }
            | EngineEvent::ForceStepDone { id }
            | EngineEvent::RendererAtEnd { id }
            | EngineEvent::Error { id, .. } => *id,
        }
    }
}

/// 唤醒工作线程的门铃：容量 1，重复按铃会合并
#[derive(Clone)]
pub struct Doorbell {
    tx: Sender<()>,
}

impl Doorbell {
    pub fn new(tx: Sender<()>) -> Self {
        Self { tx }
    }

    pub fn ring(&self) {
        // 已经有未处理的铃声时 Full，线程退出后 Disconnected，都可以忽略
        let _ = self.tx.try_send(());
    }
}

/// 邮箱中的信封：控制命令与对象自己的消息共用一个 FIFO
pub enum Envelope<M> {
    SetPaused(bool),
    Message(M),
}

/// 对象邮箱的发送端，可以克隆给上下游组件
pub struct Mailbox<M> {
    tx: Sender<Envelope<M>>,
    doorbell: Doorbell,
}

impl<M> Clone for Mailbox<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            doorbell: self.doorbell.clone(),
        }
    }
}

impl<M> Mailbox<M> {
    /// 创建邮箱，接收端交给工作线程
    pub fn channel(doorbell: Doorbell) -> (Self, Receiver<Envelope<M>>) {
        let (tx, rx) = unbounded();
        (Self { tx, doorbell }, rx)
    }

    pub fn post(&self, message: M) {
        self.send(Envelope::Message(message));
    }

    pub fn send(&self, envelope: Envelope<M>) {
        // 接收端已销毁说明目标对象已被 kill，直接丢弃
        if self.tx.send(envelope).is_ok() {
            self.doorbell.ring();
        }
    }
}

/// 对象内部的公共状态
pub struct ObjectBase {
    id: ObjectId,
    paused: bool,
    at_end: bool,
    killed: Arc<AtomicBool>,
    at_end_flag: Arc<AtomicBool>,
    events: Sender<EngineEvent>,
}

impl ObjectBase {
    pub fn new(id: ObjectId, events: Sender<EngineEvent>) -> Self {
        Self {
            id,
            paused: false,
            at_end: false,
            killed: Arc::new(AtomicBool::new(false)),
            at_end_flag: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_at_end(&self) -> bool {
        self.at_end
    }

    pub fn set_at_end(&mut self) {
        self.at_end = true;
        self.at_end_flag.store(true, Ordering::Release);
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    /// 通用的可步进条件：未暂停、未结束、未被 kill
    pub fn can_step(&self) -> bool {
        !self.paused && !self.at_end && !self.is_killed()
    }

    /// kill 之后不再向控制线程发任何事件
    pub fn emit(&self, event: EngineEvent) {
        if self.is_killed() {
            return;
        }
        let _ = self.events.send(event);
    }

    pub fn emit_error(&self, error: PlayerError) {
        self.emit(EngineEvent::Error { id: self.id, error });
    }
}

/// 流水线对象：Demuxer / StreamDecoder / Renderer 的统一接口
///
/// 工作线程的循环：先把邮箱里的消息逐条交给 `handle_message`，
/// 再对 `can_do_next_step()` 为真且 `next_step_time()` 已到的对象调用一次 `do_next_step()`。
pub trait PipelineObject: Send + 'static {
    type Message: Send + 'static;

    fn base(&self) -> &ObjectBase;

    fn base_mut(&mut self) -> &mut ObjectBase;

    fn handle_message(&mut self, message: Self::Message);

    fn set_paused(&mut self, paused: bool) {
        self.base_mut().set_paused(paused);
    }

    fn can_do_next_step(&self) -> bool {
        self.base().can_step()
    }

    /// 下一步的时间点，默认立即执行
    fn next_step_time(&self, now: Instant) -> Instant {
        now
    }

    fn do_next_step(&mut self);

    fn id(&self) -> ObjectId {
        self.base().id()
    }
}

/// 引擎持有的对象句柄（唯一所有者）
///
/// Drop 时自动 kill：对象被标记后，工作线程丢弃它和邮箱里未处理的消息。
pub struct ObjectHandle<M> {
    id: ObjectId,
    mailbox: Mailbox<M>,
    killed: Arc<AtomicBool>,
    at_end: Arc<AtomicBool>,
}

impl<M> ObjectHandle<M> {
    pub fn new(base: &ObjectBase, mailbox: Mailbox<M>) -> Self {
        Self {
            id: base.id,
            mailbox,
            killed: base.killed.clone(),
            at_end: base.at_end_flag.clone(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn mailbox(&self) -> Mailbox<M> {
        self.mailbox.clone()
    }

    pub fn post(&self, message: M) {
        if !self.is_killed() {
            self.mailbox.post(message);
        }
    }

    pub fn set_paused(&self, paused: bool) {
        if !self.is_killed() {
            self.mailbox.send(Envelope::SetPaused(paused));
        }
    }

    pub fn is_at_end(&self) -> bool {
        self.at_end.load(Ordering::Acquire)
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    /// 幂等、不阻塞
    pub fn kill(&self) {
        if !self.killed.swap(true, Ordering::AcqRel) {
            self.mailbox.doorbell.ring();
        }
    }
}

impl<M> Drop for ObjectHandle<M> {
    fn drop(&mut self) {
        self.kill();
    }
}
