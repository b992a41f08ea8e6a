use crate::core::Result;
use crate::player::object::{Doorbell, Envelope, Mailbox, ObjectHandle, PipelineObject};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, info, warn};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::process;
use std::thread::{self, JoinHandle};
use std::time::Instant;

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 工作线程里运行的对象（擦除了消息类型）
trait Runnable: Send {
    fn is_killed(&self) -> bool;

    /// 处理邮箱中已有的全部消息
    fn pump(&mut self);

    /// 可以步进时返回下一步的时间点
    fn due_time(&self, now: Instant) -> Option<Instant>;

    fn step(&mut self);
}

struct Hosted<T: PipelineObject> {
    object: T,
    inbox: Receiver<Envelope<T::Message>>,
}

impl<T: PipelineObject> Runnable for Hosted<T> {
    fn is_killed(&self) -> bool {
        self.object.base().is_killed()
    }

    fn pump(&mut self) {
        while !self.is_killed() {
            match self.inbox.try_recv() {
                Ok(Envelope::SetPaused(paused)) => self.object.set_paused(paused),
                Ok(Envelope::Message(message)) => self.object.handle_message(message),
                Err(_) => break,
            }
        }
    }

    fn due_time(&self, now: Instant) -> Option<Instant> {
        if !self.is_killed() && self.object.can_do_next_step() {
            Some(self.object.next_step_time(now))
        } else {
            None
        }
    }

    fn step(&mut self) {
        if !self.is_killed() {
            self.object.do_next_step();
        }
    }
}

enum WorkerCommand {
    Attach(Box<dyn Runnable>),
    Quit,
}

/// 按角色划分的工作线程（demuxer / decoder-video / renderer-audio ...）
///
/// 线程上可以挂多个对象，Drop 时通知线程退出并 join。
pub struct WorkerThread {
    role: String,
    commands: Sender<WorkerCommand>,
    doorbell: Doorbell,
    thread_handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    pub fn spawn(role: &str) -> Result<Self> {
        let (commands_tx, commands_rx) = unbounded::<WorkerCommand>();
        let (bell_tx, bell_rx) = bounded::<()>(1);

        let thread_role = role.to_string();
        let thread_handle = thread::Builder::new()
            .name(role.to_string())
            .spawn(move || Self::run_loop(&thread_role, commands_rx, bell_rx))?;

        info!("{} 🧵 启动工作线程: {}", log_ctx(), role);

        Ok(Self {
            role: role.to_string(),
            commands: commands_tx,
            doorbell: Doorbell::new(bell_tx),
            thread_handle: Some(thread_handle),
        })
    }

    /// 在本线程上创建一个邮箱（对象还没构造时就需要把邮箱交给上游）
    pub fn mailbox<M>(&self) -> (Mailbox<M>, Receiver<Envelope<M>>) {
        Mailbox::channel(self.doorbell.clone())
    }

    /// 把对象挂到本线程上，返回唯一的句柄
    pub fn attach<T: PipelineObject>(
        &self,
        object: T,
        mailbox: Mailbox<T::Message>,
        inbox: Receiver<Envelope<T::Message>>,
    ) -> ObjectHandle<T::Message> {
        let handle = ObjectHandle::new(object.base(), mailbox);
        if self
            .commands
            .send(WorkerCommand::Attach(Box::new(Hosted { object, inbox })))
            .is_err()
        {
            warn!("{} ⚠️  工作线程 {} 已退出，对象 {} 无法启动", log_ctx(), self.role, handle.id());
        }
        self.doorbell.ring();
        handle
    }

    fn run_loop(role: &str, commands: Receiver<WorkerCommand>, doorbell: Receiver<()>) {
        info!("{} 🧵 工作线程 {} 开始运行", log_ctx(), role);
        let mut objects: Vec<Box<dyn Runnable>> = Vec::new();

        'outer: loop {
            // 1. 控制命令
            loop {
                match commands.try_recv() {
                    Ok(WorkerCommand::Attach(object)) => objects.push(object),
                    Ok(WorkerCommand::Quit) | Err(TryRecvError::Disconnected) => break 'outer,
                    Err(TryRecvError::Empty) => break,
                }
            }

            // 2. 按 FIFO 处理各对象的消息
            for object in objects.iter_mut() {
                object.pump();
            }

            // 3. 丢弃已被 kill 的对象（连同未处理的消息）
            let before = objects.len();
            objects.retain(|object| !object.is_killed());
            if objects.len() != before {
                debug!("{} 🗑️  {} 回收 {} 个对象", log_ctx(), role, before - objects.len());
            }

            // 4. 执行到期的步骤，每个对象每轮最多一步
            let now = Instant::now();
            for object in objects.iter_mut() {
                if matches!(object.due_time(now), Some(due) if due <= now) {
                    object.step();
                }
            }

            // 5. 等待门铃或最近的到期时间
            let now = Instant::now();
            let deadline = objects.iter().filter_map(|object| object.due_time(now)).min();
            match deadline {
                Some(deadline) if deadline <= now => continue,
                Some(deadline) => match doorbell.recv_deadline(deadline) {
                    Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => {
                    if doorbell.recv().is_err() {
                        break;
                    }
                }
            }
        }

        info!("{} 🧵 工作线程 {} 退出（剩余 {} 个对象）", log_ctx(), role, objects.len());
    }

    pub fn quit(&mut self) {
        let _ = self.commands.send(WorkerCommand::Quit);
        self.doorbell.ring();
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!("{} ⚠️  工作线程 {} 异常退出", log_ctx(), self.role);
            }
        }
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.quit();
    }
}

/// 引擎持有的线程表：角色 → 工作线程，按需创建
#[derive(Default)]
pub struct ThreadRegistry {
    workers: HashMap<String, WorkerThread>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn worker(&mut self, role: &str) -> Result<&WorkerThread> {
        match self.workers.entry(role.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(WorkerThread::spawn(role)?)),
        }
    }

    /// 结束不再被任何存活对象使用的线程（在控制线程上 join）
    pub fn delete_free_threads(&mut self, live_roles: &HashSet<String>) {
        let free: Vec<String> = self
            .workers
            .keys()
            .filter(|role| !live_roles.contains(*role))
            .cloned()
            .collect();

        for role in free {
            if let Some(mut worker) = self.workers.remove(&role) {
                info!("{} 🧹 回收空闲线程: {}", log_ctx(), role);
                worker.quit();
            }
        }
    }

    pub fn roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = self.workers.keys().cloned().collect();
        roles.sort();
        roles
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::object::{EngineEvent, ObjectBase};
    use std::time::Duration;

    /// 每收到一个数就在下一步里把它转发出去
    struct Echo {
        base: ObjectBase,
        pending: Vec<u32>,
        out: Sender<u32>,
    }

    impl PipelineObject for Echo {
        type Message = u32;

        fn base(&self) -> &ObjectBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ObjectBase {
            &mut self.base
        }

        fn handle_message(&mut self, message: u32) {
            self.pending.push(message);
        }

        fn can_do_next_step(&self) -> bool {
            self.base.can_step() && !self.pending.is_empty()
        }

        fn do_next_step(&mut self) {
            let value = self.pending.remove(0);
            let _ = self.out.send(value);
        }
    }

    fn echo(id: u64) -> (Echo, Receiver<u32>, Receiver<EngineEvent>) {
        let (events_tx, events_rx) = unbounded();
        let (out_tx, out_rx) = unbounded();
        let echo = Echo {
            base: ObjectBase::new(id, events_tx),
            pending: Vec::new(),
            out: out_tx,
        };
        (echo, out_rx, events_rx)
    }

    #[test]
    fn test_messages_are_processed_in_order() {
        let worker = WorkerThread::spawn("test-echo").unwrap();
        let (object, out, _events) = echo(1);
        let (mailbox, inbox) = worker.mailbox();
        let handle = worker.attach(object, mailbox, inbox);

        for i in 0..5 {
            handle.post(i);
        }
        let received: Vec<u32> = (0..5)
            .map(|_| out.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        assert_eq!(received, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_paused_object_does_not_step() {
        let worker = WorkerThread::spawn("test-pause").unwrap();
        let (object, out, _events) = echo(2);
        let (mailbox, inbox) = worker.mailbox();
        let handle = worker.attach(object, mailbox, inbox);

        handle.set_paused(true);
        handle.post(42);
        assert!(out.recv_timeout(Duration::from_millis(100)).is_err());

        handle.set_paused(false);
        assert_eq!(out.recv_timeout(Duration::from_secs(2)).unwrap(), 42);
    }

    #[test]
    fn test_killed_object_is_dropped() {
        let worker = WorkerThread::spawn("test-kill").unwrap();
        let (object, out, _events) = echo(3);
        let (mailbox, inbox) = worker.mailbox();
        let handle = worker.attach(object, mailbox.clone(), inbox);

        handle.set_paused(true);
        handle.post(1);
        drop(handle);

        // kill 之后即使再投递消息、恢复运行，也不会有输出
        mailbox.send(Envelope::SetPaused(false));
        mailbox.post(2);
        // 对象被回收后 out 的发送端也随之销毁
        assert!(matches!(
            out.recv_timeout(Duration::from_secs(2)),
            Err(RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn test_registry_reuses_and_frees_threads() {
        let mut registry = ThreadRegistry::new();
        registry.worker("decoder-video").unwrap();
        registry.worker("decoder-video").unwrap();
        registry.worker("demuxer").unwrap();
        assert_eq!(registry.len(), 2);

        let live: HashSet<String> = ["demuxer".to_string()].into_iter().collect();
        registry.delete_free_threads(&live);
        assert_eq!(registry.roles(), vec!["demuxer".to_string()]);
    }
}
