use crate::core::time::{TrackDuration, TrackPosition};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 播放时钟 - 用于音视频同步
///
/// 状态是一条直线：`position(t) = position + rate * (t - time_point)`，暂停时停在 `position`。
/// Clone 共享同一份状态；`fork()` 拷贝出独立的一份（每个 Renderer 各持有一个）。
#[derive(Clone)]
pub struct TimeController {
    inner: Arc<Mutex<ClockState>>,
}

#[derive(Debug, Clone, Copy)]
struct ClockState {
    paused: bool,
    rate: f32,
    position: TrackPosition,
    time_point: Instant,
    soft_sync: Option<SoftSyncData>,
}

/// 软同步：在 [src_time, dst_time] 区间内用 internal_rate 从旧直线平滑过渡到新直线
#[derive(Debug, Clone, Copy)]
struct SoftSyncData {
    src_time: Instant,
    src_position: TrackPosition,
    dst_time: Instant,
    dst_position: TrackPosition,
    internal_rate: f32,
}

/// a - b（微秒，可为负）
fn signed_micros(a: Instant, b: Instant) -> i64 {
    if a >= b {
        (a - b).as_micros() as i64
    } else {
        -((b - a).as_micros() as i64)
    }
}

fn shift_instant(base: Instant, micros: i64) -> Instant {
    if micros >= 0 {
        base + Duration::from_micros(micros as u64)
    } else {
        base.checked_sub(Duration::from_micros(micros.unsigned_abs()))
            .unwrap_or(base)
    }
}

fn clock_to_track(clock_us: i64, rate: f32) -> TrackDuration {
    TrackDuration::from_micros((clock_us as f64 * rate as f64).round() as i64)
}

fn track_to_clock(track: TrackDuration, rate: f32) -> i64 {
    (track.as_micros() as f64 / rate as f64).round() as i64
}

impl ClockState {
    fn position_from_time_internal(&self, tp: Instant) -> TrackPosition {
        self.position + clock_to_track(signed_micros(tp, self.time_point), self.rate)
    }

    fn time_from_position_internal(&self, pos: TrackPosition) -> Instant {
        shift_instant(self.time_point, track_to_clock(pos - self.position, self.rate))
    }

    fn position_from_time(&self, tp: Instant, ignore_pause: bool) -> TrackPosition {
        let tp = if self.paused && !ignore_pause { self.time_point } else { tp };

        if let Some(soft) = &self.soft_sync {
            if tp < soft.dst_time {
                let rate = if tp > soft.src_time { soft.internal_rate } else { self.rate };
                return soft.src_position + clock_to_track(signed_micros(tp, soft.src_time), rate);
            }
        }

        self.position_from_time_internal(tp)
    }

    fn time_from_position(&self, pos: TrackPosition, ignore_pause: bool) -> Instant {
        let pos = if self.paused && !ignore_pause { self.position } else { pos };

        if let Some(soft) = &self.soft_sync {
            if pos < soft.dst_position {
                let rate = if pos > soft.src_position { soft.internal_rate } else { self.rate };
                return shift_instant(soft.src_time, track_to_clock(pos - soft.src_position, rate));
            }
        }

        self.time_from_position_internal(pos)
    }

    fn make_soft_sync_data(&self, src_time: Instant, src_position: TrackPosition, dst_time: Instant) -> SoftSyncData {
        let dst_position = self.position_from_time_internal(dst_time);
        let window_us = signed_micros(dst_time, src_time);
        let internal_rate = if window_us > 0 {
            ((dst_position - src_position).as_micros() as f64 / window_us as f64) as f32
        } else {
            self.rate
        };

        SoftSyncData {
            src_time,
            src_position,
            dst_time,
            dst_position,
            internal_rate,
        }
    }

    /// 把参考点推进到 now，之后修改 paused / rate 不会造成位置跳变
    fn scroll_time_till_now(&mut self, now: Instant) {
        if !self.paused {
            self.position = self.position_from_time_internal(now);

            if matches!(self.soft_sync, Some(soft) if soft.dst_time <= now) {
                self.soft_sync = None;
            }
        } else if let Some(soft) = &mut self.soft_sync {
            // 暂停期间软同步窗口整体后移
            let paused_for = now.saturating_duration_since(self.time_point);
            soft.src_time += paused_for;
            soft.dst_time += paused_for;
        }

        self.time_point = now;
    }
}

impl TimeController {
    /// 新时钟：暂停，速率 1.0，位置 0
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockState {
                paused: true,
                rate: 1.0,
                position: TrackPosition::ZERO,
                time_point: Instant::now(),
                soft_sync: None,
            })),
        }
    }

    /// 拷贝出一个状态独立的时钟
    pub fn fork(&self) -> Self {
        let state = *self.inner.lock();
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    pub fn playback_rate(&self) -> f32 {
        self.inner.lock().rate
    }

    /// 设置播放速率（调用方保证 rate > 0）
    pub fn set_playback_rate(&self, rate: f32) {
        let mut state = self.inner.lock();
        if state.rate == rate {
            return;
        }

        let now = Instant::now();
        state.scroll_time_till_now(now);
        state.rate = rate;

        if let Some(soft) = state.soft_sync {
            let time_point = state.time_point;
            let position = state.position;
            state.soft_sync = Some(state.make_soft_sync_data(time_point, position, soft.dst_time));
        }
    }

    pub fn sync(&self, position: TrackPosition) {
        self.sync_at(Instant::now(), position);
    }

    /// 硬同步：position 对应时刻 instant，丢弃正在进行的软同步
    pub fn sync_at(&self, instant: Instant, position: TrackPosition) {
        let mut state = self.inner.lock();
        state.soft_sync = None;
        state.position = position;
        state.time_point = instant;
    }

    /// 软同步：在 fixing_time 内平滑收敛到新直线
    pub fn sync_soft(&self, instant: Instant, position: TrackPosition, fixing_time: Duration) {
        let mut state = self.inner.lock();
        let src_time = Instant::now();
        let src_position = state.position_from_time(src_time, true);
        let dst_time = src_time + fixing_time;

        state.position = position;
        state.time_point = instant;
        state.soft_sync = Some(state.make_soft_sync_data(src_time, src_position, dst_time));
    }

    pub fn set_paused(&self, paused: bool) {
        let mut state = self.inner.lock();
        if state.paused == paused {
            return;
        }

        state.scroll_time_till_now(Instant::now());
        state.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// 当前位置（不小于 0）
    pub fn current_position(&self) -> TrackPosition {
        self.current_position_with_offset(Duration::ZERO)
    }

    /// now + offset 时刻的位置
    pub fn current_position_with_offset(&self, offset: Duration) -> TrackPosition {
        self.position_from_time(Instant::now() + offset).max(TrackPosition::ZERO)
    }

    pub fn position_from_time(&self, instant: Instant) -> TrackPosition {
        self.inner.lock().position_from_time(instant, false)
    }

    /// 到达 position 的墙钟时刻；暂停时返回参考时刻
    pub fn time_from_position(&self, position: TrackPosition) -> Instant {
        self.inner.lock().time_from_position(position, false)
    }

    pub fn is_soft_syncing(&self) -> bool {
        self.inner.lock().soft_sync.is_some()
    }
}

impl Default for TimeController {
    fn default() -> Self {
        Self::new()
    }
}
