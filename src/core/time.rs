use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::time::Duration;

/// 轨道时间点（微秒）
///
/// 播放引擎内部统一使用的时间轴位置，0 表示媒体起点
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackPosition(i64);

/// 轨道时长（微秒），可以为负（两个时间点之差）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackDuration(i64);

impl TrackPosition {
    pub const ZERO: TrackPosition = TrackPosition(0);

    pub const fn from_micros(us: i64) -> Self {
        Self(us)
    }

    pub const fn from_millis(ms: i64) -> Self {
        Self(ms * 1000)
    }

    pub const fn as_micros(self) -> i64 {
        self.0
    }

    /// 对外接口使用毫秒
    pub const fn as_millis(self) -> i64 {
        self.0 / 1000
    }

    pub const fn as_duration(self) -> TrackDuration {
        TrackDuration(self.0)
    }

    /// 限制在 [0, upper]；upper 非正时只做下限限制
    pub fn bounded(self, upper: TrackDuration) -> Self {
        let pos = self.max(Self::ZERO);
        if upper > TrackDuration::ZERO {
            pos.min(upper.as_position())
        } else {
            pos
        }
    }
}

impl TrackDuration {
    pub const ZERO: TrackDuration = TrackDuration(0);

    pub const fn from_micros(us: i64) -> Self {
        Self(us)
    }

    pub const fn from_millis(ms: i64) -> Self {
        Self(ms * 1000)
    }

    pub const fn as_micros(self) -> i64 {
        self.0
    }

    pub const fn as_millis(self) -> i64 {
        self.0 / 1000
    }

    pub const fn as_position(self) -> TrackPosition {
        TrackPosition(self.0)
    }

    /// 把墙钟时长换算成轨道时长：track = clock * rate
    pub fn from_clock(clock: Duration, rate: f32) -> Self {
        Self((clock.as_micros() as f64 * rate as f64).round() as i64)
    }

    /// 轨道时长换算成墙钟时长：clock = track / rate（负值截断为 0）
    pub fn to_clock(self, rate: f32) -> Duration {
        if self.0 <= 0 || rate <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_micros((self.0 as f64 / rate as f64).round() as u64)
    }
}

impl Add<TrackDuration> for TrackPosition {
    type Output = TrackPosition;

    fn add(self, rhs: TrackDuration) -> TrackPosition {
        TrackPosition(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign<TrackDuration> for TrackPosition {
    fn add_assign(&mut self, rhs: TrackDuration) {
        *self = *self + rhs;
    }
}

impl Sub<TrackDuration> for TrackPosition {
    type Output = TrackPosition;

    fn sub(self, rhs: TrackDuration) -> TrackPosition {
        TrackPosition(self.0.saturating_sub(rhs.0))
    }
}

impl Sub for TrackPosition {
    type Output = TrackDuration;

    fn sub(self, rhs: TrackPosition) -> TrackDuration {
        TrackDuration(self.0.saturating_sub(rhs.0))
    }
}

impl Add for TrackDuration {
    type Output = TrackDuration;

    fn add(self, rhs: TrackDuration) -> TrackDuration {
        TrackDuration(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for TrackDuration {
    fn add_assign(&mut self, rhs: TrackDuration) {
        *self = *self + rhs;
    }
}

impl Sub for TrackDuration {
    type Output = TrackDuration;

    fn sub(self, rhs: TrackDuration) -> TrackDuration {
        TrackDuration(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for TrackDuration {
    fn sub_assign(&mut self, rhs: TrackDuration) {
        *self = *self - rhs;
    }
}

impl fmt::Display for TrackPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

impl fmt::Display for TrackDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

/// 循环偏移：之前所有循环累计的时长，加到循环内时间戳上，
/// 保证多次循环播放时绝对位置单调递增
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopOffset {
    pub loop_start: TrackPosition,
    pub index: i32,
}

impl LoopOffset {
    pub fn new(loop_start: TrackPosition, index: i32) -> Self {
        Self { loop_start, index }
    }
}
