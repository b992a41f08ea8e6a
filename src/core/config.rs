use crate::core::error::{PlayerError, Result};
use crate::core::time::TrackDuration;
use crate::core::types::TrackType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 每种轨道允许积压在渲染队列里的最大帧数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameBudget {
    pub video: u32,
    pub audio: u32,
    pub subtitle: u32,
}

impl FrameBudget {
    pub fn for_track(&self, track_type: TrackType) -> u32 {
        match track_type {
            TrackType::Video => self.video,
            TrackType::Audio => self.audio,
            TrackType::Subtitle => self.subtitle,
        }
    }
}

impl Default for FrameBudget {
    fn default() -> Self {
        Self {
            video: 12,
            audio: 9,
            subtitle: 6,    // 字幕需要容纳显示帧和清除帧
        }
    }
}

/// 播放引擎配置
///
/// 所有字段都有默认值，JSON 里只需要写要覆盖的项：
/// ```json
/// { "max_buffered_duration_us": 2000000, "frame_budget": { "video": 4 } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// 单轨已缓冲时长上限（微秒），超过后 Demuxer 等待消费
    pub max_buffered_duration_us: i64,
    /// 单轨已缓冲字节上限（约 4 秒 HDR 视频）
    pub max_buffered_size: usize,
    /// 暂时性读取错误的最大重试次数
    pub demuxer_max_retries: u32,
    /// 重试间隔（毫秒）
    pub demuxer_retry_interval_ms: u64,
    pub frame_budget: FrameBudget,
    /// 软同步收敛时间（毫秒）
    pub soft_sync_fixing_time_ms: u64,
    /// 暂停时是否同时暂停 Demuxer / StreamDecoder。
    /// 默认不暂停：暂停期间继续预读，恢复播放更平稳
    pub pause_streams: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            max_buffered_duration_us: 4_000_000,
            max_buffered_size: 32 * 1024 * 1024,
            demuxer_max_retries: 10,
            demuxer_retry_interval_ms: 10,
            frame_budget: FrameBudget::default(),
            soft_sync_fixing_time_ms: 4000,
            pause_streams: false,
        }
    }
}

impl PlaybackConfig {
    /// 从 JSON 字符串加载并校验
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PlaybackConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_buffered_duration_us <= 0 {
            return Err(PlayerError::InvalidArgument(format!(
                "max_buffered_duration_us 必须为正数: {}",
                self.max_buffered_duration_us
            )));
        }
        if self.max_buffered_size == 0 {
            return Err(PlayerError::InvalidArgument("max_buffered_size 不能为 0".to_string()));
        }
        for track_type in TrackType::ALL {
            if self.frame_budget.for_track(track_type) == 0 {
                return Err(PlayerError::InvalidArgument(format!(
                    "{} 轨道的帧预算不能为 0",
                    track_type
                )));
            }
        }
        Ok(())
    }

    pub fn max_buffered_duration(&self) -> TrackDuration {
        TrackDuration::from_micros(self.max_buffered_duration_us)
    }

    pub fn demuxer_retry_interval(&self) -> Duration {
        Duration::from_millis(self.demuxer_retry_interval_ms)
    }

    pub fn soft_sync_fixing_time(&self) -> Duration {
        Duration::from_millis(self.soft_sync_fixing_time_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PlaybackConfig::from_json(r#"{ "frame_budget": { "video": 4 }, "pause_streams": true }"#)
            .unwrap();
        assert_eq!(config.frame_budget.video, 4);
        assert_eq!(config.frame_budget.audio, 9);
        assert!(config.pause_streams);
        assert_eq!(config.max_buffered_size, 32 * 1024 * 1024);
        assert_eq!(config.demuxer_max_retries, 10);
    }

    #[test]
    fn test_zero_budget_rejected() {
        let err = PlaybackConfig::from_json(r#"{ "frame_budget": { "subtitle": 0 } }"#).unwrap_err();
        assert!(matches!(err, PlayerError::InvalidArgument(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = PlaybackConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, PlayerError::Config(_)));
    }
}
