//! myy_sync：多轨道（视频 / 音频 / 字幕）播放同步核心
//!
//! 时钟、解封装、解码、按时钟呈现，以及把它们连在一起的 [`PlaybackEngine`]。
//! 具体的容器格式、解码器和输出设备通过 `player::source` 中的 trait 接入。

pub mod core;
pub mod player;

pub use crate::core::{
    ErrorKind, FrameBudget, LoopOffset, MediaInfo, PlaybackConfig, PlaybackState, PlayerError, Result,
    TimeController, TrackDuration, TrackPosition, TrackType,
};
pub use crate::player::{PlaybackEngine, PlayerEvent};
