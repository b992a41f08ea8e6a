// 播放流水线：Demuxer → StreamDecoder → Renderer，由 PlaybackEngine 编排

pub mod source;
pub mod object;
pub mod worker;
pub mod demuxer;
pub mod decoder;
pub mod renderer;
pub mod engine;
pub mod synthetic;  // 合成媒体源，演示和测试用

pub use source::{
    Codec, CodecFactory, ContainerReader, DecodedFrame, FrameSink, RawPacket, SharedContainer,
    SharedSink, SinkStatus,
};
pub use engine::{PlaybackEngine, PlayerEvent};
pub use synthetic::{PassthroughCodecFactory, RecordingSink, SinkLog, SyntheticContainer};
