use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    /// 读取器暂时无数据（类似 EAGAIN），可以重试
    #[error("暂时性 IO 错误: {0}")]
    TransientIo(String),

    #[error("资源错误: {0}")]
    Resource(String),

    #[error("格式错误: {0}")]
    Format(String),

    #[error("解码错误: {0}")]
    Decode(String),

    #[error("无效参数: {0}")]
    InvalidArgument(String),

    #[error("配置解析失败: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),
}

impl PlayerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PlayerError::TransientIo(_))
    }

    /// 上报给播放器的粗粒度错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlayerError::TransientIo(_) | PlayerError::Resource(_) | PlayerError::IoError(_) => {
                ErrorKind::Resource
            }
            PlayerError::Format(_) => ErrorKind::Format,
            PlayerError::Decode(_) => ErrorKind::Decode,
            PlayerError::InvalidArgument(_) | PlayerError::Config(_) => {
                ErrorKind::Other
            }
        }
    }
}

/// 错误类别（对应播放器对外的 error(kind, message)）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Resource,
    Format,
    Decode,
    Other,
}

pub type Result<T> = std::result::Result<T, PlayerError>;
