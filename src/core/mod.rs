// 核心数据结构和类型定义

pub mod types;
pub mod time;
pub mod clock;
pub mod config;
pub mod error;

pub use types::*;
pub use time::*;
pub use clock::*;
pub use config::*;
pub use error::*;
