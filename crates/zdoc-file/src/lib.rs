//! ZDOC 文件格式处理
//!
//! 支持：
//! - `.zdoc` 原生格式（版本化分块归档）
//! - 向旧格式版本写出、向前兼容读取
//! - 几何对象表的增量读取

pub mod chunk;
pub mod error;
pub mod native;
pub mod record;
pub mod table;

pub use chunk::{ChunkReader, ChunkWriter};
pub use error::FileError;
pub use native::{
    load, read_model, save, save_with_version, write_model, ObjectTableReader, FORMAT_VERSION,
};
pub use record::ArchiveComponent;
pub use table::{TableReader, TableWriter};
