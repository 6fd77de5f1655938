//! 归档错误定义
//!
//! 两档严重度（见 `table` 模块的记录循环）：
//! - 结构性错误（Io/BadChunk/ChecksumMismatch/BadMajorVersion/
//!   UnsupportedVersion/InvalidFormat）中止当前表的读取并向上传播
//! - 记录级错误只丢弃该条记录，计数后继续读下一条

use thiserror::Error;
use zdoc_core::error::ModelError;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("Bad chunk: {0}")]
    BadChunk(String),

    #[error("Chunk checksum mismatch (typecode {typecode:#010x})")]
    ChecksumMismatch { typecode: u32 },

    #[error("Unsupported record major version: expected {expected}, found {found}")]
    BadMajorVersion { expected: i32, found: i32 },

    #[error("Record decode error: {0}")]
    RecordDecode(String),

    #[error("Table protocol violation: {0}")]
    TableState(String),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

impl FileError {
    /// 是否为结构性错误（中止整表读取）
    ///
    /// 非结构性错误（RecordDecode/Model）只影响单条记录。
    pub fn is_structural(&self) -> bool {
        !matches!(self, FileError::RecordDecode(_) | FileError::Model(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_split() {
        assert!(FileError::BadChunk("short".into()).is_structural());
        assert!(FileError::ChecksumMismatch { typecode: 1 }.is_structural());
        assert!(!FileError::RecordDecode("bad field".into()).is_structural());
    }
}
