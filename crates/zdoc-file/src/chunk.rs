//! 分块二进制流
//!
//! 归档由嵌套的长度前缀块组成：
//! `typecode(u32) + length(u32) + payload + checksum(u32)`，全部小端。
//! 读侧凭length可以跳过任何不认识/未读完的块，这是版本演化的基础；
//! checksum是对payload逐字节累计的校验对折叠成的u32。
//!
//! 记录版本对 `(major, minor)` 用独立于块头的专用原语读写。

use crate::error::FileError;
use std::io::{Read, Write};
use uuid::Uuid;

/// 记录版本原语的标记字节
const RECORD_VERSION_MARKER: u8 = 0x56;

/// 累计校验对
///
/// 逐字节折叠的两个滚动和，对字节序错乱和长度错误都敏感。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkChecksum {
    s1: u32,
    s2: u32,
}

impl ChunkChecksum {
    pub fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.s1 = self.s1.wrapping_add(u32::from(byte)).wrapping_add(self.s2);
            self.s2 = self.s2.wrapping_add(self.s1);
        }
    }

    pub fn finish(&self) -> u32 {
        self.s1 ^ self.s2
    }
}

/// 计算一段字节的校验值
pub fn checksum_of(bytes: &[u8]) -> u32 {
    let mut checksum = ChunkChecksum::default();
    checksum.update(bytes);
    checksum.finish()
}

/// 块写入器
///
/// 打开中的块在内存缓冲里累积payload，`end_chunk` 时带着长度与
/// 校验值一次性落入父块（或底层流）。
#[derive(Debug)]
pub struct ChunkWriter<W: Write> {
    out: W,
    stack: Vec<(u32, Vec<u8>)>,
}

impl<W: Write> ChunkWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            stack: Vec::new(),
        }
    }

    /// 当前打开块的嵌套深度
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), FileError> {
        match self.stack.last_mut() {
            Some((_, buffer)) => buffer.extend_from_slice(bytes),
            None => self.out.write_all(bytes)?,
        }
        Ok(())
    }

    /// 打开一个块
    pub fn begin_chunk(&mut self, typecode: u32) -> Result<(), FileError> {
        self.stack.push((typecode, Vec::new()));
        Ok(())
    }

    /// 关闭最内层块并写出
    pub fn end_chunk(&mut self) -> Result<(), FileError> {
        let (typecode, payload) = self
            .stack
            .pop()
            .ok_or_else(|| FileError::BadChunk("end_chunk without begin_chunk".into()))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| FileError::BadChunk("chunk payload exceeds u32 length".into()))?;
        let checksum = checksum_of(&payload);

        self.write_bytes(&typecode.to_le_bytes())?;
        self.write_bytes(&length.to_le_bytes())?;
        self.write_bytes(&payload)?;
        self.write_bytes(&checksum.to_le_bytes())?;
        Ok(())
    }

    /// 结束写入，取回底层流；还有块未关闭时报错
    pub fn finish(mut self) -> Result<W, FileError> {
        if !self.stack.is_empty() {
            return Err(FileError::BadChunk(format!(
                "{} chunk(s) left open",
                self.stack.len()
            )));
        }
        self.out.flush()?;
        Ok(self.out)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), FileError> {
        self.write_bytes(&[value])
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), FileError> {
        self.write_u8(u8::from(value))
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), FileError> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), FileError> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<(), FileError> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), FileError> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<(), FileError> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_uuid(&mut self, value: Uuid) -> Result<(), FileError> {
        self.write_bytes(value.as_bytes())
    }

    /// 字符串：u32字节长度 + UTF-8内容
    pub fn write_string(&mut self, value: &str) -> Result<(), FileError> {
        let length = u32::try_from(value.len())
            .map_err(|_| FileError::BadChunk("string exceeds u32 length".into()))?;
        self.write_u32(length)?;
        self.write_bytes(value.as_bytes())
    }

    /// 字节串：u32长度 + 内容
    pub fn write_byte_block(&mut self, value: &[u8]) -> Result<(), FileError> {
        let length = u32::try_from(value.len())
            .map_err(|_| FileError::BadChunk("byte block exceeds u32 length".into()))?;
        self.write_u32(length)?;
        self.write_bytes(value)
    }

    /// 写记录版本对（专用原语，区别于块头）
    pub fn write_record_version(&mut self, major: i32, minor: i32) -> Result<(), FileError> {
        self.write_u8(RECORD_VERSION_MARKER)?;
        self.write_i32(major)?;
        self.write_i32(minor)
    }
}

#[derive(Debug)]
struct OpenChunk {
    typecode: u32,
    remaining: u32,
    checksum: ChunkChecksum,
}

/// 块读取器
///
/// 维护一叠打开中的块；所有读取都同时推进各层剩余字节数与校验，
/// `end_chunk` 跳过未读payload、核对尾部校验值后弹栈，
/// 使流始终停在下一个兄弟块的边界上（重新同步规则）。
#[derive(Debug)]
pub struct ChunkReader<R: Read> {
    input: R,
    stack: Vec<OpenChunk>,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            stack: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// 最内层块的未读payload字节数（没有打开块时为0）
    pub fn remaining(&self) -> u32 {
        self.stack.last().map(|chunk| chunk.remaining).unwrap_or(0)
    }

    /// 最内层块的typecode
    pub fn current_typecode(&self) -> Option<u32> {
        self.stack.last().map(|chunk| chunk.typecode)
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> Result<(), FileError> {
        let length = buf.len() as u32;
        for chunk in &self.stack {
            if chunk.remaining < length {
                return Err(FileError::BadChunk(format!(
                    "read of {length} bytes crosses chunk boundary (typecode {:#010x})",
                    chunk.typecode
                )));
            }
        }
        self.input.read_exact(buf)?;
        for chunk in &mut self.stack {
            chunk.remaining -= length;
            chunk.checksum.update(buf);
        }
        Ok(())
    }

    /// 打开下一个块，返回 (typecode, payload长度)
    pub fn begin_chunk(&mut self) -> Result<(u32, u32), FileError> {
        let typecode = self.read_u32_raw()?;
        let length = self.read_u32_raw()?;
        if let Some(parent) = self.stack.last() {
            // 子块payload与尾部校验都要落在父块预算内
            if parent.remaining < length.saturating_add(4) {
                return Err(FileError::BadChunk(format!(
                    "nested chunk {typecode:#010x} does not fit in parent chunk"
                )));
            }
        }
        self.stack.push(OpenChunk {
            typecode,
            remaining: length,
            checksum: ChunkChecksum::default(),
        });
        Ok((typecode, length))
    }

    fn read_u32_raw(&mut self) -> Result<u32, FileError> {
        let mut buf = [0u8; 4];
        self.read_raw(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// 关闭最内层块
    ///
    /// 跳过未读字节（计入校验），核对尾部校验值。每个 `begin_chunk`
    /// 在所有退出路径上都必须配对调用本方法。
    pub fn end_chunk(&mut self) -> Result<(), FileError> {
        if self.stack.is_empty() {
            return Err(FileError::BadChunk("end_chunk without begin_chunk".into()));
        }

        // 跳过未读payload
        let mut scratch = [0u8; 256];
        while self.remaining() > 0 {
            let take = (self.remaining() as usize).min(scratch.len());
            self.read_raw(&mut scratch[..take])?;
        }

        let chunk = self.stack.pop().expect("checked non-empty");
        let mut trailer = [0u8; 4];
        self.read_raw(&mut trailer)?;
        let expected = u32::from_le_bytes(trailer);
        if chunk.checksum.finish() != expected {
            return Err(FileError::ChecksumMismatch {
                typecode: chunk.typecode,
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, FileError> {
        let mut buf = [0u8; 1];
        self.read_raw(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, FileError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i32(&mut self) -> Result<i32, FileError> {
        let mut buf = [0u8; 4];
        self.read_raw(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    pub fn read_u32(&mut self) -> Result<u32, FileError> {
        self.read_u32_raw()
    }

    pub fn read_i64(&mut self) -> Result<i64, FileError> {
        let mut buf = [0u8; 8];
        self.read_raw(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> Result<u64, FileError> {
        let mut buf = [0u8; 8];
        self.read_raw(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_f64(&mut self) -> Result<f64, FileError> {
        let mut buf = [0u8; 8];
        self.read_raw(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    pub fn read_uuid(&mut self) -> Result<Uuid, FileError> {
        let mut buf = [0u8; 16];
        self.read_raw(&mut buf)?;
        Ok(Uuid::from_bytes(buf))
    }

    /// 声明长度必须落在当前块的未读预算内，再按它分配缓冲
    ///
    /// 先检查后分配：损坏文件谎报近4GiB的长度时得到BadChunk，
    /// 而不是先吞一次巨量分配。
    fn read_length_checked(&mut self) -> Result<usize, FileError> {
        let length = self.read_u32()?;
        if length > self.remaining() {
            return Err(FileError::BadChunk(format!(
                "declared length {length} exceeds {} unread chunk bytes",
                self.remaining()
            )));
        }
        Ok(length as usize)
    }

    pub fn read_string(&mut self) -> Result<String, FileError> {
        let length = self.read_length_checked()?;
        let mut buf = vec![0u8; length];
        self.read_raw(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|_| FileError::RecordDecode("string is not valid UTF-8".into()))
    }

    pub fn read_byte_block(&mut self) -> Result<Vec<u8>, FileError> {
        let length = self.read_length_checked()?;
        let mut buf = vec![0u8; length];
        self.read_raw(&mut buf)?;
        Ok(buf)
    }

    /// 读记录版本对
    pub fn read_record_version(&mut self) -> Result<(i32, i32), FileError> {
        let marker = self.read_u8()?;
        if marker != RECORD_VERSION_MARKER {
            return Err(FileError::BadChunk(format!(
                "expected record version marker, found {marker:#04x}"
            )));
        }
        let major = self.read_i32()?;
        let minor = self.read_i32()?;
        Ok((major, minor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_chunk_roundtrip() {
        let mut writer = ChunkWriter::new(Vec::new());
        writer.begin_chunk(0x10).unwrap();
        writer.write_i32(-7).unwrap();
        writer.begin_chunk(0x11).unwrap();
        writer.write_string("嵌套").unwrap();
        writer.write_f64(2.5).unwrap();
        writer.end_chunk().unwrap();
        writer.write_bool(true).unwrap();
        writer.end_chunk().unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = ChunkReader::new(bytes.as_slice());
        let (typecode, _) = reader.begin_chunk().unwrap();
        assert_eq!(typecode, 0x10);
        assert_eq!(reader.read_i32().unwrap(), -7);

        let (inner, _) = reader.begin_chunk().unwrap();
        assert_eq!(inner, 0x11);
        assert_eq!(reader.read_string().unwrap(), "嵌套");
        // 未读的f64由end_chunk跳过
        reader.end_chunk().unwrap();

        assert!(reader.read_bool().unwrap());
        reader.end_chunk().unwrap();
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let mut writer = ChunkWriter::new(Vec::new());
        writer.begin_chunk(0x20).unwrap();
        writer.write_u64(42).unwrap();
        writer.end_chunk().unwrap();
        let mut bytes = writer.finish().unwrap();

        // 篡改payload中的一个字节
        bytes[9] ^= 0xFF;

        let mut reader = ChunkReader::new(bytes.as_slice());
        reader.begin_chunk().unwrap();
        let err = reader.end_chunk();
        assert!(matches!(
            err,
            Err(FileError::ChecksumMismatch { typecode: 0x20 })
        ));
    }

    #[test]
    fn test_read_past_chunk_end_is_structural() {
        let mut writer = ChunkWriter::new(Vec::new());
        writer.begin_chunk(0x30).unwrap();
        writer.write_u8(1).unwrap();
        writer.end_chunk().unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = ChunkReader::new(bytes.as_slice());
        reader.begin_chunk().unwrap();
        reader.read_u8().unwrap();
        let err = reader.read_u32();
        assert!(matches!(err, Err(FileError::BadChunk(_))));
    }

    #[test]
    fn test_record_version_roundtrip() {
        let mut writer = ChunkWriter::new(Vec::new());
        writer.begin_chunk(0x40).unwrap();
        writer.write_record_version(1, 3).unwrap();
        writer.end_chunk().unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = ChunkReader::new(bytes.as_slice());
        reader.begin_chunk().unwrap();
        assert_eq!(reader.read_record_version().unwrap(), (1, 3));
        reader.end_chunk().unwrap();
    }

    #[test]
    fn test_oversized_length_rejected_before_alloc() {
        // 块payload只有4字节，却声明近4GiB的字符串长度
        let mut writer = ChunkWriter::new(Vec::new());
        writer.begin_chunk(0x60).unwrap();
        writer.write_u32(0xFFFF_FFF0).unwrap();
        writer.end_chunk().unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = ChunkReader::new(bytes.as_slice());
        reader.begin_chunk().unwrap();
        assert!(matches!(reader.read_string(), Err(FileError::BadChunk(_))));

        let mut reader = ChunkReader::new(bytes.as_slice());
        reader.begin_chunk().unwrap();
        assert!(matches!(
            reader.read_byte_block(),
            Err(FileError::BadChunk(_))
        ));
    }

    #[test]
    fn test_unbalanced_writer_rejected() {
        let mut writer = ChunkWriter::new(Vec::new());
        writer.begin_chunk(0x50).unwrap();
        assert!(matches!(
            writer.finish(),
            Err(FileError::BadChunk(_))
        ));
    }
}
