//! 表协议
//!
//! 归档主体是一串表块，每张表内是一串记录块。表的打开/关闭
//! 必须严格配对，且每张表在一次读/写会话中只能经历一次
//! NotStarted -> Started -> Finished；违反协议是结构性错误。
//!
//! 读侧在找目标表时跳过不认识的块，为将来插入新表留出余地。

use crate::chunk::{ChunkReader, ChunkWriter};
use crate::error::FileError;
use rustc_hash::FxHashMap;
use std::io::{Read, Write};
use zdoc_core::component::ComponentType;

/// 块typecode
pub mod typecode {
    /// 文档元数据
    pub const PROPERTIES: u32 = 0x0000_0010;
    /// 文档设置
    pub const SETTINGS: u32 = 0x0000_0011;
    /// 插件自定义表
    pub const USER_TABLE: u32 = 0x0000_0012;
    /// 归档结束标记
    pub const END_MARK: u32 = 0xFFFF_FFFF;

    /// 表内记录块
    pub const RECORD: u32 = 0x0000_0001;

    pub const IMAGE_TABLE: u32 = 0x0000_0101;
    pub const TEXTURE_MAPPING_TABLE: u32 = 0x0000_0102;
    pub const RENDER_MATERIAL_TABLE: u32 = 0x0000_0103;
    pub const LINE_PATTERN_TABLE: u32 = 0x0000_0104;
    pub const LAYER_TABLE: u32 = 0x0000_0105;
    pub const GROUP_TABLE: u32 = 0x0000_0106;
    pub const TEXT_STYLE_TABLE: u32 = 0x0000_0107;
    pub const DIM_STYLE_TABLE: u32 = 0x0000_0108;
    pub const RENDER_LIGHT_TABLE: u32 = 0x0000_0109;
    pub const HATCH_PATTERN_TABLE: u32 = 0x0000_010A;
    pub const INSTANCE_DEFINITION_TABLE: u32 = 0x0000_010B;
    pub const MODEL_GEOMETRY_TABLE: u32 = 0x0000_010C;
    pub const HISTORY_RECORD_TABLE: u32 = 0x0000_010D;
}

/// 组件类型对应的表typecode
pub fn table_typecode(component_type: ComponentType) -> Option<u32> {
    Some(match component_type {
        ComponentType::Image => typecode::IMAGE_TABLE,
        ComponentType::TextureMapping => typecode::TEXTURE_MAPPING_TABLE,
        ComponentType::RenderMaterial => typecode::RENDER_MATERIAL_TABLE,
        ComponentType::LinePattern => typecode::LINE_PATTERN_TABLE,
        ComponentType::Layer => typecode::LAYER_TABLE,
        ComponentType::Group => typecode::GROUP_TABLE,
        ComponentType::TextStyle => typecode::TEXT_STYLE_TABLE,
        ComponentType::DimStyle => typecode::DIM_STYLE_TABLE,
        ComponentType::RenderLight => typecode::RENDER_LIGHT_TABLE,
        ComponentType::HatchPattern => typecode::HATCH_PATTERN_TABLE,
        ComponentType::InstanceDefinition => typecode::INSTANCE_DEFINITION_TABLE,
        ComponentType::ModelGeometry => typecode::MODEL_GEOMETRY_TABLE,
        ComponentType::HistoryRecord => typecode::HISTORY_RECORD_TABLE,
        _ => return None,
    })
}

/// 单表生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TableState {
    #[default]
    NotStarted,
    Started,
    Finished,
}

/// 表写入器
#[derive(Debug)]
pub struct TableWriter<'a, W: Write> {
    writer: &'a mut ChunkWriter<W>,
    states: FxHashMap<u32, TableState>,
    open_table: Option<u32>,
    record_open: bool,
}

impl<'a, W: Write> TableWriter<'a, W> {
    pub fn new(writer: &'a mut ChunkWriter<W>) -> Self {
        Self {
            writer,
            states: FxHashMap::default(),
            open_table: None,
            record_open: false,
        }
    }

    pub fn inner(&mut self) -> &mut ChunkWriter<W> {
        &mut *self.writer
    }

    /// 打开一张表
    pub fn begin_table(&mut self, typecode: u32) -> Result<(), FileError> {
        if let Some(open) = self.open_table {
            return Err(FileError::TableState(format!(
                "table {typecode:#010x} opened while table {open:#010x} is still open"
            )));
        }
        let state = self.states.entry(typecode).or_default();
        if *state != TableState::NotStarted {
            return Err(FileError::TableState(format!(
                "table {typecode:#010x} opened twice"
            )));
        }
        *state = TableState::Started;
        self.writer.begin_chunk(typecode)?;
        self.open_table = Some(typecode);
        Ok(())
    }

    /// 在打开的表里开一条记录
    pub fn begin_record(&mut self) -> Result<&mut ChunkWriter<W>, FileError> {
        if self.open_table.is_none() {
            return Err(FileError::TableState("record outside a table".into()));
        }
        if self.record_open {
            return Err(FileError::TableState("record already open".into()));
        }
        self.writer.begin_chunk(typecode::RECORD)?;
        self.record_open = true;
        Ok(&mut *self.writer)
    }

    pub fn end_record(&mut self) -> Result<(), FileError> {
        if !self.record_open {
            return Err(FileError::TableState("end_record without begin_record".into()));
        }
        self.writer.end_chunk()?;
        self.record_open = false;
        Ok(())
    }

    /// 关闭当前表
    pub fn end_table(&mut self) -> Result<(), FileError> {
        if self.record_open {
            return Err(FileError::TableState("table closed with an open record".into()));
        }
        let typecode = self
            .open_table
            .take()
            .ok_or_else(|| FileError::TableState("end_table without begin_table".into()))?;
        self.writer.end_chunk()?;
        self.states.insert(typecode, TableState::Finished);
        Ok(())
    }
}

/// 表读取器
#[derive(Debug)]
pub struct TableReader<'a, R: Read> {
    reader: &'a mut ChunkReader<R>,
    states: FxHashMap<u32, TableState>,
    open_table: Option<u32>,
    record_open: bool,
}

impl<'a, R: Read> TableReader<'a, R> {
    pub fn new(reader: &'a mut ChunkReader<R>) -> Self {
        Self {
            reader,
            states: FxHashMap::default(),
            open_table: None,
            record_open: false,
        }
    }

    pub fn inner(&mut self) -> &mut ChunkReader<R> {
        &mut *self.reader
    }

    /// 定位并打开目标表
    ///
    /// 途中不认识的块整块跳过；先遇到归档结束标记说明表缺失。
    pub fn begin_table(&mut self, typecode: u32) -> Result<(), FileError> {
        if let Some(open) = self.open_table {
            return Err(FileError::TableState(format!(
                "table {typecode:#010x} opened while table {open:#010x} is still open"
            )));
        }
        let state = self.states.entry(typecode).or_default();
        if *state != TableState::NotStarted {
            return Err(FileError::TableState(format!(
                "table {typecode:#010x} read twice"
            )));
        }

        loop {
            let (found, _) = self.reader.begin_chunk()?;
            if found == typecode {
                break;
            }
            if found == typecode::END_MARK {
                return Err(FileError::BadChunk(format!(
                    "table {typecode:#010x} missing from archive"
                )));
            }
            // 不认识的块：跳过
            self.reader.end_chunk()?;
        }

        self.states.insert(typecode, TableState::Started);
        self.open_table = Some(typecode);
        Ok(())
    }

    /// 打开下一条记录；表读尽时返回None
    pub fn begin_record(&mut self) -> Result<Option<&mut ChunkReader<R>>, FileError> {
        if self.open_table.is_none() {
            return Err(FileError::TableState("record outside a table".into()));
        }
        if self.record_open {
            return Err(FileError::TableState("record already open".into()));
        }
        if self.reader.remaining() == 0 {
            return Ok(None);
        }
        let (found, _) = self.reader.begin_chunk()?;
        if found != typecode::RECORD {
            return Err(FileError::BadChunk(format!(
                "expected record chunk, found {found:#010x}"
            )));
        }
        self.record_open = true;
        Ok(Some(&mut *self.reader))
    }

    /// 关闭当前记录（剩余未读字节跳过并校验）
    pub fn end_record(&mut self) -> Result<(), FileError> {
        if !self.record_open {
            return Err(FileError::TableState("end_record without begin_record".into()));
        }
        self.record_open = false;
        self.reader.end_chunk()
    }

    /// 关闭当前表（剩余未读记录跳过并校验）
    pub fn end_table(&mut self) -> Result<(), FileError> {
        if self.record_open {
            return Err(FileError::TableState("table closed with an open record".into()));
        }
        let typecode = self
            .open_table
            .take()
            .ok_or_else(|| FileError::TableState("end_table without begin_table".into()))?;
        self.reader.end_chunk()?;
        self.states.insert(typecode, TableState::Finished);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive_with_two_tables() -> Vec<u8> {
        let mut chunks = ChunkWriter::new(Vec::new());
        let mut tables = TableWriter::new(&mut chunks);

        tables.begin_table(typecode::LAYER_TABLE).unwrap();
        tables.begin_record().unwrap().write_i32(11).unwrap();
        tables.end_record().unwrap();
        tables.begin_record().unwrap().write_i32(22).unwrap();
        tables.end_record().unwrap();
        tables.end_table().unwrap();

        // 模拟将来插入的未知表
        chunks.begin_chunk(0x0000_0999).unwrap();
        chunks.write_u64(0xDEAD_BEEF).unwrap();
        chunks.end_chunk().unwrap();

        let mut tables = TableWriter::new(&mut chunks);
        tables.begin_table(typecode::GROUP_TABLE).unwrap();
        tables.begin_record().unwrap().write_i32(33).unwrap();
        tables.end_record().unwrap();
        tables.end_table().unwrap();

        chunks.finish().unwrap()
    }

    #[test]
    fn test_table_roundtrip_with_unknown_chunk() {
        let bytes = archive_with_two_tables();
        let mut chunks = ChunkReader::new(bytes.as_slice());
        let mut tables = TableReader::new(&mut chunks);

        tables.begin_table(typecode::LAYER_TABLE).unwrap();
        let mut values = Vec::new();
        while let Some(reader) = tables.begin_record().unwrap() {
            values.push(reader.read_i32().unwrap());
            tables.end_record().unwrap();
        }
        tables.end_table().unwrap();
        assert_eq!(values, vec![11, 22]);

        // 未知块被begin_table跳过
        tables.begin_table(typecode::GROUP_TABLE).unwrap();
        let reader = tables.begin_record().unwrap().unwrap();
        assert_eq!(reader.read_i32().unwrap(), 33);
        tables.end_record().unwrap();
        assert!(tables.begin_record().unwrap().is_none());
        tables.end_table().unwrap();
    }

    #[test]
    fn test_partially_read_record_is_skipped() {
        let bytes = archive_with_two_tables();
        let mut chunks = ChunkReader::new(bytes.as_slice());
        let mut tables = TableReader::new(&mut chunks);

        tables.begin_table(typecode::LAYER_TABLE).unwrap();
        // 第一条记录完全不读
        assert!(tables.begin_record().unwrap().is_some());
        tables.end_record().unwrap();
        let reader = tables.begin_record().unwrap().unwrap();
        assert_eq!(reader.read_i32().unwrap(), 22);
        tables.end_record().unwrap();
        tables.end_table().unwrap();
    }

    #[test]
    fn test_protocol_violations() {
        let mut writer = ChunkWriter::new(Vec::new());
        let mut tables = TableWriter::new(&mut writer);

        assert!(matches!(
            tables.end_table(),
            Err(FileError::TableState(_))
        ));

        tables.begin_table(typecode::LAYER_TABLE).unwrap();
        assert!(matches!(
            tables.begin_table(typecode::GROUP_TABLE),
            Err(FileError::TableState(_))
        ));

        tables.begin_record().unwrap();
        assert!(matches!(
            tables.end_table(),
            Err(FileError::TableState(_))
        ));
        tables.end_record().unwrap();
        tables.end_table().unwrap();

        // 同一张表不能再开
        assert!(matches!(
            tables.begin_table(typecode::LAYER_TABLE),
            Err(FileError::TableState(_))
        ));
    }

    #[test]
    fn test_missing_table_reported() {
        let mut writer = ChunkWriter::new(Vec::new());
        writer.begin_chunk(typecode::END_MARK).unwrap();
        writer.end_chunk().unwrap();
        let bytes = writer.finish().unwrap();

        let mut chunks = ChunkReader::new(bytes.as_slice());
        let mut tables = TableReader::new(&mut chunks);
        assert!(matches!(
            tables.begin_table(typecode::LAYER_TABLE),
            Err(FileError::BadChunk(_))
        ));
    }
}
