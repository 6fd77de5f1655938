//! 记录编解码
//!
//! 每条组件记录自带版本对 `(major, minor)`：
//! - major不符直接拒绝（结构性错误）
//! - minor只做能力判断，新minor附加的字段旧读取器按默认值处理
//!
//! 字段分两段：必读的顺序字段在前，之后是标签驱动的可选字段——
//! `标签(u8) + 值`，标签严格递增，0为结束标记；写侧只写非默认值，
//! 读侧遇到高于本版本上限的标签视作记录结束（剩余字节由块机制跳过）。

use crate::chunk::{ChunkReader, ChunkWriter};
use crate::error::FileError;
use std::io::{Read, Write};
use uuid::Uuid;
use zdoc_core::component::{Component, ComponentBase, ComponentType};
use zdoc_core::geometry_object::{BoundingBox3, ColorSource, ModelGeometry, ObjectAttributes};
use zdoc_core::group::Group;
use zdoc_core::history::HistoryRecord;
use zdoc_core::instance::InstanceDefinition;
use zdoc_core::layer::Layer;
use zdoc_core::light::{LightKind, RenderLight};
use zdoc_core::linetype::LinePattern;
use zdoc_core::material::{Image, MappingKind, RenderMaterial, TextureMapping};
use zdoc_core::model::{DocumentProperties, DocumentSettings, UnitSystem};
use zdoc_core::properties::Color;
use zdoc_core::style::{DimStyle, HatchLine, HatchPattern, TextStyle};

/// 组件记录的major版本（不认识的major整表中止）
pub const RECORD_MAJOR: i32 = 1;

/// 目标归档版本对应的记录minor版本
pub fn record_minor_for(target_version: u32) -> i32 {
    if target_version >= 2 {
        1
    } else {
        0
    }
}

/// 可归档记录
///
/// `target_version` 控制写侧省略新版本才有的字段，
/// 让新代码仍能产出旧版本可读的归档。
pub trait ArchiveComponent: Sized {
    fn write_record<W: Write>(
        &self,
        writer: &mut ChunkWriter<W>,
        target_version: u32,
    ) -> Result<(), FileError>;

    fn read_record<R: Read>(reader: &mut ChunkReader<R>) -> Result<Self, FileError>;
}

/// 标签段写入器
///
/// 维护上一个已写标签，调试构建下断言严格递增。
pub struct TagWriter<'a, W: Write> {
    writer: &'a mut ChunkWriter<W>,
    last_tag: u8,
}

impl<'a, W: Write> TagWriter<'a, W> {
    pub fn new(writer: &'a mut ChunkWriter<W>) -> Self {
        Self {
            writer,
            last_tag: 0,
        }
    }

    /// 写一个标签字节，返回底层写入器供写值
    pub fn tag(&mut self, tag: u8) -> Result<&mut ChunkWriter<W>, FileError> {
        debug_assert!(tag > self.last_tag, "tags must be strictly increasing");
        self.last_tag = tag;
        self.writer.write_u8(tag)?;
        Ok(&mut *self.writer)
    }

    /// 写结束标记
    pub fn finish(self) -> Result<(), FileError> {
        self.writer.write_u8(0)
    }
}

/// 读下一个标签字节；0为结束，高于 `ceiling` 的未知标签同样按结束处理
pub fn read_tag<R: Read>(reader: &mut ChunkReader<R>, ceiling: u8) -> Result<u8, FileError> {
    let tag = reader.read_u8()?;
    if tag > ceiling {
        return Ok(0);
    }
    Ok(tag)
}

fn read_version<R: Read>(reader: &mut ChunkReader<R>) -> Result<i32, FileError> {
    let (major, minor) = reader.read_record_version()?;
    if major != RECORD_MAJOR {
        return Err(FileError::BadMajorVersion {
            expected: RECORD_MAJOR,
            found: major,
        });
    }
    Ok(minor)
}

fn write_base<W: Write>(writer: &mut ChunkWriter<W>, base: &ComponentBase) -> Result<(), FileError> {
    writer.write_uuid(base.id)?;
    writer.write_i32(base.index)?;
    writer.write_string(&base.name)?;
    writer.write_uuid(base.parent_id)
}

fn read_base<R: Read>(reader: &mut ChunkReader<R>) -> Result<ComponentBase, FileError> {
    Ok(ComponentBase {
        id: reader.read_uuid()?,
        index: reader.read_i32()?,
        name: reader.read_string()?,
        parent_id: reader.read_uuid()?,
    })
}

fn write_uuid_list<W: Write>(writer: &mut ChunkWriter<W>, ids: &[Uuid]) -> Result<(), FileError> {
    writer.write_u32(ids.len() as u32)?;
    for id in ids {
        writer.write_uuid(*id)?;
    }
    Ok(())
}

fn read_uuid_list<R: Read>(reader: &mut ChunkReader<R>) -> Result<Vec<Uuid>, FileError> {
    let count = reader.read_u32()? as usize;
    let mut ids = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        ids.push(reader.read_uuid()?);
    }
    Ok(ids)
}

fn mapping_kind_to_u8(kind: MappingKind) -> u8 {
    match kind {
        MappingKind::Surface => 0,
        MappingKind::Planar => 1,
        MappingKind::Cylindrical => 2,
        MappingKind::Spherical => 3,
        MappingKind::Box => 4,
    }
}

fn mapping_kind_from_u8(raw: u8) -> Result<MappingKind, FileError> {
    Ok(match raw {
        0 => MappingKind::Surface,
        1 => MappingKind::Planar,
        2 => MappingKind::Cylindrical,
        3 => MappingKind::Spherical,
        4 => MappingKind::Box,
        _ => return Err(FileError::RecordDecode(format!("unknown mapping kind {raw}"))),
    })
}

fn light_kind_to_u8(kind: LightKind) -> u8 {
    match kind {
        LightKind::Point => 0,
        LightKind::Directional => 1,
        LightKind::Spot => 2,
    }
}

fn light_kind_from_u8(raw: u8) -> Result<LightKind, FileError> {
    Ok(match raw {
        0 => LightKind::Point,
        1 => LightKind::Directional,
        2 => LightKind::Spot,
        _ => return Err(FileError::RecordDecode(format!("unknown light kind {raw}"))),
    })
}

fn color_source_to_u8(source: ColorSource) -> u8 {
    match source {
        ColorSource::FromLayer => 0,
        ColorSource::FromObject => 1,
    }
}

fn color_source_from_u8(raw: u8) -> Result<ColorSource, FileError> {
    Ok(match raw {
        0 => ColorSource::FromLayer,
        1 => ColorSource::FromObject,
        _ => return Err(FileError::RecordDecode(format!("unknown color source {raw}"))),
    })
}

fn unit_system_to_u8(unit: UnitSystem) -> u8 {
    match unit {
        UnitSystem::Millimeters => 0,
        UnitSystem::Centimeters => 1,
        UnitSystem::Meters => 2,
        UnitSystem::Inches => 3,
        UnitSystem::Feet => 4,
    }
}

fn unit_system_from_u8(raw: u8) -> Result<UnitSystem, FileError> {
    Ok(match raw {
        0 => UnitSystem::Millimeters,
        1 => UnitSystem::Centimeters,
        2 => UnitSystem::Meters,
        3 => UnitSystem::Inches,
        4 => UnitSystem::Feet,
        _ => return Err(FileError::RecordDecode(format!("unknown unit system {raw}"))),
    })
}

impl ArchiveComponent for Image {
    fn write_record<W: Write>(
        &self,
        writer: &mut ChunkWriter<W>,
        target_version: u32,
    ) -> Result<(), FileError> {
        writer.write_record_version(RECORD_MAJOR, record_minor_for(target_version))?;
        write_base(writer, &self.base)?;

        let mut tags = TagWriter::new(writer);
        if !self.source_path.is_empty() {
            tags.tag(1)?.write_string(&self.source_path)?;
        }
        if self.width != 0 {
            tags.tag(2)?.write_u32(self.width)?;
        }
        if self.height != 0 {
            tags.tag(3)?.write_u32(self.height)?;
        }
        tags.finish()
    }

    fn read_record<R: Read>(reader: &mut ChunkReader<R>) -> Result<Self, FileError> {
        read_version(reader)?;
        let mut image = Image {
            base: read_base(reader)?,
            ..Image::default()
        };
        loop {
            match read_tag(reader, 3)? {
                0 => break,
                1 => image.source_path = reader.read_string()?,
                2 => image.width = reader.read_u32()?,
                3 => image.height = reader.read_u32()?,
                _ => break,
            }
        }
        Ok(image)
    }
}

impl ArchiveComponent for TextureMapping {
    fn write_record<W: Write>(
        &self,
        writer: &mut ChunkWriter<W>,
        target_version: u32,
    ) -> Result<(), FileError> {
        writer.write_record_version(RECORD_MAJOR, record_minor_for(target_version))?;
        write_base(writer, &self.base)?;
        writer.write_u8(mapping_kind_to_u8(self.kind))?;

        let mut tags = TagWriter::new(writer);
        if self.uv_scale != [1.0, 1.0] {
            let writer = tags.tag(1)?;
            writer.write_f64(self.uv_scale[0])?;
            writer.write_f64(self.uv_scale[1])?;
        }
        tags.finish()
    }

    fn read_record<R: Read>(reader: &mut ChunkReader<R>) -> Result<Self, FileError> {
        read_version(reader)?;
        let mut mapping = TextureMapping {
            base: read_base(reader)?,
            kind: mapping_kind_from_u8(reader.read_u8()?)?,
            ..TextureMapping::default()
        };
        loop {
            match read_tag(reader, 1)? {
                0 => break,
                1 => mapping.uv_scale = [reader.read_f64()?, reader.read_f64()?],
                _ => break,
            }
        }
        Ok(mapping)
    }
}

impl ArchiveComponent for RenderMaterial {
    fn write_record<W: Write>(
        &self,
        writer: &mut ChunkWriter<W>,
        target_version: u32,
    ) -> Result<(), FileError> {
        writer.write_record_version(RECORD_MAJOR, record_minor_for(target_version))?;
        write_base(writer, &self.base)?;
        writer.write_u32(self.diffuse.to_u32())?;

        let mut tags = TagWriter::new(writer);
        if self.shine != 0.0 {
            tags.tag(1)?.write_f64(self.shine)?;
        }
        if self.transparency != 0.0 {
            tags.tag(2)?.write_f64(self.transparency)?;
        }
        if self.texture_image_index >= 0 {
            tags.tag(3)?.write_i32(self.texture_image_index)?;
        }
        tags.finish()
    }

    fn read_record<R: Read>(reader: &mut ChunkReader<R>) -> Result<Self, FileError> {
        read_version(reader)?;
        let mut material = RenderMaterial {
            base: read_base(reader)?,
            diffuse: Color::from_u32(reader.read_u32()?),
            ..RenderMaterial::default()
        };
        loop {
            match read_tag(reader, 3)? {
                0 => break,
                1 => material.shine = reader.read_f64()?,
                2 => material.transparency = reader.read_f64()?,
                3 => material.texture_image_index = reader.read_i32()?,
                _ => break,
            }
        }
        Ok(material)
    }
}

impl ArchiveComponent for LinePattern {
    fn write_record<W: Write>(
        &self,
        writer: &mut ChunkWriter<W>,
        target_version: u32,
    ) -> Result<(), FileError> {
        writer.write_record_version(RECORD_MAJOR, record_minor_for(target_version))?;
        write_base(writer, &self.base)?;

        let mut tags = TagWriter::new(writer);
        if !self.segments.is_empty() {
            let writer = tags.tag(1)?;
            writer.write_u32(self.segments.len() as u32)?;
            for segment in &self.segments {
                writer.write_f64(*segment)?;
            }
        }
        tags.finish()
    }

    fn read_record<R: Read>(reader: &mut ChunkReader<R>) -> Result<Self, FileError> {
        read_version(reader)?;
        let mut pattern = LinePattern {
            base: read_base(reader)?,
            ..LinePattern::default()
        };
        loop {
            match read_tag(reader, 1)? {
                0 => break,
                1 => {
                    let count = reader.read_u32()? as usize;
                    let mut segments = Vec::with_capacity(count.min(1024));
                    for _ in 0..count {
                        segments.push(reader.read_f64()?);
                    }
                    pattern.segments = segments;
                }
                _ => break,
            }
        }
        Ok(pattern)
    }
}

impl ArchiveComponent for Layer {
    fn write_record<W: Write>(
        &self,
        writer: &mut ChunkWriter<W>,
        target_version: u32,
    ) -> Result<(), FileError> {
        let minor = record_minor_for(target_version);
        writer.write_record_version(RECORD_MAJOR, minor)?;
        write_base(writer, &self.base)?;
        writer.write_u32(self.color.to_u32())?;

        let mut tags = TagWriter::new(writer);
        if !self.visible {
            tags.tag(1)?.write_bool(self.visible)?;
        }
        if self.locked {
            tags.tag(2)?.write_bool(self.locked)?;
        }
        if self.line_pattern_index >= 0 {
            tags.tag(3)?.write_i32(self.line_pattern_index)?;
        }
        // 材质引用是minor 1新增字段，写旧版本时省略
        if minor >= 1 && self.render_material_index >= 0 {
            tags.tag(4)?.write_i32(self.render_material_index)?;
        }
        tags.finish()
    }

    fn read_record<R: Read>(reader: &mut ChunkReader<R>) -> Result<Self, FileError> {
        read_version(reader)?;
        let mut layer = Layer {
            base: read_base(reader)?,
            color: Color::from_u32(reader.read_u32()?),
            ..Layer::default()
        };
        loop {
            match read_tag(reader, 4)? {
                0 => break,
                1 => layer.visible = reader.read_bool()?,
                2 => layer.locked = reader.read_bool()?,
                3 => layer.line_pattern_index = reader.read_i32()?,
                4 => layer.render_material_index = reader.read_i32()?,
                _ => break,
            }
        }
        Ok(layer)
    }
}

impl ArchiveComponent for Group {
    fn write_record<W: Write>(
        &self,
        writer: &mut ChunkWriter<W>,
        target_version: u32,
    ) -> Result<(), FileError> {
        writer.write_record_version(RECORD_MAJOR, record_minor_for(target_version))?;
        write_base(writer, &self.base)?;

        let mut tags = TagWriter::new(writer);
        if !self.member_ids.is_empty() {
            write_uuid_list(tags.tag(1)?, &self.member_ids)?;
        }
        tags.finish()
    }

    fn read_record<R: Read>(reader: &mut ChunkReader<R>) -> Result<Self, FileError> {
        read_version(reader)?;
        let mut group = Group {
            base: read_base(reader)?,
            ..Group::default()
        };
        loop {
            match read_tag(reader, 1)? {
                0 => break,
                1 => group.member_ids = read_uuid_list(reader)?,
                _ => break,
            }
        }
        Ok(group)
    }
}

impl ArchiveComponent for TextStyle {
    fn write_record<W: Write>(
        &self,
        writer: &mut ChunkWriter<W>,
        target_version: u32,
    ) -> Result<(), FileError> {
        writer.write_record_version(RECORD_MAJOR, record_minor_for(target_version))?;
        write_base(writer, &self.base)?;
        writer.write_string(&self.font_name)?;

        let mut tags = TagWriter::new(writer);
        if self.bold {
            tags.tag(1)?.write_bool(self.bold)?;
        }
        if self.italic {
            tags.tag(2)?.write_bool(self.italic)?;
        }
        tags.finish()
    }

    fn read_record<R: Read>(reader: &mut ChunkReader<R>) -> Result<Self, FileError> {
        read_version(reader)?;
        let mut style = TextStyle {
            base: read_base(reader)?,
            font_name: reader.read_string()?,
            ..TextStyle::default()
        };
        loop {
            match read_tag(reader, 2)? {
                0 => break,
                1 => style.bold = reader.read_bool()?,
                2 => style.italic = reader.read_bool()?,
                _ => break,
            }
        }
        Ok(style)
    }
}

impl ArchiveComponent for DimStyle {
    fn write_record<W: Write>(
        &self,
        writer: &mut ChunkWriter<W>,
        target_version: u32,
    ) -> Result<(), FileError> {
        writer.write_record_version(RECORD_MAJOR, record_minor_for(target_version))?;
        write_base(writer, &self.base)?;

        let defaults = DimStyle::default();
        let mut tags = TagWriter::new(writer);
        if self.text_height != defaults.text_height {
            tags.tag(1)?.write_f64(self.text_height)?;
        }
        if self.arrow_size != defaults.arrow_size {
            tags.tag(2)?.write_f64(self.arrow_size)?;
        }
        if self.text_style_index >= 0 {
            tags.tag(3)?.write_i32(self.text_style_index)?;
        }
        tags.finish()
    }

    fn read_record<R: Read>(reader: &mut ChunkReader<R>) -> Result<Self, FileError> {
        read_version(reader)?;
        let mut style = DimStyle {
            base: read_base(reader)?,
            ..DimStyle::default()
        };
        loop {
            match read_tag(reader, 3)? {
                0 => break,
                1 => style.text_height = reader.read_f64()?,
                2 => style.arrow_size = reader.read_f64()?,
                3 => style.text_style_index = reader.read_i32()?,
                _ => break,
            }
        }
        Ok(style)
    }
}

impl ArchiveComponent for RenderLight {
    fn write_record<W: Write>(
        &self,
        writer: &mut ChunkWriter<W>,
        target_version: u32,
    ) -> Result<(), FileError> {
        writer.write_record_version(RECORD_MAJOR, record_minor_for(target_version))?;
        write_base(writer, &self.base)?;
        writer.write_u8(light_kind_to_u8(self.kind))?;
        for axis in self.location {
            writer.write_f64(axis)?;
        }

        let mut tags = TagWriter::new(writer);
        if self.intensity != 1.0 {
            tags.tag(1)?.write_f64(self.intensity)?;
        }
        if !self.enabled {
            tags.tag(2)?.write_bool(self.enabled)?;
        }
        tags.finish()
    }

    fn read_record<R: Read>(reader: &mut ChunkReader<R>) -> Result<Self, FileError> {
        read_version(reader)?;
        let mut light = RenderLight {
            base: read_base(reader)?,
            kind: light_kind_from_u8(reader.read_u8()?)?,
            ..RenderLight::default()
        };
        for axis in &mut light.location {
            *axis = reader.read_f64()?;
        }
        loop {
            match read_tag(reader, 2)? {
                0 => break,
                1 => light.intensity = reader.read_f64()?,
                2 => light.enabled = reader.read_bool()?,
                _ => break,
            }
        }
        Ok(light)
    }
}

impl ArchiveComponent for HatchPattern {
    fn write_record<W: Write>(
        &self,
        writer: &mut ChunkWriter<W>,
        target_version: u32,
    ) -> Result<(), FileError> {
        writer.write_record_version(RECORD_MAJOR, record_minor_for(target_version))?;
        write_base(writer, &self.base)?;

        let mut tags = TagWriter::new(writer);
        if !self.lines.is_empty() {
            let writer = tags.tag(1)?;
            writer.write_u32(self.lines.len() as u32)?;
            for line in &self.lines {
                writer.write_f64(line.angle)?;
                writer.write_f64(line.offset[0])?;
                writer.write_f64(line.offset[1])?;
                writer.write_f64(line.spacing)?;
            }
        }
        tags.finish()
    }

    fn read_record<R: Read>(reader: &mut ChunkReader<R>) -> Result<Self, FileError> {
        read_version(reader)?;
        let mut pattern = HatchPattern {
            base: read_base(reader)?,
            ..HatchPattern::default()
        };
        loop {
            match read_tag(reader, 1)? {
                0 => break,
                1 => {
                    let count = reader.read_u32()? as usize;
                    let mut lines = Vec::with_capacity(count.min(1024));
                    for _ in 0..count {
                        lines.push(HatchLine {
                            angle: reader.read_f64()?,
                            offset: [reader.read_f64()?, reader.read_f64()?],
                            spacing: reader.read_f64()?,
                        });
                    }
                    pattern.lines = lines;
                }
                _ => break,
            }
        }
        Ok(pattern)
    }
}

impl ArchiveComponent for InstanceDefinition {
    fn write_record<W: Write>(
        &self,
        writer: &mut ChunkWriter<W>,
        target_version: u32,
    ) -> Result<(), FileError> {
        writer.write_record_version(RECORD_MAJOR, record_minor_for(target_version))?;
        write_base(writer, &self.base)?;
        for axis in self.base_point {
            writer.write_f64(axis)?;
        }

        let mut tags = TagWriter::new(writer);
        if !self.description.is_empty() {
            tags.tag(1)?.write_string(&self.description)?;
        }
        if !self.geometry_ids.is_empty() {
            write_uuid_list(tags.tag(2)?, &self.geometry_ids)?;
        }
        tags.finish()
    }

    fn read_record<R: Read>(reader: &mut ChunkReader<R>) -> Result<Self, FileError> {
        read_version(reader)?;
        let mut definition = InstanceDefinition {
            base: read_base(reader)?,
            ..InstanceDefinition::default()
        };
        for axis in &mut definition.base_point {
            *axis = reader.read_f64()?;
        }
        loop {
            match read_tag(reader, 2)? {
                0 => break,
                1 => definition.description = reader.read_string()?,
                2 => definition.geometry_ids = read_uuid_list(reader)?,
                _ => break,
            }
        }
        Ok(definition)
    }
}

impl ArchiveComponent for ModelGeometry {
    fn write_record<W: Write>(
        &self,
        writer: &mut ChunkWriter<W>,
        target_version: u32,
    ) -> Result<(), FileError> {
        let minor = record_minor_for(target_version);
        writer.write_record_version(RECORD_MAJOR, minor)?;
        write_base(writer, &self.base)?;
        writer.write_i32(self.attributes.layer_index)?;
        writer.write_u32(self.attributes.color.to_u32())?;
        writer.write_u8(color_source_to_u8(self.attributes.color_source))?;
        writer.write_byte_block(&self.geometry)?;

        // 存储包围盒是minor 1新增的顺序字段
        if minor >= 1 {
            match &self.bounding_box {
                Some(bounding_box) => {
                    writer.write_bool(true)?;
                    for axis in bounding_box.min.iter().chain(bounding_box.max.iter()) {
                        writer.write_f64(*axis)?;
                    }
                }
                None => writer.write_bool(false)?,
            }
        }

        let mut tags = TagWriter::new(writer);
        if self.attributes.render_material_index >= 0 {
            tags.tag(1)?.write_i32(self.attributes.render_material_index)?;
        }
        if self.attributes.line_pattern_index >= 0 {
            tags.tag(2)?.write_i32(self.attributes.line_pattern_index)?;
        }
        if !self.attributes.group_ids.is_empty() {
            write_uuid_list(tags.tag(3)?, &self.attributes.group_ids)?;
        }
        tags.finish()
    }

    fn read_record<R: Read>(reader: &mut ChunkReader<R>) -> Result<Self, FileError> {
        let minor = read_version(reader)?;
        let base = read_base(reader)?;
        let mut attributes = ObjectAttributes {
            layer_index: reader.read_i32()?,
            ..ObjectAttributes::default()
        };
        attributes.color = Color::from_u32(reader.read_u32()?);
        attributes.color_source = color_source_from_u8(reader.read_u8()?)?;
        let geometry = reader.read_byte_block()?;

        let bounding_box = if minor >= 1 && reader.read_bool()? {
            let mut extent = [0.0f64; 6];
            for axis in &mut extent {
                *axis = reader.read_f64()?;
            }
            Some(BoundingBox3::new(
                [extent[0], extent[1], extent[2]],
                [extent[3], extent[4], extent[5]],
            ))
        } else {
            None
        };

        let mut object = ModelGeometry {
            base,
            attributes,
            geometry,
            bounding_box,
        };
        loop {
            match read_tag(reader, 3)? {
                0 => break,
                1 => object.attributes.render_material_index = reader.read_i32()?,
                2 => object.attributes.line_pattern_index = reader.read_i32()?,
                3 => object.attributes.group_ids = read_uuid_list(reader)?,
                _ => break,
            }
        }
        Ok(object)
    }
}

impl ArchiveComponent for HistoryRecord {
    fn write_record<W: Write>(
        &self,
        writer: &mut ChunkWriter<W>,
        target_version: u32,
    ) -> Result<(), FileError> {
        writer.write_record_version(RECORD_MAJOR, record_minor_for(target_version))?;
        write_base(writer, &self.base)?;
        writer.write_u32(self.operation)?;
        writer.write_byte_block(&self.payload)?;

        let mut tags = TagWriter::new(writer);
        if !self.antecedent_ids.is_empty() {
            write_uuid_list(tags.tag(1)?, &self.antecedent_ids)?;
        }
        tags.finish()
    }

    fn read_record<R: Read>(reader: &mut ChunkReader<R>) -> Result<Self, FileError> {
        read_version(reader)?;
        let mut record = HistoryRecord {
            base: read_base(reader)?,
            ..HistoryRecord::default()
        };
        record.operation = reader.read_u32()?;
        record.payload = reader.read_byte_block()?;
        loop {
            match read_tag(reader, 1)? {
                0 => break,
                1 => record.antecedent_ids = read_uuid_list(reader)?,
                _ => break,
            }
        }
        Ok(record)
    }
}

/// 按载荷类型分派写组件记录
pub fn write_component<W: Write>(
    component: &Component,
    writer: &mut ChunkWriter<W>,
    target_version: u32,
) -> Result<(), FileError> {
    match component {
        Component::Image(c) => c.write_record(writer, target_version),
        Component::TextureMapping(c) => c.write_record(writer, target_version),
        Component::RenderMaterial(c) => c.write_record(writer, target_version),
        Component::LinePattern(c) => c.write_record(writer, target_version),
        Component::Layer(c) => c.write_record(writer, target_version),
        Component::Group(c) => c.write_record(writer, target_version),
        Component::TextStyle(c) => c.write_record(writer, target_version),
        Component::DimStyle(c) => c.write_record(writer, target_version),
        Component::RenderLight(c) => c.write_record(writer, target_version),
        Component::HatchPattern(c) => c.write_record(writer, target_version),
        Component::InstanceDefinition(c) => c.write_record(writer, target_version),
        Component::ModelGeometry(c) => c.write_record(writer, target_version),
        Component::HistoryRecord(c) => c.write_record(writer, target_version),
    }
}

/// 按表类型读组件记录
pub fn read_component<R: Read>(
    component_type: ComponentType,
    reader: &mut ChunkReader<R>,
) -> Result<Component, FileError> {
    Ok(match component_type {
        ComponentType::Image => Component::Image(Image::read_record(reader)?),
        ComponentType::TextureMapping => {
            Component::TextureMapping(TextureMapping::read_record(reader)?)
        }
        ComponentType::RenderMaterial => {
            Component::RenderMaterial(RenderMaterial::read_record(reader)?)
        }
        ComponentType::LinePattern => Component::LinePattern(LinePattern::read_record(reader)?),
        ComponentType::Layer => Component::Layer(Layer::read_record(reader)?),
        ComponentType::Group => Component::Group(Group::read_record(reader)?),
        ComponentType::TextStyle => Component::TextStyle(TextStyle::read_record(reader)?),
        ComponentType::DimStyle => Component::DimStyle(DimStyle::read_record(reader)?),
        ComponentType::RenderLight => Component::RenderLight(RenderLight::read_record(reader)?),
        ComponentType::HatchPattern => Component::HatchPattern(HatchPattern::read_record(reader)?),
        ComponentType::InstanceDefinition => {
            Component::InstanceDefinition(InstanceDefinition::read_record(reader)?)
        }
        ComponentType::ModelGeometry => {
            Component::ModelGeometry(ModelGeometry::read_record(reader)?)
        }
        ComponentType::HistoryRecord => {
            Component::HistoryRecord(HistoryRecord::read_record(reader)?)
        }
        other => {
            return Err(FileError::RecordDecode(format!(
                "component type {} has no archive table",
                other.type_name()
            )))
        }
    })
}

impl ArchiveComponent for DocumentProperties {
    fn write_record<W: Write>(
        &self,
        writer: &mut ChunkWriter<W>,
        target_version: u32,
    ) -> Result<(), FileError> {
        writer.write_record_version(RECORD_MAJOR, record_minor_for(target_version))?;
        writer.write_string(&self.title)?;
        writer.write_string(&self.author)?;
        writer.write_string(&self.notes)?;
        writer.write_i64(self.created.timestamp_millis())?;
        writer.write_i64(self.modified.timestamp_millis())?;
        writer.write_u32(self.revision)
    }

    fn read_record<R: Read>(reader: &mut ChunkReader<R>) -> Result<Self, FileError> {
        read_version(reader)?;
        let title = reader.read_string()?;
        let author = reader.read_string()?;
        let notes = reader.read_string()?;
        let created = chrono::DateTime::from_timestamp_millis(reader.read_i64()?)
            .ok_or_else(|| FileError::RecordDecode("created timestamp out of range".into()))?;
        let modified = chrono::DateTime::from_timestamp_millis(reader.read_i64()?)
            .ok_or_else(|| FileError::RecordDecode("modified timestamp out of range".into()))?;
        let revision = reader.read_u32()?;
        Ok(DocumentProperties {
            title,
            author,
            notes,
            created,
            modified,
            revision,
        })
    }
}

impl ArchiveComponent for DocumentSettings {
    fn write_record<W: Write>(
        &self,
        writer: &mut ChunkWriter<W>,
        target_version: u32,
    ) -> Result<(), FileError> {
        writer.write_record_version(RECORD_MAJOR, record_minor_for(target_version))?;
        writer.write_u8(unit_system_to_u8(self.unit_system))?;
        writer.write_f64(self.absolute_tolerance)?;
        writer.write_f64(self.angle_tolerance)?;
        writer.write_i32(self.current_layer_index)
    }

    fn read_record<R: Read>(reader: &mut ChunkReader<R>) -> Result<Self, FileError> {
        read_version(reader)?;
        Ok(DocumentSettings {
            unit_system: unit_system_from_u8(reader.read_u8()?)?,
            absolute_tolerance: reader.read_f64()?,
            angle_tolerance: reader.read_f64()?,
            current_layer_index: reader.read_i32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: ArchiveComponent>(value: &T, target_version: u32) -> T {
        let mut writer = ChunkWriter::new(Vec::new());
        writer.begin_chunk(0x01).unwrap();
        value.write_record(&mut writer, target_version).unwrap();
        writer.end_chunk().unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = ChunkReader::new(bytes.as_slice());
        reader.begin_chunk().unwrap();
        let decoded = T::read_record(&mut reader).unwrap();
        reader.end_chunk().unwrap();
        decoded
    }

    #[test]
    fn test_layer_record_roundtrip() {
        let mut layer = Layer::new("Walls");
        layer.base.id = Uuid::new_v4();
        layer.base.index = 5;
        layer.color = Color::RED;
        layer.locked = true;
        layer.line_pattern_index = 2;
        layer.render_material_index = 4;

        let decoded = roundtrip(&layer, 2);
        assert_eq!(decoded.base.id, layer.base.id);
        assert_eq!(decoded.base.index, 5);
        assert_eq!(decoded.base.name, "Walls");
        assert_eq!(decoded.color, Color::RED);
        assert!(decoded.locked);
        assert_eq!(decoded.line_pattern_index, 2);
        assert_eq!(decoded.render_material_index, 4);
    }

    #[test]
    fn test_layer_record_to_older_version_drops_new_field() {
        let mut layer = Layer::new("Walls");
        layer.render_material_index = 4;

        // 目标版本1没有材质引用字段，读回为默认值
        let decoded = roundtrip(&layer, 1);
        assert_eq!(decoded.base.name, "Walls");
        assert_eq!(decoded.render_material_index, -1);
    }

    #[test]
    fn test_unknown_tag_treated_as_record_end() {
        // 手工构造带未来标签的记录：标签99 + 8字节未知值
        let mut writer = ChunkWriter::new(Vec::new());
        writer.begin_chunk(0x01).unwrap();
        writer.write_record_version(RECORD_MAJOR, 7).unwrap();
        let layer = Layer::new("Future");
        super::write_base(&mut writer, &layer.base).unwrap();
        writer.write_u32(layer.color.to_u32()).unwrap();
        writer.write_u8(2).unwrap(); // locked
        writer.write_bool(true).unwrap();
        writer.write_u8(99).unwrap();
        writer.write_f64(123.0).unwrap();
        writer.end_chunk().unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = ChunkReader::new(bytes.as_slice());
        reader.begin_chunk().unwrap();
        let decoded = Layer::read_record(&mut reader).unwrap();
        // 未知标签之前的字段保留，之后的内容被跳过
        assert!(decoded.locked);
        reader.end_chunk().unwrap();
    }

    #[test]
    fn test_unknown_major_rejected() {
        let mut writer = ChunkWriter::new(Vec::new());
        writer.begin_chunk(0x01).unwrap();
        writer.write_record_version(9, 0).unwrap();
        writer.end_chunk().unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = ChunkReader::new(bytes.as_slice());
        reader.begin_chunk().unwrap();
        let err = Layer::read_record(&mut reader);
        assert!(matches!(
            err,
            Err(FileError::BadMajorVersion {
                expected: 1,
                found: 9
            })
        ));
    }

    #[test]
    fn test_geometry_bounding_box_version_gate() {
        let mut object = ModelGeometry::new(vec![1, 2, 3]);
        object.bounding_box = Some(BoundingBox3::new([0.0; 3], [1.0, 2.0, 3.0]));

        let decoded = roundtrip(&object, 2);
        assert_eq!(decoded.bounding_box, object.bounding_box);
        assert_eq!(decoded.geometry, vec![1, 2, 3]);

        // 旧版本归档不携带包围盒
        let decoded = roundtrip(&object, 1);
        assert_eq!(decoded.bounding_box, None);
    }

    #[test]
    fn test_settings_record_roundtrip() {
        let settings = DocumentSettings {
            unit_system: UnitSystem::Meters,
            absolute_tolerance: 0.01,
            angle_tolerance: 0.1,
            current_layer_index: 3,
        };
        let decoded = roundtrip(&settings, 2);
        assert_eq!(decoded.unit_system, UnitSystem::Meters);
        assert_eq!(decoded.current_layer_index, 3);
    }
}
