//! ZDOC原生文件格式（.zdoc）
//!
//! 归档布局：
//! - 16字节文件头（魔数/版本/标志/预留）
//! - 文档元数据块、文档设置块
//! - 13张组件表（固定顺序，见 `TABLE_ORDER`），每张表内逐条记录
//! - 插件自定义表（零到多个）
//! - 结束标记块
//!
//! 读侧对坏记录尽量容忍：单条记录解码失败只丢该条并计入日志，
//! 结构性损坏（块边界/校验/协议）才中止加载。

use crate::chunk::{ChunkReader, ChunkWriter};
use crate::error::FileError;
use crate::record::{read_component, write_component, ArchiveComponent};
use crate::table::{table_typecode, typecode, TableReader, TableWriter};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use zdoc_core::component::{ModelComponent, TABLE_ORDER};
use zdoc_core::error::ValidationLog;
use zdoc_core::geometry_object::ModelGeometry;
use zdoc_core::manifest::ComponentManifest;
use zdoc_core::manifest_map::{ManifestMap, ManifestMapItem};
use zdoc_core::model::{DocumentProperties, DocumentSettings, Model, UserTable};

/// 文件魔数 "ZDOC"
const MAGIC: &[u8; 4] = b"ZDOC";

/// 当前文件格式版本
pub const FORMAT_VERSION: u32 = 2;

/// 仍可写出的最老版本
pub const OLDEST_WRITABLE_VERSION: u32 = 1;

/// 文件头（16 字节）
#[derive(Debug)]
struct FileHeader {
    /// 魔数 "ZDOC"
    magic: [u8; 4],
    /// 格式版本
    version: u32,
    /// 标志位（预留）
    flags: u32,
    /// 预留
    reserved: u32,
}

impl FileHeader {
    fn new(version: u32) -> Self {
        Self {
            magic: *MAGIC,
            version,
            flags: 0,
            reserved: 0,
        }
    }

    fn write(&self, writer: &mut impl Write) -> Result<(), std::io::Error> {
        writer.write_all(&self.magic)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&self.reserved.to_le_bytes())?;
        Ok(())
    }

    fn read(reader: &mut impl Read) -> Result<Self, FileError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;

        if &magic != MAGIC {
            return Err(FileError::InvalidFormat(
                "Invalid magic number, not a ZDOC file".to_string(),
            ));
        }

        let mut buf = [0u8; 4];

        reader.read_exact(&mut buf)?;
        let version = u32::from_le_bytes(buf);

        reader.read_exact(&mut buf)?;
        let flags = u32::from_le_bytes(buf);

        reader.read_exact(&mut buf)?;
        let reserved = u32::from_le_bytes(buf);

        Ok(Self {
            magic,
            version,
            flags,
            reserved,
        })
    }
}

/// 保存模型到文件（当前格式版本）
pub fn save(model: &Model, path: &Path) -> Result<(), FileError> {
    save_with_version(model, path, FORMAT_VERSION)
}

/// 按指定格式版本保存模型
///
/// 写旧版本时新版本才有的字段被省略，产出旧读取器可完整加载的归档。
pub fn save_with_version(
    model: &Model,
    path: &Path,
    target_version: u32,
) -> Result<(), FileError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_model(model, &mut writer, target_version)?;
    writer.flush()?;

    tracing::info!(
        "Saved {} components to {} (format version {})",
        model.total_component_count(),
        path.display(),
        target_version
    );
    Ok(())
}

/// 从文件加载模型
///
/// 返回模型和修复日志：被丢弃的坏记录、回退到默认值的悬空引用
/// 都记在日志里，结构性损坏才返回Err。
pub fn load(path: &Path) -> Result<(Model, ValidationLog), FileError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let (model, log) = read_model(&mut reader)?;

    tracing::info!(
        "Loaded {} components from {} ({} errors, {} warnings)",
        model.total_component_count(),
        path.display(),
        log.error_count,
        log.warning_count
    );
    Ok((model, log))
}

/// 把模型写入任意输出流
pub fn write_model<W: Write>(
    model: &Model,
    mut out: W,
    target_version: u32,
) -> Result<(), FileError> {
    if !(OLDEST_WRITABLE_VERSION..=FORMAT_VERSION).contains(&target_version) {
        return Err(FileError::UnsupportedVersion(format!(
            "Cannot write format version {target_version}"
        )));
    }

    FileHeader::new(target_version).write(&mut out)?;
    let mut chunks = ChunkWriter::new(out);

    chunks.begin_chunk(typecode::PROPERTIES)?;
    model.properties.write_record(&mut chunks, target_version)?;
    chunks.end_chunk()?;

    chunks.begin_chunk(typecode::SETTINGS)?;
    model.settings.write_record(&mut chunks, target_version)?;
    chunks.end_chunk()?;

    let mut tables = TableWriter::new(&mut chunks);
    for component_type in TABLE_ORDER {
        let table = table_typecode(component_type).expect("every table type has a typecode");
        tables.begin_table(table)?;
        for component in model.components_of_type(component_type) {
            let record = tables.begin_record()?;
            write_component(component, record, target_version)?;
            tables.end_record()?;
        }
        tables.end_table()?;
    }

    for user_table in &model.user_tables {
        chunks.begin_chunk(typecode::USER_TABLE)?;
        chunks.write_uuid(user_table.plugin_id)?;
        chunks.write_byte_block(&user_table.data)?;
        chunks.end_chunk()?;
    }

    chunks.begin_chunk(typecode::END_MARK)?;
    chunks.end_chunk()?;
    chunks.finish()?;
    Ok(())
}

/// 定位目标块，途中不认识的块整块跳过
fn seek_chunk<R: Read>(chunks: &mut ChunkReader<R>, typecode: u32) -> Result<(), FileError> {
    loop {
        let (found, _) = chunks.begin_chunk()?;
        if found == typecode {
            return Ok(());
        }
        if found == typecode::END_MARK {
            return Err(FileError::BadChunk(format!(
                "chunk {typecode:#010x} missing from archive"
            )));
        }
        chunks.end_chunk()?;
    }
}

/// 从任意输入流读出模型
pub fn read_model<R: Read>(mut input: R) -> Result<(Model, ValidationLog), FileError> {
    let header = FileHeader::read(&mut input)?;
    if header.version == 0 || header.version > FORMAT_VERSION {
        return Err(FileError::UnsupportedVersion(format!(
            "File version {} is newer than supported version {}",
            header.version, FORMAT_VERSION
        )));
    }

    let mut chunks = ChunkReader::new(input);
    let mut log = ValidationLog::new();
    let mut model = Model::new();

    seek_chunk(&mut chunks, typecode::PROPERTIES)?;
    model.properties = DocumentProperties::read_record(&mut chunks)?;
    chunks.end_chunk()?;

    seek_chunk(&mut chunks, typecode::SETTINGS)?;
    model.settings = DocumentSettings::read_record(&mut chunks)?;
    chunks.end_chunk()?;

    // 文件内编号 -> 本模型编号的翻译表；干净加载时是恒等映射
    let mut map = ManifestMap::new();
    let mut skipped = 0usize;

    let mut tables = TableReader::new(&mut chunks);
    for component_type in TABLE_ORDER {
        let table = table_typecode(component_type).expect("every table type has a typecode");
        tables.begin_table(table)?;

        loop {
            let decoded = match tables.begin_record()? {
                Some(record) => read_component(component_type, record),
                None => break,
            };
            match decoded {
                Ok(component) => {
                    tables.end_record()?;
                    let source_index = component.index().unwrap_or(-1);
                    let source_id = component.id();
                    match model.add_component(component, true) {
                        Ok(reference) => {
                            let destination_index = model
                                .manifest_item_from_id(reference.id)
                                .and_then(|item| item.index)
                                .unwrap_or(-1);
                            map.add_item(ManifestMapItem {
                                component_type,
                                source_index,
                                source_id,
                                destination_index,
                                destination_id: reference.id,
                            });
                        }
                        Err(error) => {
                            skipped += 1;
                            log.error(format!(
                                "dropped {} record: {error}",
                                component_type.type_name()
                            ));
                        }
                    }
                }
                Err(error) if !error.is_structural() => {
                    // 坏记录：丢弃本条，继续读下一条
                    skipped += 1;
                    log.error(format!(
                        "dropped undecodable {} record: {error}",
                        component_type.type_name()
                    ));
                    tables.end_record()?;
                }
                Err(error) => {
                    let _ = tables.end_record();
                    let _ = tables.end_table();
                    return Err(error);
                }
            }
        }

        tables.end_table()?;
    }

    loop {
        let (found, _) = chunks.begin_chunk()?;
        match found {
            typecode::END_MARK => {
                chunks.end_chunk()?;
                break;
            }
            typecode::USER_TABLE => {
                let plugin_id = chunks.read_uuid()?;
                let data = chunks.read_byte_block()?;
                chunks.end_chunk()?;
                model.user_tables.push(UserTable { plugin_id, data });
            }
            _ => chunks.end_chunk()?,
        }
    }

    if skipped > 0 {
        tracing::warn!(skipped, "archive contained undecodable records");
    }

    // 丢过记录或发生过冲突修复时，存量交叉引用要按映射改写；
    // 干净加载下这一步是恒等校验
    model.update_referenced_components(&ComponentManifest::new(), &map, &mut log);

    Ok((model, log))
}

/// 几何对象表的增量读取器
///
/// 跳过对象表之前的全部内容，逐条取出几何对象记录，
/// 供预览/流式消费方使用而不必加载整个模型。
#[derive(Debug)]
pub struct ObjectTableReader<R: Read> {
    chunks: ChunkReader<R>,
    skipped: usize,
}

impl<R: Read> ObjectTableReader<R> {
    /// 打开归档并定位到几何对象表
    pub fn open(mut input: R) -> Result<Self, FileError> {
        let header = FileHeader::read(&mut input)?;
        if header.version == 0 || header.version > FORMAT_VERSION {
            return Err(FileError::UnsupportedVersion(format!(
                "File version {} is newer than supported version {}",
                header.version, FORMAT_VERSION
            )));
        }

        let mut chunks = ChunkReader::new(input);
        seek_chunk(&mut chunks, typecode::MODEL_GEOMETRY_TABLE)?;
        Ok(Self { chunks, skipped: 0 })
    }

    /// 读下一条几何对象；表读尽时返回None，坏记录跳过并计数
    pub fn read_one(&mut self) -> Result<Option<ModelGeometry>, FileError> {
        loop {
            if self.chunks.remaining() == 0 {
                return Ok(None);
            }
            let (found, _) = self.chunks.begin_chunk()?;
            if found != typecode::RECORD {
                return Err(FileError::BadChunk(format!(
                    "expected record chunk, found {found:#010x}"
                )));
            }
            match ModelGeometry::read_record(&mut self.chunks) {
                Ok(object) => {
                    self.chunks.end_chunk()?;
                    return Ok(Some(object));
                }
                Err(error) if !error.is_structural() => {
                    self.skipped += 1;
                    self.chunks.end_chunk()?;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// 被跳过的坏记录数
    pub fn skipped_records(&self) -> usize {
        self.skipped
    }

    /// 关闭对象表并校验其校验值
    pub fn finish(mut self) -> Result<(), FileError> {
        self.chunks.end_chunk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use zdoc_core::component::{Component, ComponentType};
    use zdoc_core::geometry_object::BoundingBox3;
    use zdoc_core::group::Group;
    use zdoc_core::layer::Layer;
    use zdoc_core::linetype::LinePattern;
    use zdoc_core::material::RenderMaterial;
    use zdoc_core::model::UnitSystem;
    use zdoc_core::properties::Color;

    fn sample_model() -> Model {
        let mut model = Model::new();
        model.properties.title = "Test Document".to_string();
        model.settings.unit_system = UnitSystem::Meters;

        model
            .add_component(
                Component::LinePattern(LinePattern::new("Dashed", vec![5.0, -2.5])),
                true,
            )
            .expect("add pattern");
        model
            .add_component(
                Component::RenderMaterial(RenderMaterial::new("Steel")),
                true,
            )
            .expect("add material");

        let mut walls = Layer::new("Walls");
        walls.color = Color::RED;
        walls.line_pattern_index = 0;
        walls.render_material_index = 0;
        model
            .add_component(Component::Layer(walls), true)
            .expect("add layer");
        model
            .add_component(Component::Layer(Layer::new("Doors")), true)
            .expect("add layer");

        let group = model
            .add_component(Component::Group(Group::new("selection")), true)
            .expect("add group");

        let mut object = ModelGeometry::new(vec![1, 2, 3, 4])
            .on_layer(1)
            .with_bounding_box(BoundingBox3::new([0.0; 3], [10.0, 20.0, 30.0]));
        object.attributes.group_ids.push(group.id);
        model
            .add_component(Component::ModelGeometry(object), true)
            .expect("add object");

        let mut second = ModelGeometry::new(vec![9, 9]).on_layer(0);
        second.bounding_box = Some(BoundingBox3::new([-1.0; 3], [1.0; 3]));
        model
            .add_component(Component::ModelGeometry(second), true)
            .expect("add object");

        model.user_tables.push(UserTable {
            plugin_id: Uuid::new_v4(),
            data: vec![0xAB, 0xCD],
        });
        model
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp_dir = std::env::temp_dir();
        let file_path = temp_dir.join("test_document.zdoc");

        let model = sample_model();
        save(&model, &file_path).expect("Failed to save");

        // 验证文件头
        let file = File::open(&file_path).expect("Failed to open");
        let mut reader = BufReader::new(file);
        let header = FileHeader::read(&mut reader).expect("Failed to read header");
        assert_eq!(&header.magic, MAGIC);
        assert_eq!(header.version, FORMAT_VERSION);

        let (loaded, log) = load(&file_path).expect("Failed to load");
        assert!(log.is_clean(), "clean archive must load without repairs");

        assert_eq!(loaded.properties.title, "Test Document");
        assert_eq!(loaded.settings.unit_system, UnitSystem::Meters);
        assert_eq!(loaded.component_count(ComponentType::Layer), 2);
        assert_eq!(loaded.component_count(ComponentType::ModelGeometry), 2);
        assert_eq!(loaded.user_tables.len(), 1);
        assert_eq!(loaded.user_tables[0].data, vec![0xAB, 0xCD]);

        // 索引与标识跨保存/加载稳定
        let walls = loaded
            .component_from_name(ComponentType::Layer, Uuid::nil(), "Walls")
            .expect("Walls survives");
        assert_eq!(walls.index(), Some(0));
        let walls = walls.as_layer().expect("is a layer");
        assert_eq!(walls.color, Color::RED);
        assert_eq!(walls.line_pattern_index, 0);
        assert_eq!(walls.render_material_index, 0);

        // 对象的组成员关系以标识存续
        let group = loaded
            .component_from_name(ComponentType::Group, Uuid::nil(), "selection")
            .expect("group survives");
        let object = loaded
            .components_of_type(ComponentType::ModelGeometry)
            .next()
            .and_then(|c| c.as_geometry())
            .expect("object survives");
        assert_eq!(object.attributes.group_ids, vec![group.id()]);
        assert_eq!(object.attributes.layer_index, 1);

        // 存储的包围盒免去加载后重算
        assert!(loaded.geometry_bounding_box().is_some());

        std::fs::remove_file(&file_path).ok();
    }

    #[test]
    fn test_sparse_index_table_roundtrip() {
        // 删除产生的索引空洞在保存/加载后保持稀疏，不得重新压实
        let mut model = Model::new();
        let alpha = model
            .add_component(Component::Layer(Layer::new("Alpha")), true)
            .expect("add layer");
        let renamed = model
            .add_component(Component::Layer(Layer::new("Alpha")), true)
            .expect("conflict resolved");
        model
            .remove_component(ComponentType::Layer, alpha.id)
            .expect("remove layer");
        model
            .add_component(Component::Layer(Layer::new("Beta")), true)
            .expect("add layer");

        let renamed = model
            .component_from_id(renamed.id)
            .expect("renamed layer present");
        assert_eq!(renamed.name(), "Alpha (1)");
        assert_eq!(renamed.index(), Some(1));

        let mut bytes = Vec::new();
        write_model(&model, &mut bytes, FORMAT_VERSION).expect("write archive");
        let (loaded, log) = read_model(bytes.as_slice()).expect("read archive");
        assert!(log.is_clean());

        // 清单内容恰为 {("Alpha (1)", 1), ("Beta", 2)}，索引0空置
        assert_eq!(loaded.component_count(ComponentType::Layer), 2);
        assert!(loaded.component_from_index(ComponentType::Layer, 0).is_none());
        let alpha1 = loaded
            .component_from_name(ComponentType::Layer, Uuid::nil(), "Alpha (1)")
            .expect("renamed layer survives");
        assert_eq!(alpha1.index(), Some(1));
        let beta = loaded
            .component_from_name(ComponentType::Layer, Uuid::nil(), "Beta")
            .expect("Beta survives");
        assert_eq!(beta.index(), Some(2));

        // 下一个分配的索引接在最大已占用索引之后
        assert_eq!(
            loaded.manifest().component_index_limit(ComponentType::Layer),
            3
        );
    }

    #[test]
    fn test_invalid_magic() {
        let temp_dir = std::env::temp_dir();
        let file_path = temp_dir.join("test_invalid.zdoc");

        let mut file = File::create(&file_path).expect("Failed to create");
        file.write_all(b"XXXX").expect("Failed to write");
        file.write_all(&[0u8; 12]).expect("Failed to write padding");

        let result = load(&file_path);
        assert!(matches!(result, Err(FileError::InvalidFormat(_))));

        std::fs::remove_file(&file_path).ok();
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut bytes = Vec::new();
        FileHeader::new(FORMAT_VERSION + 7)
            .write(&mut bytes)
            .expect("write header");

        let result = read_model(bytes.as_slice());
        assert!(matches!(result, Err(FileError::UnsupportedVersion(_))));
    }

    #[test]
    fn test_save_to_older_version() {
        let model = sample_model();
        let mut bytes = Vec::new();
        write_model(&model, &mut bytes, 1).expect("write v1");

        let (loaded, log) = read_model(bytes.as_slice()).expect("read v1");
        assert!(log.is_clean());

        // 版本1归档不携带图层材质引用与存储包围盒
        let walls = loaded
            .component_from_name(ComponentType::Layer, Uuid::nil(), "Walls")
            .and_then(|c| c.as_layer())
            .expect("Walls survives");
        assert_eq!(walls.render_material_index, -1);
        assert_eq!(walls.line_pattern_index, 0);
        assert_eq!(loaded.geometry_bounding_box(), None);
    }

    #[test]
    fn test_bad_record_dropped_with_log() {
        // 手工拼一份归档：光源表里混入一条非法kind的记录
        let mut bytes = Vec::new();
        FileHeader::new(FORMAT_VERSION)
            .write(&mut bytes)
            .expect("write header");
        let mut chunks = ChunkWriter::new(bytes);

        chunks.begin_chunk(typecode::PROPERTIES).unwrap();
        DocumentProperties::default()
            .write_record(&mut chunks, FORMAT_VERSION)
            .unwrap();
        chunks.end_chunk().unwrap();

        chunks.begin_chunk(typecode::SETTINGS).unwrap();
        DocumentSettings::default()
            .write_record(&mut chunks, FORMAT_VERSION)
            .unwrap();
        chunks.end_chunk().unwrap();

        let mut tables = TableWriter::new(&mut chunks);
        for component_type in TABLE_ORDER {
            let table = table_typecode(component_type).unwrap();
            tables.begin_table(table).unwrap();
            if component_type == ComponentType::RenderLight {
                // 非法记录：kind字节99
                let record = tables.begin_record().unwrap();
                record
                    .write_record_version(crate::record::RECORD_MAJOR, 1)
                    .unwrap();
                record.write_uuid(Uuid::new_v4()).unwrap();
                record.write_i32(-1).unwrap();
                record.write_string("Broken").unwrap();
                record.write_uuid(Uuid::nil()).unwrap();
                record.write_u8(99).unwrap();
                tables.end_record().unwrap();
            }
            if component_type == ComponentType::Layer {
                let mut layer = Layer::new("Survivor");
                layer.base.index = 0;
                let record = tables.begin_record().unwrap();
                layer.write_record(record, FORMAT_VERSION).unwrap();
                tables.end_record().unwrap();
            }
            tables.end_table().unwrap();
        }

        chunks.begin_chunk(typecode::END_MARK).unwrap();
        chunks.end_chunk().unwrap();
        let bytes = chunks.finish().unwrap();

        let (loaded, log) = read_model(bytes.as_slice()).expect("load despite bad record");
        assert_eq!(loaded.component_count(ComponentType::RenderLight), 0);
        assert_eq!(loaded.component_count(ComponentType::Layer), 1);
        assert_eq!(log.error_count, 1);
    }

    #[test]
    fn test_object_table_reader() {
        let model = sample_model();
        let mut bytes = Vec::new();
        write_model(&model, &mut bytes, FORMAT_VERSION).expect("write");

        let mut objects = ObjectTableReader::open(bytes.as_slice()).expect("open");
        let first = objects.read_one().expect("read").expect("first object");
        assert_eq!(first.geometry, vec![1, 2, 3, 4]);
        let second = objects.read_one().expect("read").expect("second object");
        assert_eq!(second.geometry, vec![9, 9]);
        assert!(objects.read_one().expect("read").is_none());
        assert_eq!(objects.skipped_records(), 0);
        objects.finish().expect("table checksum holds");
    }
}
