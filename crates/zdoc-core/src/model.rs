//! 模型门面
//!
//! 组合组件清单、组件仓库与文档属性/设置，对外提供
//! 增/删/查/遍历与合并，并维护单调递增的内容版本号。
//! 内容版本驱动迭代器再同步（见 `store` 模块）和派生聚合的记忆化。

use crate::component::{Component, ComponentType, ModelComponent, TABLE_ORDER};
use crate::error::{ModelError, ValidationLog};
use crate::geometry_object::BoundingBox3;
use crate::manifest::{ComponentManifest, ManifestItem};
use crate::manifest_map::{ManifestMap, ManifestMapItem};
use crate::store::{ComponentIterator, ComponentStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use uuid::Uuid;

/// 长度单位制
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UnitSystem {
    #[default]
    Millimeters,
    Centimeters,
    Meters,
    Inches,
    Feet,
}

/// 文档元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentProperties {
    pub title: String,
    pub author: String,
    pub notes: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// 保存次数
    pub revision: u32,
}

impl Default for DocumentProperties {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            title: String::new(),
            author: String::new(),
            notes: String::new(),
            created: now,
            modified: now,
            revision: 0,
        }
    }
}

/// 文档设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSettings {
    pub unit_system: UnitSystem,

    /// 绝对容差（模型单位）
    pub absolute_tolerance: f64,

    /// 角度容差（弧度）
    pub angle_tolerance: f64,

    /// 当前图层索引
    pub current_layer_index: i32,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            unit_system: UnitSystem::Millimeters,
            absolute_tolerance: 0.001,
            angle_tolerance: std::f64::consts::PI / 180.0,
            current_layer_index: 0,
        }
    }
}

/// 插件自定义表（不透明字节，原样随文件读写）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTable {
    pub plugin_id: Uuid,
    pub data: Vec<u8>,
}

/// 组件弱引用
///
/// 只携带 (类型, 标识, 序列号)，通过序列号索引解析；
/// 组件被删除后解析为None，绝不悬空。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentRef {
    pub component_type: ComponentType,
    pub id: Uuid,
    pub serial_number: u64,
}

impl ComponentRef {
    pub fn resolve<'m>(&self, model: &'m Model) -> Option<&'m Component> {
        model.component(self.serial_number)
    }
}

/// 文档模型
#[derive(Debug, Default)]
pub struct Model {
    pub properties: DocumentProperties,
    pub settings: DocumentSettings,
    pub user_tables: Vec<UserTable>,

    manifest: ComponentManifest,
    store: ComponentStore,

    /// 内容版本：每次成功增删组件加一
    content_version: u64,

    /// 几何包围盒缓存 (内容版本, 包围盒)
    bounding_box_cache: Cell<Option<(u64, Option<BoundingBox3>)>>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前内容版本（单调递增）
    pub fn content_version(&self) -> u64 {
        self.content_version
    }

    pub fn manifest(&self) -> &ComponentManifest {
        &self.manifest
    }

    /// 注册组件
    ///
    /// 依次执行清单校验、仓库收编、去规范化字段回写，
    /// 任一步失败则整体回退。`resolve_conflicts` 决定标识/名称冲突
    /// 是自动修复（生成新标识、追加名称后缀）还是硬失败。
    pub fn add_component(
        &mut self,
        component: Component,
        resolve_conflicts: bool,
    ) -> Result<ComponentRef, ModelError> {
        let component_type = component.component_type();
        let parent_id = component.parent_id();
        let requested_index = component.index();

        let (id, name) = self.manifest.validate_id_and_name(
            component_type,
            component.id(),
            parent_id,
            component.name(),
            resolve_conflicts,
            resolve_conflicts,
        )?;

        let serial_number = self.store.insert(component);
        let item = match self.manifest.add_component(
            component_type,
            serial_number,
            id,
            parent_id,
            &name,
            requested_index,
        ) {
            Ok(item) => item,
            Err(error) => {
                // 回退仓库收编，保持清单与仓库一致
                self.store.remove(serial_number);
                return Err(error);
            }
        };

        let component = self.store.get_mut(serial_number).expect("just inserted");
        component.set_id(id);
        component.set_name(name);
        if let Some(index) = item.index {
            component.set_index(index);
        }

        self.content_version += 1;
        Ok(ComponentRef {
            component_type,
            id,
            serial_number,
        })
    }

    /// 删除组件并取回载荷
    pub fn remove_component(
        &mut self,
        component_type: ComponentType,
        id: Uuid,
    ) -> Result<Component, ModelError> {
        let item = *self.manifest.item_from_id(id).ok_or(ModelError::NotFound(id))?;
        if item.component_type != component_type {
            return Err(ModelError::WrongComponentType(item.component_type));
        }

        self.manifest.remove_component(id);
        let component = self
            .store
            .remove(item.serial_number)
            .ok_or(ModelError::NotFound(id))?;
        self.content_version += 1;
        Ok(component)
    }

    pub fn component(&self, serial_number: u64) -> Option<&Component> {
        self.store.get(serial_number)
    }

    pub fn component_mut(&mut self, serial_number: u64) -> Option<&mut Component> {
        self.store.get_mut(serial_number)
    }

    pub fn component_from_id(&self, id: Uuid) -> Option<&Component> {
        let item = self.manifest.item_from_id(id)?;
        self.store.get(item.serial_number)
    }

    pub fn component_from_index(
        &self,
        component_type: ComponentType,
        index: i32,
    ) -> Option<&Component> {
        let item = self.manifest.item_from_index(component_type, index)?;
        self.store.get(item.serial_number)
    }

    pub fn component_from_name(
        &self,
        component_type: ComponentType,
        parent_id: Uuid,
        name: &str,
    ) -> Option<&Component> {
        let item = self.manifest.item_from_name(component_type, parent_id, name)?;
        self.store.get(item.serial_number)
    }

    pub fn manifest_item_from_id(&self, id: Uuid) -> Option<&ManifestItem> {
        self.manifest.item_from_id(id)
    }

    pub fn component_count(&self, component_type: ComponentType) -> usize {
        self.store.count(component_type)
    }

    pub fn total_component_count(&self) -> usize {
        self.store.total_count()
    }

    /// 取一个未占用的组件名称
    pub fn unused_name(
        &self,
        component_type: ComponentType,
        parent_id: Uuid,
        candidate: &str,
    ) -> String {
        self.manifest.unused_name(component_type, parent_id, candidate)
    }

    /// 建一个可跨变更存活的游标式迭代器
    pub fn iter_type(&self, component_type: ComponentType) -> ComponentIterator {
        ComponentIterator::new(component_type)
    }

    /// 按插入顺序借用遍历（遍历期间无法变更模型）
    pub fn components_of_type(
        &self,
        component_type: ComponentType,
    ) -> impl Iterator<Item = &Component> {
        self.store.iter_type(component_type)
    }

    /// 几何总包围盒（按内容版本记忆化）
    pub fn geometry_bounding_box(&self) -> Option<BoundingBox3> {
        if let Some((stamp, cached)) = self.bounding_box_cache.get() {
            if stamp == self.content_version {
                return cached;
            }
        }

        let mut union: Option<BoundingBox3> = None;
        for component in self.store.iter_type(ComponentType::ModelGeometry) {
            let Some(geometry) = component.as_geometry() else {
                continue;
            };
            if let Some(bounding_box) = geometry.bounding_box {
                union = Some(match union {
                    Some(total) => total.union(&bounding_box),
                    None => bounding_box,
                });
            }
        }

        self.bounding_box_cache
            .set(Some((self.content_version, union)));
        union
    }

    /// 合并另一个模型的全部组件
    ///
    /// 来源组件按表顺序逐个以冲突自动修复方式转入本模型，
    /// 每条转移记入清单映射；最后对全部转入组件做引用修复，
    /// 把存量交叉引用翻译到本模型的编号空间。
    pub fn merge_from(&mut self, mut source: Model, log: &mut ValidationLog) -> ManifestMap {
        let source_manifest = source.manifest.clone();
        let mut map = ManifestMap::new();
        let mut transplanted = Vec::new();

        for component_type in TABLE_ORDER {
            let serials: Vec<u64> = source
                .store
                .iter_type_with_serial(component_type)
                .map(|(serial, _)| serial)
                .collect();
            for serial in serials {
                let Some(component) = source.store.remove(serial) else {
                    continue;
                };
                let source_index = component.index().unwrap_or(-1);
                let source_id = component.id();

                match self.add_component(component, true) {
                    Ok(reference) => {
                        let item = self
                            .manifest
                            .item_from_id(reference.id)
                            .expect("just registered");
                        map.add_item(ManifestMapItem {
                            component_type,
                            source_index,
                            source_id,
                            destination_index: item.index.unwrap_or(-1),
                            destination_id: reference.id,
                        });
                        transplanted.push(reference.serial_number);
                    }
                    Err(error) => {
                        log.error(format!(
                            "failed to merge {} component: {error}",
                            component_type.type_name()
                        ));
                    }
                }
            }
        }

        self.remap_serials(&transplanted, &source_manifest, &map, log);
        tracing::debug!(
            merged = transplanted.len(),
            mappings = map.len(),
            "model merge finished"
        );
        map
    }

    /// 对模型内全部组件做引用修复
    ///
    /// 加载归档后调用：`map` 记录了文件内编号到本模型编号的翻译。
    pub fn update_referenced_components(
        &mut self,
        source_manifest: &ComponentManifest,
        map: &ManifestMap,
        log: &mut ValidationLog,
    ) {
        let serials: Vec<u64> = TABLE_ORDER
            .iter()
            .flat_map(|component_type| {
                self.store
                    .iter_type_with_serial(*component_type)
                    .map(|(serial, _)| serial)
                    .collect::<Vec<_>>()
            })
            .collect();
        self.remap_serials(&serials, source_manifest, map, log);
    }

    fn remap_serials(
        &mut self,
        serials: &[u64],
        source_manifest: &ComponentManifest,
        map: &ManifestMap,
        log: &mut ValidationLog,
    ) {
        for &serial in serials {
            let Model {
                manifest, store, ..
            } = self;
            let Some(component) = store.get_mut(serial) else {
                continue;
            };
            if !component.update_referenced_components(source_manifest, manifest, map) {
                log.warning(format!(
                    "{} '{}': dangling references repaired to defaults",
                    component.component_type().type_name(),
                    component.name()
                ));
            }
        }
    }
}

impl ComponentIterator {
    /// 前进一步并解析组件
    pub fn next<'m>(&mut self, model: &'m Model) -> Option<&'m Component> {
        self.step(&model.store, model.content_version, true)
    }

    /// 后退一步并解析组件
    pub fn prev<'m>(&mut self, model: &'m Model) -> Option<&'m Component> {
        self.step(&model.store, model.content_version, false)
    }

    /// 解析当前组件（已被删除时为None）
    pub fn current<'m>(&self, model: &'m Model) -> Option<&'m Component> {
        self.resolve(&model.store)
    }
}
