//! 清单映射
//!
//! 合并/导入期间"外来标识 ↔ 本模型标识"的双向翻译表。
//! 只在一次合并过程中存活，不持久化。

use crate::component::ComponentType;
use crate::manifest::ComponentManifest;
use rustc_hash::FxHashMap;
use uuid::Uuid;

/// 一条映射：来源模型里的身份 -> 本模型里分配到的身份
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestMapItem {
    pub component_type: ComponentType,
    /// 来源索引（来源类型不使用索引时为-1）
    pub source_index: i32,
    pub source_id: Uuid,
    /// 目标索引（目标类型不使用索引时为-1）
    pub destination_index: i32,
    pub destination_id: Uuid,
}

/// 清单映射
#[derive(Debug, Clone, Default)]
pub struct ManifestMap {
    /// 来源标识 -> 映射条目
    by_source_id: FxHashMap<Uuid, ManifestMapItem>,

    /// (类型, 来源索引) -> 来源标识
    by_source_index: FxHashMap<(ComponentType, i32), Uuid>,
}

impl ManifestMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_source_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source_id.is_empty()
    }

    /// 记录一条映射；同一来源键重复记录时静默覆盖（单次合并内幂等）
    pub fn add_item(&mut self, item: ManifestMapItem) {
        if !item.source_id.is_nil() {
            self.by_source_id.insert(item.source_id, item);
        }
        if item.source_index >= 0 {
            self.by_source_index
                .insert((item.component_type, item.source_index), item.source_id);
        }
    }

    /// 来源索引对应的目标索引
    pub fn destination_index(
        &self,
        component_type: ComponentType,
        source_index: i32,
    ) -> Option<i32> {
        let source_id = self.by_source_index.get(&(component_type, source_index))?;
        let item = self.by_source_id.get(source_id)?;
        (item.destination_index >= 0).then_some(item.destination_index)
    }

    /// 来源标识对应的目标标识
    pub fn destination_id(&self, source_id: Uuid) -> Option<Uuid> {
        let item = self.by_source_id.get(&source_id)?;
        (!item.destination_id.is_nil()).then_some(item.destination_id)
    }

    /// 查映射并校验目标条目仍然存在且类型相符
    ///
    /// 用于导入后改写存量交叉引用（如对象的图层索引）。
    /// 映射缺失或已失效时返回None，调用方应回退到默认引用，
    /// 绝不留下悬空索引。
    pub fn get_and_validate_destination_index(
        &self,
        component_type: ComponentType,
        source_index: i32,
        destination_manifest: &ComponentManifest,
    ) -> Option<i32> {
        let destination = self.destination_index(component_type, source_index)?;
        let item = destination_manifest.item_from_index(component_type, destination)?;
        (item.component_type == component_type).then_some(destination)
    }

    /// 查映射并校验目标标识仍然登记在目标清单中
    pub fn get_and_validate_destination_id(
        &self,
        source_id: Uuid,
        destination_manifest: &ComponentManifest,
    ) -> Option<Uuid> {
        let destination = self.destination_id(source_id)?;
        destination_manifest.item_from_id(destination)?;
        Some(destination)
    }
}
