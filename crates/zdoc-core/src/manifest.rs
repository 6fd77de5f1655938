//! 组件清单
//!
//! 模型的权威身份注册表：维护 (类型, 索引, 标识, 名称哈希) 四元组，
//! 强制唯一性约束，分配未占用的索引与名称。与存储层无关。
//!
//! 约束：
//! - 标识在整个模型内唯一
//! - 要求唯一名称的类型在 (类型, 父标识) 作用域内名称哈希唯一
//! - 要求索引的类型从0开始稠密分配，会话内已分配的索引不回收复用

use crate::component::ComponentType;
use crate::error::ModelError;
use rustc_hash::{FxHashMap, FxHasher};
use serde::{Deserialize, Serialize};
use std::hash::Hasher;
use uuid::Uuid;

/// 清单条目
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestItem {
    pub component_type: ComponentType,
    /// 表内索引（该类型不使用索引时为None）
    pub index: Option<i32>,
    /// 持久标识
    pub id: Uuid,
    /// 父组件标识（名称作用域）
    pub parent_id: Uuid,
    /// 大小写不敏感的名称哈希（空名称为0）
    pub name_hash: u64,
    /// 运行期序列号（进程内唯一，用于弱引用解析）
    pub serial_number: u64,
}

/// 计算大小写不敏感的名称哈希
///
/// 空名称固定返回0，且永远不参与唯一性匹配。
pub fn name_hash(name: &str) -> u64 {
    if name.is_empty() {
        return 0;
    }
    let mut hasher = FxHasher::default();
    for c in name.chars().flat_map(char::to_lowercase) {
        hasher.write_u32(c as u32);
    }
    let hash = hasher.finish();
    // 0 保留给空名称
    if hash == 0 {
        1
    } else {
        hash
    }
}

/// 组件名称是否合法
///
/// 不允许空名称、控制字符以及首尾空白。
pub fn is_valid_component_name(name: &str) -> bool {
    if name.is_empty() || name.trim() != name {
        return false;
    }
    !name.chars().any(char::is_control)
}

/// 组件清单
#[derive(Debug, Clone, Default)]
pub struct ComponentManifest {
    /// 标识 -> 条目
    items: FxHashMap<Uuid, ManifestItem>,

    /// (类型, 索引) -> 标识
    index_map: FxHashMap<(ComponentType, i32), Uuid>,

    /// (类型, 父标识, 名称哈希) -> 标识
    name_map: FxHashMap<(ComponentType, Uuid, u64), Uuid>,

    /// 每类型下一个待分配索引（即索引上限，只增不减）
    next_index: FxHashMap<ComponentType, i32>,

    /// 每类型条目计数
    counts: FxHashMap<ComponentType, usize>,
}

impl ComponentManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已分配索引的上限（最高已分配索引 + 1）
    ///
    /// 会话内索引不回收，该值只增不减。
    pub fn component_index_limit(&self, component_type: ComponentType) -> i32 {
        *self.next_index.get(&component_type).unwrap_or(&0)
    }

    /// 按标识查找
    pub fn item_from_id(&self, id: Uuid) -> Option<&ManifestItem> {
        self.items.get(&id)
    }

    /// 按 (类型, 索引) 查找
    pub fn item_from_index(&self, component_type: ComponentType, index: i32) -> Option<&ManifestItem> {
        let id = self.index_map.get(&(component_type, index))?;
        self.items.get(id)
    }

    /// 按 (类型, 父标识, 名称) 查找
    pub fn item_from_name(
        &self,
        component_type: ComponentType,
        parent_id: Uuid,
        name: &str,
    ) -> Option<&ManifestItem> {
        self.item_from_name_hash(component_type, parent_id, name_hash(name))
    }

    /// 按 (类型, 父标识, 名称哈希) 查找
    pub fn item_from_name_hash(
        &self,
        component_type: ComponentType,
        parent_id: Uuid,
        name_hash: u64,
    ) -> Option<&ManifestItem> {
        if name_hash == 0 {
            return None;
        }
        let id = self.name_map.get(&(component_type, parent_id, name_hash))?;
        self.items.get(id)
    }

    /// 类型内条目数量
    pub fn item_count(&self, component_type: ComponentType) -> usize {
        *self.counts.get(&component_type).unwrap_or(&0)
    }

    /// 全部条目数量
    pub fn total_count(&self) -> usize {
        self.items.len()
    }

    /// 遍历某类型的全部条目（无序）
    pub fn items_of_type(
        &self,
        component_type: ComponentType,
    ) -> impl Iterator<Item = &ManifestItem> {
        self.items
            .values()
            .filter(move |item| item.component_type == component_type)
    }

    /// 返回一个未被占用的名称
    ///
    /// `candidate` 可用时原样返回，否则确定性地追加 ` (n)` 数字后缀，
    /// 结果保证通过唯一性校验。
    pub fn unused_name(
        &self,
        component_type: ComponentType,
        parent_id: Uuid,
        candidate: &str,
    ) -> String {
        let root = if is_valid_component_name(candidate) {
            candidate
        } else {
            component_type.type_name()
        };

        if self
            .item_from_name(component_type, parent_id, root)
            .is_none()
        {
            return root.to_string();
        }

        let mut n: u32 = 1;
        loop {
            let candidate = format!("{root} ({n})");
            if self
                .item_from_name(component_type, parent_id, &candidate)
                .is_none()
            {
                return candidate;
            }
            n += 1;
        }
    }

    /// 校验并按策略修复候选标识与名称
    ///
    /// - 标识为nil或冲突：`resolve_id_conflict` 时生成新标识，否则 `DuplicateId`
    /// - 名称为空/非法或冲突（仅对要求唯一名称的类型）：
    ///   `resolve_name_conflict` 时经 [`Self::unused_name`] 修复，
    ///   否则 `InvalidName` / `DuplicateName`
    pub fn validate_id_and_name(
        &self,
        component_type: ComponentType,
        candidate_id: Uuid,
        parent_id: Uuid,
        candidate_name: &str,
        resolve_id_conflict: bool,
        resolve_name_conflict: bool,
    ) -> Result<(Uuid, String), ModelError> {
        let id = if candidate_id.is_nil() || self.items.contains_key(&candidate_id) {
            if !resolve_id_conflict {
                return Err(ModelError::DuplicateId(candidate_id));
            }
            let mut id = Uuid::new_v4();
            while self.items.contains_key(&id) {
                id = Uuid::new_v4();
            }
            id
        } else {
            candidate_id
        };

        if !component_type.requires_unique_name() {
            return Ok((id, candidate_name.to_string()));
        }

        if !is_valid_component_name(candidate_name) {
            if !resolve_name_conflict {
                return Err(ModelError::InvalidName(candidate_name.to_string()));
            }
            let name = self.unused_name(component_type, parent_id, "");
            return Ok((id, name));
        }

        if self
            .item_from_name(component_type, parent_id, candidate_name)
            .is_some()
        {
            if !resolve_name_conflict {
                return Err(ModelError::DuplicateName(candidate_name.to_string()));
            }
            let name = self.unused_name(component_type, parent_id, candidate_name);
            return Ok((id, name));
        }

        Ok((id, candidate_name.to_string()))
    }

    /// 注册组件
    ///
    /// 要求索引的类型分配下一个未用索引；`requested_index` 未被占用时
    /// 予以保留（加载文件时保持文件内索引稳定），并把索引上限推过它。
    /// 索引空间（31位）耗尽时返回 `ManifestFull`。
    pub fn add_component(
        &mut self,
        component_type: ComponentType,
        serial_number: u64,
        id: Uuid,
        parent_id: Uuid,
        name: &str,
        requested_index: Option<i32>,
    ) -> Result<ManifestItem, ModelError> {
        if id.is_nil() || self.items.contains_key(&id) {
            return Err(ModelError::DuplicateId(id));
        }

        let hash = name_hash(name);
        if component_type.requires_unique_name()
            && hash != 0
            && self.name_map.contains_key(&(component_type, parent_id, hash))
        {
            return Err(ModelError::DuplicateName(name.to_string()));
        }

        let index = if component_type.requires_index() {
            let next = self.component_index_limit(component_type);
            let index = match requested_index {
                Some(requested)
                    if requested >= 0
                        && !self.index_map.contains_key(&(component_type, requested)) =>
                {
                    requested
                }
                _ => next,
            };
            if index == i32::MAX {
                return Err(ModelError::ManifestFull(component_type));
            }
            self.next_index
                .insert(component_type, next.max(index + 1));
            Some(index)
        } else {
            None
        };

        let item = ManifestItem {
            component_type,
            index,
            id,
            parent_id,
            name_hash: hash,
            serial_number,
        };

        self.items.insert(id, item);
        if let Some(index) = index {
            self.index_map.insert((component_type, index), id);
        }
        if component_type.requires_unique_name() && hash != 0 {
            self.name_map.insert((component_type, parent_id, hash), id);
        }
        *self.counts.entry(component_type).or_insert(0) += 1;

        Ok(item)
    }

    /// 删除条目；不存在时返回false
    ///
    /// 只动清单，不触碰组件仓库；已分配的索引不会回落。
    pub fn remove_component(&mut self, id: Uuid) -> bool {
        let Some(item) = self.items.remove(&id) else {
            return false;
        };

        if let Some(index) = item.index {
            self.index_map.remove(&(item.component_type, index));
        }
        if item.name_hash != 0 {
            let key = (item.component_type, item.parent_id, item.name_hash);
            if self.name_map.get(&key) == Some(&id) {
                self.name_map.remove(&key);
            }
        }
        if let Some(count) = self.counts.get_mut(&item.component_type) {
            *count = count.saturating_sub(1);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_layer(
        manifest: &mut ComponentManifest,
        serial: u64,
        name: &str,
    ) -> ManifestItem {
        manifest
            .add_component(
                ComponentType::Layer,
                serial,
                Uuid::new_v4(),
                Uuid::nil(),
                name,
                None,
            )
            .expect("add layer")
    }

    #[test]
    fn test_dense_index_assignment() {
        let mut manifest = ComponentManifest::new();
        let a = add_layer(&mut manifest, 1, "A");
        let b = add_layer(&mut manifest, 2, "B");
        assert_eq!(a.index, Some(0));
        assert_eq!(b.index, Some(1));
        assert_eq!(manifest.component_index_limit(ComponentType::Layer), 2);

        // 删除不回收索引
        assert!(manifest.remove_component(a.id));
        let c = add_layer(&mut manifest, 3, "C");
        assert_eq!(c.index, Some(2));
        assert_eq!(manifest.component_index_limit(ComponentType::Layer), 3);
        assert!(manifest.item_from_index(ComponentType::Layer, 0).is_none());
    }

    #[test]
    fn test_requested_index_preserved() {
        let mut manifest = ComponentManifest::new();
        let item = manifest
            .add_component(
                ComponentType::Layer,
                1,
                Uuid::new_v4(),
                Uuid::nil(),
                "Kept",
                Some(5),
            )
            .expect("add");
        assert_eq!(item.index, Some(5));
        assert_eq!(manifest.component_index_limit(ComponentType::Layer), 6);

        // 已占用的请求索引退回顺序分配
        let other = manifest
            .add_component(
                ComponentType::Layer,
                2,
                Uuid::new_v4(),
                Uuid::nil(),
                "Bumped",
                Some(5),
            )
            .expect("add");
        assert_eq!(other.index, Some(6));
    }

    #[test]
    fn test_unused_name_suffix() {
        let mut manifest = ComponentManifest::new();
        add_layer(&mut manifest, 1, "Alpha");
        assert_eq!(
            manifest.unused_name(ComponentType::Layer, Uuid::nil(), "Alpha"),
            "Alpha (1)"
        );
        add_layer(&mut manifest, 2, "Alpha (1)");
        assert_eq!(
            manifest.unused_name(ComponentType::Layer, Uuid::nil(), "Alpha"),
            "Alpha (2)"
        );
        assert_eq!(
            manifest.unused_name(ComponentType::Layer, Uuid::nil(), "Beta"),
            "Beta"
        );
    }

    #[test]
    fn test_name_uniqueness_is_case_insensitive_and_parent_scoped() {
        let mut manifest = ComponentManifest::new();
        let item = add_layer(&mut manifest, 1, "Walls");
        assert!(manifest
            .item_from_name(ComponentType::Layer, Uuid::nil(), "WALLS")
            .is_some());

        // 同名不同父作用域不冲突
        let sub = manifest.add_component(
            ComponentType::Layer,
            2,
            Uuid::new_v4(),
            item.id,
            "Walls",
            None,
        );
        assert!(sub.is_ok());
    }

    #[test]
    fn test_validate_id_and_name_policies() {
        let mut manifest = ComponentManifest::new();
        let existing = add_layer(&mut manifest, 1, "Alpha");

        // 冲突标识：不允许修复则失败
        let err = manifest.validate_id_and_name(
            ComponentType::Layer,
            existing.id,
            Uuid::nil(),
            "Fresh",
            false,
            false,
        );
        assert!(matches!(err, Err(ModelError::DuplicateId(_))));

        // 冲突名称：允许修复则得到后缀名
        let (id, name) = manifest
            .validate_id_and_name(
                ComponentType::Layer,
                Uuid::nil(),
                Uuid::nil(),
                "Alpha",
                true,
                true,
            )
            .expect("resolved");
        assert!(!id.is_nil());
        assert_eq!(name, "Alpha (1)");

        // 非法名称：不允许修复则失败
        let err = manifest.validate_id_and_name(
            ComponentType::Layer,
            Uuid::nil(),
            Uuid::nil(),
            "",
            true,
            false,
        );
        assert!(matches!(err, Err(ModelError::InvalidName(_))));
    }

    #[test]
    fn test_manifest_full() {
        let mut manifest = ComponentManifest::new();
        manifest.next_index.insert(ComponentType::Layer, i32::MAX);
        let err = manifest.add_component(
            ComponentType::Layer,
            1,
            Uuid::new_v4(),
            Uuid::nil(),
            "Overflow",
            None,
        );
        assert!(matches!(
            err,
            Err(ModelError::ManifestFull(ComponentType::Layer))
        ));
    }
}
