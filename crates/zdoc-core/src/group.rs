//! 组

use crate::component::{ComponentBase, ComponentType, ModelComponent};
use crate::error::ValidationLog;
use crate::manifest::ComponentManifest;
use crate::manifest_map::ManifestMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 组（几何对象的命名集合）
///
/// 成员以持久标识引用；合并后标识经映射翻译，
/// 无法翻译的成员直接剔除而不是留下悬空标识。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Group {
    pub base: ComponentBase,

    /// 成员几何对象标识
    pub member_ids: Vec<Uuid>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: ComponentBase::named(name),
            member_ids: Vec::new(),
        }
    }

    pub fn member_count(&self) -> usize {
        self.member_ids.len()
    }
}

impl ModelComponent for Group {
    fn component_type(&self) -> ComponentType {
        ComponentType::Group
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn is_valid(&self, log: &mut ValidationLog) -> bool {
        if self.member_ids.iter().any(Uuid::is_nil) {
            log.error("group contains nil member id");
            return false;
        }
        true
    }

    fn update_referenced_components(
        &mut self,
        _source: &ComponentManifest,
        destination: &ComponentManifest,
        map: &ManifestMap,
    ) -> bool {
        let before = self.member_ids.len();
        let mut translated = Vec::with_capacity(before);
        for member in &self.member_ids {
            if let Some(id) = map.get_and_validate_destination_id(*member, destination) {
                translated.push(id);
            }
        }
        self.member_ids = translated;
        self.member_ids.len() == before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_validity() {
        let mut log = ValidationLog::new();
        let mut group = Group::new("selection");
        group.member_ids.push(Uuid::new_v4());
        assert!(group.is_valid(&mut log));

        group.member_ids.push(Uuid::nil());
        assert!(!group.is_valid(&mut log));
    }
}
