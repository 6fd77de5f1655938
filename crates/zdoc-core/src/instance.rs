//! 实例定义（块定义）

use crate::component::{ComponentBase, ComponentType, ModelComponent};
use crate::error::ValidationLog;
use crate::manifest::ComponentManifest;
use crate::manifest_map::ManifestMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 实例定义
///
/// 一组可被重复引用放置的几何对象，按持久标识引用成员。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceDefinition {
    pub base: ComponentBase,

    /// 描述
    pub description: String,

    /// 成员几何对象标识
    pub geometry_ids: Vec<Uuid>,

    /// 插入基点
    pub base_point: [f64; 3],
}

impl InstanceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: ComponentBase::named(name),
            ..Self::default()
        }
    }
}

impl ModelComponent for InstanceDefinition {
    fn component_type(&self) -> ComponentType {
        ComponentType::InstanceDefinition
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn is_valid(&self, log: &mut ValidationLog) -> bool {
        if self.geometry_ids.iter().any(Uuid::is_nil) {
            log.error("instance definition contains nil geometry id");
            return false;
        }
        if self.base_point.iter().any(|v| !v.is_finite()) {
            log.error("instance definition base point is not finite");
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
        let before = self.geometry_ids.len();
        self.geometry_ids = self
            .geometry_ids
            .iter()
            .filter_map(|id| map.get_and_validate_destination_id(*id, destination))
            .collect();
        self.geometry_ids.len() == before
    }
}
