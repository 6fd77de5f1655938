//! 历史记录
//!
//! 记录生成几何的操作及其前驱对象，操作本体是不透明载荷。

use crate::component::{ComponentBase, ComponentType, ModelComponent};
use crate::error::ValidationLog;
use crate::manifest::ComponentManifest;
use crate::manifest_map::ManifestMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 历史记录组件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub base: ComponentBase,

    /// 操作编号（由上层命令系统定义）
    pub operation: u32,

    /// 前驱对象标识
    pub antecedent_ids: Vec<Uuid>,

    /// 不透明操作载荷
    pub payload: Vec<u8>,
}

impl HistoryRecord {
    pub fn new(operation: u32) -> Self {
        Self {
            operation,
            ..Self::default()
        }
    }
}

impl ModelComponent for HistoryRecord {
    fn component_type(&self) -> ComponentType {
        ComponentType::HistoryRecord
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn is_valid(&self, _log: &mut ValidationLog) -> bool {
        true
    }

    fn update_referenced_components(
        &mut self,
        _source: &ComponentManifest,
        destination: &ComponentManifest,
        map: &ManifestMap,
    ) -> bool {
        let before = self.antecedent_ids.len();
        self.antecedent_ids = self
            .antecedent_ids
            .iter()
            .filter_map(|id| map.get_and_validate_destination_id(*id, destination))
            .collect();
        self.antecedent_ids.len() == before
    }
}
