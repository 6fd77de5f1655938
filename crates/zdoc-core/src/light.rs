//! 渲染光源

use crate::component::{ComponentBase, ComponentType, ModelComponent};
use crate::error::ValidationLog;
use serde::{Deserialize, Serialize};

/// 光源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LightKind {
    #[default]
    Point,
    Directional,
    Spot,
}

/// 渲染光源
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderLight {
    pub base: ComponentBase,

    pub kind: LightKind,

    /// 位置（点光源/聚光灯）或方向（平行光）
    pub location: [f64; 3],

    /// 强度 [0, 1]
    pub intensity: f64,

    pub enabled: bool,
}

impl Default for RenderLight {
    fn default() -> Self {
        Self {
            base: ComponentBase::default(),
            kind: LightKind::Point,
            location: [0.0, 0.0, 0.0],
            intensity: 1.0,
            enabled: true,
        }
    }
}

impl ModelComponent for RenderLight {
    fn component_type(&self) -> ComponentType {
        ComponentType::RenderLight
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn is_valid(&self, log: &mut ValidationLog) -> bool {
        if !(0.0..=1.0).contains(&self.intensity) {
            log.error("light intensity out of [0,1]");
            return false;
        }
        if self.location.iter().any(|v| !v.is_finite()) {
            log.error("light location is not finite");
            return false;
        }
        true
    }
}
