//! 图层
//!
//! 图层持有两个存量交叉引用（线型索引、渲染材质索引），
//! 合并/导入后由清单映射统一修复。

use crate::component::{ComponentBase, ComponentType, ModelComponent};
use crate::error::ValidationLog;
use crate::manifest::ComponentManifest;
use crate::manifest_map::ManifestMap;
use crate::properties::Color;
use serde::{Deserialize, Serialize};

/// 图层
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub base: ComponentBase,

    /// 图层颜色
    pub color: Color,

    /// 是否可见
    pub visible: bool,

    /// 是否锁定
    pub locked: bool,

    /// 线型索引（指向线型表；-1 表示连续线型）
    pub line_pattern_index: i32,

    /// 渲染材质索引（指向材质表；-1 表示默认材质）
    pub render_material_index: i32,
}

impl Default for Layer {
    fn default() -> Self {
        Self {
            base: ComponentBase::default(),
            color: Color::BLACK,
            visible: true,
            locked: false,
            line_pattern_index: -1,
            render_material_index: -1,
        }
    }
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: ComponentBase::named(name),
            ..Self::default()
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }
}

impl ModelComponent for Layer {
    fn component_type(&self) -> ComponentType {
        ComponentType::Layer
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn is_valid(&self, log: &mut ValidationLog) -> bool {
        if self.base.name.is_empty() {
            log.error("layer has no name");
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
        let mut intact = true;

        if self.line_pattern_index >= 0 {
            match map.get_and_validate_destination_index(
                ComponentType::LinePattern,
                self.line_pattern_index,
                destination,
            ) {
                Some(index) => self.line_pattern_index = index,
                None => {
                    // 映射缺失：回退到连续线型
                    self.line_pattern_index = -1;
                    intact = false;
                }
            }
        }

        if self.render_material_index >= 0 {
            match map.get_and_validate_destination_index(
                ComponentType::RenderMaterial,
                self.render_material_index,
                destination,
            ) {
                Some(index) => self.render_material_index = index,
                None => {
                    self.render_material_index = -1;
                    intact = false;
                }
            }
        }

        // 父图层标识也要翻译
        if !self.base.parent_id.is_nil() {
            match map.get_and_validate_destination_id(self.base.parent_id, destination) {
                Some(id) => self.base.parent_id = id,
                None => {
                    self.base.parent_id = uuid::Uuid::nil();
                    intact = false;
                }
            }
        }

        intact
    }
}
