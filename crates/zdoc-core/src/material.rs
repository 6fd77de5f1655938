//! 渲染资源组件：位图、纹理映射、渲染材质

use crate::component::{ComponentBase, ComponentType, ModelComponent};
use crate::error::ValidationLog;
use crate::manifest::ComponentManifest;
use crate::manifest_map::ManifestMap;
use crate::properties::Color;
use serde::{Deserialize, Serialize};

/// 位图（嵌入或外链的图像资源）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Image {
    pub base: ComponentBase,

    /// 来源路径（外链时）
    pub source_path: String,

    /// 像素宽度
    pub width: u32,

    /// 像素高度
    pub height: u32,
}

impl Image {
    pub fn new(source_path: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            base: ComponentBase::default(),
            source_path: source_path.into(),
            width,
            height,
        }
    }
}

impl ModelComponent for Image {
    fn component_type(&self) -> ComponentType {
        ComponentType::Image
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
}

/// 纹理映射方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MappingKind {
    #[default]
    Surface,
    Planar,
    Cylindrical,
    Spherical,
    Box,
}

/// 纹理映射
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureMapping {
    pub base: ComponentBase,

    pub kind: MappingKind,

    /// UV缩放
    pub uv_scale: [f64; 2],
}

impl Default for TextureMapping {
    fn default() -> Self {
        Self {
            base: ComponentBase::default(),
            kind: MappingKind::Surface,
            uv_scale: [1.0, 1.0],
        }
    }
}

impl ModelComponent for TextureMapping {
    fn component_type(&self) -> ComponentType {
        ComponentType::TextureMapping
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn is_valid(&self, log: &mut ValidationLog) -> bool {
        if self.uv_scale.iter().any(|s| !s.is_finite()) {
            log.error("texture mapping has non-finite uv scale");
            return false;
        }
        true
    }
}

/// 渲染材质
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderMaterial {
    pub base: ComponentBase,

    /// 漫反射颜色
    pub diffuse: Color,

    /// 光泽度 [0, 1]
    pub shine: f64,

    /// 透明度 [0, 1]
    pub transparency: f64,

    /// 贴图位图索引（指向位图表；-1 表示无贴图）
    pub texture_image_index: i32,
}

impl Default for RenderMaterial {
    fn default() -> Self {
        Self {
            base: ComponentBase::default(),
            diffuse: Color::WHITE,
            shine: 0.0,
            transparency: 0.0,
            texture_image_index: -1,
        }
    }
}

impl RenderMaterial {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: ComponentBase::named(name),
            ..Self::default()
        }
    }
}

impl ModelComponent for RenderMaterial {
    fn component_type(&self) -> ComponentType {
        ComponentType::RenderMaterial
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn is_valid(&self, log: &mut ValidationLog) -> bool {
        if !(0.0..=1.0).contains(&self.shine) || !(0.0..=1.0).contains(&self.transparency) {
            log.error("material shine/transparency out of [0,1]");
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
        if self.texture_image_index < 0 {
            return true;
        }
        match map.get_and_validate_destination_index(
            ComponentType::Image,
            self.texture_image_index,
            destination,
        ) {
            Some(index) => {
                self.texture_image_index = index;
                true
            }
            None => {
                self.texture_image_index = -1;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_validity() {
        let mut log = ValidationLog::new();
        let mut material = RenderMaterial::new("Steel");
        assert!(material.is_valid(&mut log));

        material.transparency = 1.5;
        assert!(!material.is_valid(&mut log));
        assert_eq!(log.error_count, 1);
    }
}
