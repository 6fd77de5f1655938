//! 几何对象与对象属性
//!
//! 几何本体（曲线、网格等）对核心是不透明的字节载荷；
//! 核心只关心对象属性里的标识与交叉引用（图层/材质/线型/组）。

use crate::component::{ComponentBase, ComponentType, ModelComponent};
use crate::error::ValidationLog;
use crate::manifest::ComponentManifest;
use crate::manifest_map::ManifestMap;
use crate::properties::Color;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 三维轴对齐包围盒
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox3 {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox3 {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// 合并另一个包围盒
    pub fn union(&self, other: &BoundingBox3) -> BoundingBox3 {
        let mut min = self.min;
        let mut max = self.max;
        for axis in 0..3 {
            min[axis] = min[axis].min(other.min[axis]);
            max[axis] = max[axis].max(other.max[axis]);
        }
        BoundingBox3 { min, max }
    }

    pub fn is_valid(&self) -> bool {
        (0..3).all(|axis| {
            self.min[axis].is_finite()
                && self.max[axis].is_finite()
                && self.min[axis] <= self.max[axis]
        })
    }
}

/// 对象颜色来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ColorSource {
    /// 随图层
    #[default]
    FromLayer,
    /// 对象自身颜色
    FromObject,
}

/// 对象属性
///
/// 存量交叉引用的聚集地：图层索引、材质/线型覆盖、组成员关系。
/// `-1` 的覆盖索引表示"继承图层设置"。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectAttributes {
    /// 所属图层索引
    pub layer_index: i32,

    /// 渲染材质覆盖（-1 = 随图层）
    pub render_material_index: i32,

    /// 线型覆盖（-1 = 随图层）
    pub line_pattern_index: i32,

    /// 对象颜色
    pub color: Color,

    pub color_source: ColorSource,

    /// 所属组标识
    pub group_ids: Vec<Uuid>,
}

impl Default for ObjectAttributes {
    fn default() -> Self {
        Self {
            layer_index: 0,
            render_material_index: -1,
            line_pattern_index: -1,
            color: Color::BLACK,
            color_source: ColorSource::FromLayer,
            group_ids: Vec::new(),
        }
    }
}

/// 几何对象组件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelGeometry {
    pub base: ComponentBase,

    pub attributes: ObjectAttributes,

    /// 不透明几何载荷（由几何子系统编码/解码）
    pub geometry: Vec<u8>,

    /// 存储的包围盒（保存时写入，避免加载后重算）
    pub bounding_box: Option<BoundingBox3>,
}

impl ModelGeometry {
    pub fn new(geometry: Vec<u8>) -> Self {
        Self {
            geometry,
            ..Self::default()
        }
    }

    pub fn on_layer(mut self, layer_index: i32) -> Self {
        self.attributes.layer_index = layer_index;
        self
    }

    pub fn with_bounding_box(mut self, bounding_box: BoundingBox3) -> Self {
        self.bounding_box = Some(bounding_box);
        self
    }
}

impl ModelComponent for ModelGeometry {
    fn component_type(&self) -> ComponentType {
        ComponentType::ModelGeometry
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn is_valid(&self, log: &mut ValidationLog) -> bool {
        if self.attributes.layer_index < 0 {
            log.error("object attributes reference a negative layer index");
            return false;
        }
        if let Some(bounding_box) = &self.bounding_box {
            if !bounding_box.is_valid() {
                log.error("object bounding box is not valid");
                return false;
            }
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
        let attributes = &mut self.attributes;

        match map.get_and_validate_destination_index(
            ComponentType::Layer,
            attributes.layer_index,
            destination,
        ) {
            Some(index) => attributes.layer_index = index,
            None => {
                // 回退到默认图层
                attributes.layer_index = 0;
                intact = false;
            }
        }

        if attributes.render_material_index >= 0 {
            match map.get_and_validate_destination_index(
                ComponentType::RenderMaterial,
                attributes.render_material_index,
                destination,
            ) {
                Some(index) => attributes.render_material_index = index,
                None => {
                    attributes.render_material_index = -1;
                    intact = false;
                }
            }
        }

        if attributes.line_pattern_index >= 0 {
            match map.get_and_validate_destination_index(
                ComponentType::LinePattern,
                attributes.line_pattern_index,
                destination,
            ) {
                Some(index) => attributes.line_pattern_index = index,
                None => {
                    attributes.line_pattern_index = -1;
                    intact = false;
                }
            }
        }

        let groups_before = attributes.group_ids.len();
        attributes.group_ids = attributes
            .group_ids
            .iter()
            .filter_map(|id| map.get_and_validate_destination_id(*id, destination))
            .collect();
        if attributes.group_ids.len() != groups_before {
            intact = false;
        }

        intact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_union() {
        let a = BoundingBox3::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b = BoundingBox3::new([-1.0, 0.5, 0.0], [0.5, 2.0, 3.0]);
        let u = a.union(&b);
        assert_eq!(u.min, [-1.0, 0.0, 0.0]);
        assert_eq!(u.max, [1.0, 2.0, 3.0]);
        assert!(u.is_valid());
    }

    #[test]
    fn test_attribute_defaults() {
        let attributes = ObjectAttributes::default();
        assert_eq!(attributes.layer_index, 0);
        assert_eq!(attributes.render_material_index, -1);
        assert_eq!(attributes.line_pattern_index, -1);
    }
}
