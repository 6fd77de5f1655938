//! 组件类型与组件多态接口
//!
//! 文档中的每个命名/标识实体（图层、材质、几何对象等）都是一个组件。
//! 组件集合是封闭的：
//! - `ComponentType`: 类型枚举
//! - `ModelComponent`: 能力接口（标识、名称、校验、引用重映射）
//! - `Component`: 各载荷类型之上的和类型，按变体委托接口实现

use crate::error::ValidationLog;
use crate::geometry_object::ModelGeometry;
use crate::group::Group;
use crate::history::HistoryRecord;
use crate::instance::InstanceDefinition;
use crate::layer::Layer;
use crate::light::RenderLight;
use crate::linetype::LinePattern;
use crate::manifest::ComponentManifest;
use crate::manifest_map::ManifestMap;
use crate::material::{Image, RenderMaterial, TextureMapping};
use crate::style::{DimStyle, HatchPattern, TextStyle};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 组件类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ComponentType {
    #[default]
    Unset,
    Image,
    TextureMapping,
    RenderMaterial,
    LinePattern,
    Layer,
    Group,
    TextStyle,
    DimStyle,
    RenderLight,
    HatchPattern,
    InstanceDefinition,
    ModelGeometry,
    HistoryRecord,
    RenderContent,
    EmbeddedFile,
}

/// 文件中组件表的固定顺序（读写两侧必须一致）
pub const TABLE_ORDER: [ComponentType; 13] = [
    ComponentType::Image,
    ComponentType::TextureMapping,
    ComponentType::RenderMaterial,
    ComponentType::LinePattern,
    ComponentType::Layer,
    ComponentType::Group,
    ComponentType::TextStyle,
    ComponentType::DimStyle,
    ComponentType::RenderLight,
    ComponentType::HatchPattern,
    ComponentType::InstanceDefinition,
    ComponentType::ModelGeometry,
    ComponentType::HistoryRecord,
];

impl ComponentType {
    /// 该类型是否需要稠密的非负索引（文件内稳定）
    pub fn requires_index(&self) -> bool {
        matches!(
            self,
            ComponentType::Image
                | ComponentType::TextureMapping
                | ComponentType::RenderMaterial
                | ComponentType::LinePattern
                | ComponentType::Layer
                | ComponentType::Group
                | ComponentType::TextStyle
                | ComponentType::DimStyle
                | ComponentType::RenderLight
                | ComponentType::HatchPattern
                | ComponentType::InstanceDefinition
        )
    }

    /// 该类型是否要求（父作用域内的）名称唯一
    pub fn requires_unique_name(&self) -> bool {
        matches!(
            self,
            ComponentType::LinePattern
                | ComponentType::Layer
                | ComponentType::Group
                | ComponentType::TextStyle
                | ComponentType::DimStyle
                | ComponentType::HatchPattern
                | ComponentType::InstanceDefinition
        )
    }

    /// 类型名称
    pub fn type_name(&self) -> &'static str {
        match self {
            ComponentType::Unset => "Unset",
            ComponentType::Image => "Image",
            ComponentType::TextureMapping => "TextureMapping",
            ComponentType::RenderMaterial => "RenderMaterial",
            ComponentType::LinePattern => "LinePattern",
            ComponentType::Layer => "Layer",
            ComponentType::Group => "Group",
            ComponentType::TextStyle => "TextStyle",
            ComponentType::DimStyle => "DimStyle",
            ComponentType::RenderLight => "RenderLight",
            ComponentType::HatchPattern => "HatchPattern",
            ComponentType::InstanceDefinition => "InstanceDefinition",
            ComponentType::ModelGeometry => "ModelGeometry",
            ComponentType::HistoryRecord => "HistoryRecord",
            ComponentType::RenderContent => "RenderContent",
            ComponentType::EmbeddedFile => "EmbeddedFile",
        }
    }
}

/// 组件公共标识字段
///
/// 各载荷类型内嵌一份，接口的标识/名称方法默认委托到这里。
/// `index < 0` 表示尚未分配索引。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentBase {
    /// 持久标识（128位，一经分配不再为nil，跨保存/加载稳定）
    pub id: Uuid,
    /// 表内索引（-1 表示未分配）
    pub index: i32,
    /// 名称（父作用域内可能要求唯一）
    pub name: String,
    /// 父组件标识（如子图层的父图层；无父为nil）
    pub parent_id: Uuid,
}

impl Default for ComponentBase {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            index: -1,
            name: String::new(),
            parent_id: Uuid::nil(),
        }
    }
}

impl ComponentBase {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// 组件能力接口
///
/// 核心只通过这组方法访问载荷；载荷内部（几何数据、材质参数等）
/// 对清单/仓库/归档驱动层是不透明的。
pub trait ModelComponent {
    fn component_type(&self) -> ComponentType;

    fn base(&self) -> &ComponentBase;

    fn base_mut(&mut self) -> &mut ComponentBase;

    fn id(&self) -> Uuid {
        self.base().id
    }

    fn set_id(&mut self, id: Uuid) {
        self.base_mut().id = id;
    }

    /// 已分配的表内索引；未分配（或该类型不使用索引）时为None
    fn index(&self) -> Option<i32> {
        let index = self.base().index;
        (index >= 0).then_some(index)
    }

    fn set_index(&mut self, index: i32) {
        self.base_mut().index = index;
    }

    fn name(&self) -> &str {
        &self.base().name
    }

    fn set_name(&mut self, name: String) {
        self.base_mut().name = name;
    }

    fn parent_id(&self) -> Uuid {
        self.base().parent_id
    }

    /// 校验载荷内容，问题记入日志
    fn is_valid(&self, log: &mut ValidationLog) -> bool;

    /// 合并/导入后修复存量交叉引用
    ///
    /// 通过 `map` 把来源模型的索引/标识翻译为目标模型的对应值；
    /// 映射缺失或失效时回退到该引用的默认值并返回false，
    /// 绝不留下悬空引用。
    fn update_referenced_components(
        &mut self,
        source: &ComponentManifest,
        destination: &ComponentManifest,
        map: &ManifestMap,
    ) -> bool {
        let _ = (source, destination, map);
        true
    }
}

/// 组件和类型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Component {
    Image(Image),
    TextureMapping(TextureMapping),
    RenderMaterial(RenderMaterial),
    LinePattern(LinePattern),
    Layer(Layer),
    Group(Group),
    TextStyle(TextStyle),
    DimStyle(DimStyle),
    RenderLight(RenderLight),
    HatchPattern(HatchPattern),
    InstanceDefinition(InstanceDefinition),
    ModelGeometry(ModelGeometry),
    HistoryRecord(HistoryRecord),
}

impl Component {
    fn inner(&self) -> &dyn ModelComponent {
        match self {
            Component::Image(c) => c,
            Component::TextureMapping(c) => c,
            Component::RenderMaterial(c) => c,
            Component::LinePattern(c) => c,
            Component::Layer(c) => c,
            Component::Group(c) => c,
            Component::TextStyle(c) => c,
            Component::DimStyle(c) => c,
            Component::RenderLight(c) => c,
            Component::HatchPattern(c) => c,
            Component::InstanceDefinition(c) => c,
            Component::ModelGeometry(c) => c,
            Component::HistoryRecord(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ModelComponent {
        match self {
            Component::Image(c) => c,
            Component::TextureMapping(c) => c,
            Component::RenderMaterial(c) => c,
            Component::LinePattern(c) => c,
            Component::Layer(c) => c,
            Component::Group(c) => c,
            Component::TextStyle(c) => c,
            Component::DimStyle(c) => c,
            Component::RenderLight(c) => c,
            Component::HatchPattern(c) => c,
            Component::InstanceDefinition(c) => c,
            Component::ModelGeometry(c) => c,
            Component::HistoryRecord(c) => c,
        }
    }

    /// 取图层载荷（类型不符时为None）
    pub fn as_layer(&self) -> Option<&Layer> {
        match self {
            Component::Layer(layer) => Some(layer),
            _ => None,
        }
    }

    pub fn as_geometry(&self) -> Option<&ModelGeometry> {
        match self {
            Component::ModelGeometry(geometry) => Some(geometry),
            _ => None,
        }
    }

    pub fn as_geometry_mut(&mut self) -> Option<&mut ModelGeometry> {
        match self {
            Component::ModelGeometry(geometry) => Some(geometry),
            _ => None,
        }
    }
}

impl ModelComponent for Component {
    fn component_type(&self) -> ComponentType {
        self.inner().component_type()
    }

    fn base(&self) -> &ComponentBase {
        self.inner().base()
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        self.inner_mut().base_mut()
    }

    fn is_valid(&self, log: &mut ValidationLog) -> bool {
        self.inner().is_valid(log)
    }

    fn update_referenced_components(
        &mut self,
        source: &ComponentManifest,
        destination: &ComponentManifest,
        map: &ManifestMap,
    ) -> bool {
        self.inner_mut()
            .update_referenced_components(source, destination, map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_order_matches_capabilities() {
        // 表顺序里的类型都有归档表；前11个要求索引
        for (i, component_type) in TABLE_ORDER.iter().enumerate() {
            if i < 11 {
                assert!(component_type.requires_index(), "{component_type:?}");
            } else {
                assert!(!component_type.requires_index(), "{component_type:?}");
            }
        }
    }

    #[test]
    fn test_component_delegation() {
        let mut component = Component::Layer(Layer::new("墙体"));
        assert_eq!(component.component_type(), ComponentType::Layer);
        assert_eq!(component.name(), "墙体");
        assert_eq!(component.index(), None);

        component.set_index(3);
        assert_eq!(component.index(), Some(3));

        let id = Uuid::new_v4();
        component.set_id(id);
        assert_eq!(component.id(), id);
    }
}
