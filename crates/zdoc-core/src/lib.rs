//! ZDOC 文档对象模型
//!
//! CAD文档的持久对象模型核心：
//! - `manifest`: 组件身份注册表（标识/索引/名称唯一性）
//! - `store`: 组件仓库（竞技场所有权 + 类型链表 + 安全遍历）
//! - `manifest_map`: 合并/导入时的身份翻译表
//! - `model`: 门面（增删查遍历、内容版本、合并）
//!
//! 归档读写在 `zdoc-file` 中实现，本crate不做任何文件I/O。
//!
//! # 示例
//!
//! ```rust
//! use zdoc_core::prelude::*;
//!
//! let mut model = Model::new();
//! let layer = model
//!     .add_component(Component::Layer(Layer::new("Walls")), true)
//!     .unwrap();
//!
//! assert_eq!(model.component_from_id(layer.id).unwrap().index(), Some(0));
//! ```

pub mod component;
pub mod error;
pub mod geometry_object;
pub mod group;
pub mod history;
pub mod instance;
pub mod layer;
pub mod light;
pub mod linetype;
pub mod manifest;
pub mod manifest_map;
pub mod material;
pub mod model;
pub mod properties;
pub mod store;
pub mod style;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::component::{
        Component, ComponentBase, ComponentType, ModelComponent, TABLE_ORDER,
    };
    pub use crate::error::{ModelError, ValidationLog};
    pub use crate::geometry_object::{BoundingBox3, ModelGeometry, ObjectAttributes};
    pub use crate::group::Group;
    pub use crate::history::HistoryRecord;
    pub use crate::instance::InstanceDefinition;
    pub use crate::layer::Layer;
    pub use crate::light::{LightKind, RenderLight};
    pub use crate::linetype::LinePattern;
    pub use crate::manifest::{ComponentManifest, ManifestItem};
    pub use crate::manifest_map::{ManifestMap, ManifestMapItem};
    pub use crate::material::{Image, MappingKind, RenderMaterial, TextureMapping};
    pub use crate::model::{
        ComponentRef, DocumentProperties, DocumentSettings, Model, UnitSystem, UserTable,
    };
    pub use crate::properties::Color;
    pub use crate::store::{ComponentIterator, ComponentStore};
    pub use crate::style::{DimStyle, HatchLine, HatchPattern, TextStyle};
}
