//! 注释样式组件：文字样式、标注样式、填充图案

use crate::component::{ComponentBase, ComponentType, ModelComponent};
use crate::error::ValidationLog;
use crate::manifest::ComponentManifest;
use crate::manifest_map::ManifestMap;
use serde::{Deserialize, Serialize};

/// 文字样式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextStyle {
    pub base: ComponentBase,

    /// 字体名称
    pub font_name: String,

    pub bold: bool,

    pub italic: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            base: ComponentBase::default(),
            font_name: "Arial".to_string(),
            bold: false,
            italic: false,
        }
    }
}

impl TextStyle {
    pub fn new(name: impl Into<String>, font_name: impl Into<String>) -> Self {
        Self {
            base: ComponentBase::named(name),
            font_name: font_name.into(),
            ..Self::default()
        }
    }
}

impl ModelComponent for TextStyle {
    fn component_type(&self) -> ComponentType {
        ComponentType::TextStyle
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn is_valid(&self, log: &mut ValidationLog) -> bool {
        if self.font_name.is_empty() {
            log.error("text style has no font name");
            return false;
        }
        true
    }
}

/// 标注样式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimStyle {
    pub base: ComponentBase,

    /// 标注文本高度（模型单位）
    pub text_height: f64,

    /// 箭头大小
    pub arrow_size: f64,

    /// 文字样式索引（指向文字样式表；-1 表示默认样式）
    pub text_style_index: i32,
}

impl Default for DimStyle {
    fn default() -> Self {
        Self {
            base: ComponentBase::default(),
            text_height: 2.5,
            arrow_size: 2.5,
            text_style_index: -1,
        }
    }
}

impl DimStyle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: ComponentBase::named(name),
            ..Self::default()
        }
    }
}

impl ModelComponent for DimStyle {
    fn component_type(&self) -> ComponentType {
        ComponentType::DimStyle
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn is_valid(&self, log: &mut ValidationLog) -> bool {
        if self.text_height <= 0.0 || !self.text_height.is_finite() {
            log.error("dim style text height must be positive");
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
        if self.text_style_index < 0 {
            return true;
        }
        match map.get_and_validate_destination_index(
            ComponentType::TextStyle,
            self.text_style_index,
            destination,
        ) {
            Some(index) => {
                self.text_style_index = index;
                true
            }
            None => {
                self.text_style_index = -1;
                false
            }
        }
    }
}

/// 填充图案
///
/// 每条图案线由 (角度, 基点偏移, 间距) 描述。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HatchPattern {
    pub base: ComponentBase,

    pub lines: Vec<HatchLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HatchLine {
    /// 角度（弧度）
    pub angle: f64,
    /// 基点偏移
    pub offset: [f64; 2],
    /// 平行线间距
    pub spacing: f64,
}

impl HatchPattern {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: ComponentBase::named(name),
            lines: Vec::new(),
        }
    }
}

impl ModelComponent for HatchPattern {
    fn component_type(&self) -> ComponentType {
        ComponentType::HatchPattern
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn is_valid(&self, log: &mut ValidationLog) -> bool {
        for line in &self.lines {
            if line.spacing <= 0.0 || !line.spacing.is_finite() {
                log.error("hatch line spacing must be positive");
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dim_style_validity() {
        let mut log = ValidationLog::new();
        let mut style = DimStyle::new("ISO-25");
        assert!(style.is_valid(&mut log));

        style.text_height = 0.0;
        assert!(!style.is_valid(&mut log));
    }
}
