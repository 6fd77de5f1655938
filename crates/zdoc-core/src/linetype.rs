//! 线型

use crate::component::{ComponentBase, ComponentType, ModelComponent};
use crate::error::ValidationLog;
use serde::{Deserialize, Serialize};

/// 线型（虚线段模式）
///
/// `segments` 交替表示画线/空白长度；空序列表示连续线型。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinePattern {
    pub base: ComponentBase,

    /// 画线/空白交替长度（模型单位）
    pub segments: Vec<f64>,
}

impl LinePattern {
    pub fn new(name: impl Into<String>, segments: Vec<f64>) -> Self {
        Self {
            base: ComponentBase::named(name),
            segments,
        }
    }

    /// 一个完整模式周期的长度
    pub fn pattern_length(&self) -> f64 {
        self.segments.iter().map(|s| s.abs()).sum()
    }
}

impl ModelComponent for LinePattern {
    fn component_type(&self) -> ComponentType {
        ComponentType::LinePattern
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn is_valid(&self, log: &mut ValidationLog) -> bool {
        if self.segments.iter().any(|s| !s.is_finite()) {
            log.error("line pattern contains non-finite segment length");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_length() {
        let pattern = LinePattern::new("Dashed", vec![5.0, -2.5]);
        assert!((pattern.pattern_length() - 7.5).abs() < f64::EPSILON);
    }
}
