//! 模型错误定义与校验日志

use crate::component::ComponentType;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Duplicate component id: {0}")]
    DuplicateId(Uuid),

    #[error("Duplicate component name: {0}")]
    DuplicateName(String),

    #[error("Invalid component name: {0:?}")]
    InvalidName(String),

    #[error("Component index space exhausted for {0:?}")]
    ManifestFull(ComponentType),

    #[error("Component not found: {0}")]
    NotFound(Uuid),

    #[error("Wrong component type: {0:?}")]
    WrongComponentType(ComponentType),
}

/// 错误/警告累计器
///
/// 显式的计数值，在校验、归档读写和合并的调用树中逐层传递，
/// 调用方在批量操作结束后检查计数判断结果是否可信。
/// 不使用全局状态。
#[derive(Debug, Default, Clone)]
pub struct ValidationLog {
    /// 错误数量
    pub error_count: u32,
    /// 警告数量
    pub warning_count: u32,
}

impl ValidationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个错误并输出日志
    pub fn error(&mut self, message: impl AsRef<str>) {
        tracing::error!("{}", message.as_ref());
        self.error_count = self.error_count.saturating_add(1);
    }

    /// 记录一个警告并输出日志
    pub fn warning(&mut self, message: impl AsRef<str>) {
        tracing::warn!("{}", message.as_ref());
        self.warning_count = self.warning_count.saturating_add(1);
    }

    /// 是否没有任何错误和警告
    pub fn is_clean(&self) -> bool {
        self.error_count == 0 && self.warning_count == 0
    }

    /// 合并另一个日志的计数
    pub fn absorb(&mut self, other: &ValidationLog) {
        self.error_count = self.error_count.saturating_add(other.error_count);
        self.warning_count = self.warning_count.saturating_add(other.warning_count);
    }
}
