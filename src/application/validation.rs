//! 命令字段校验
//!
//! 在领域逻辑之前做字段级检查（必填、长度、范围）

use super::ApplicationError;

pub trait Validate {
    fn validate(&self) -> Result<(), ApplicationError>;
}

/// 必填字符串（去空白后非空）
pub fn require(field: &str, value: &str) -> Result<(), ApplicationError> {
    if value.trim().is_empty() {
        return Err(ApplicationError::validation(format!("{} is required", field)));
    }
    Ok(())
}

/// 字符数范围
pub fn length_between(
    field: &str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ApplicationError> {
    let len = value.trim().chars().count();
    if len < min || len > max {
        return Err(ApplicationError::validation(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}
