//! # 标识码校验与层解析
//!
//! 一次扫码得到一层码，按顺序经过以下关卡：
//! 1. NoRead 应答直接忽略
//! 2. 码数量必须等于层容量
//! 3. 层内不允许重复码
//! 4. 每个码的长度与 GTIN 校验
//!
//! 任何一关失败都只拒绝当前层，不影响后续扫码周期

use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// 单个码被拒绝的原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeRejection {
    /// 长度不等于配置长度
    InvalidLength { expected: usize, actual: usize },
    /// 码中不包含产品 GTIN
    GtinNotFound,
}

impl Display for CodeRejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeRejection::InvalidLength { expected, actual } => {
                write!(f, "码长度不正确: 期望 {}, 实际 {}", expected, actual)
            }
            CodeRejection::GtinNotFound => write!(f, "码中未找到GTIN"),
        }
    }
}

/// 单个码的校验结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: Option<CodeRejection>,
}

impl ValidationResult {
    fn accepted() -> Self {
        Self { valid: true, reason: None }
    }

    fn rejected(reason: CodeRejection) -> Self {
        Self { valid: false, reason: Some(reason) }
    }
}

/// 标识码校验器
#[derive(Debug, Clone)]
pub struct CodeValidator {
    gtin: String,
    code_length: usize,
}

impl CodeValidator {
    pub fn new(gtin: impl Into<String>, code_length: usize) -> Self {
        Self { gtin: gtin.into(), code_length }
    }

    pub fn gtin(&self) -> &str {
        &self.gtin
    }

    /// 先校验长度，再校验 GTIN 是否出现在码中（任意位置）
    ///
    /// 长度按字节计，与扫码器发出的原始码一致
    pub fn validate_code(&self, code: &str) -> ValidationResult {
        let actual = code.len();
        if actual != self.code_length {
            return ValidationResult::rejected(CodeRejection::InvalidLength {
                expected: self.code_length,
                actual,
            });
        }

        if !code.contains(self.gtin.as_str()) {
            return ValidationResult::rejected(CodeRejection::GtinNotFound);
        }

        ValidationResult::accepted()
    }

    /// 依次校验一层中的所有码，返回第一个不合格的码
    pub fn validate_codes(&self, codes: &[String]) -> Result<(), LayerRejection> {
        for code in codes {
            if let Some(reason) = self.validate_code(code).reason {
                return Err(LayerRejection::InvalidCode { code: code.clone(), reason });
            }
        }
        Ok(())
    }
}

/// 一次扫码的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerRead {
    /// 传感器触发了，但没有读到可解码的标识
    NoRead,
    Codes(Vec<String>),
}

/// 整层被拒绝的原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerRejection {
    /// 码数量与层容量不符
    WrongCount { expected: usize, actual: usize },
    /// 同一层出现重复码
    DuplicateInLayer { code: String },
    /// 某个码没有通过校验
    InvalidCode { code: String, reason: CodeRejection },
    /// 码已在本任务中使用过
    AlreadyUsed { codes: Vec<String> },
}

impl Display for LayerRejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerRejection::WrongCount { expected, actual } => {
                write!(f, "码数量不符: 期望 {}, 实际 {}", expected, actual)
            }
            LayerRejection::DuplicateInLayer { code } => write!(f, "层内重复码: {}", code),
            LayerRejection::InvalidCode { code, reason } => write!(f, "无效码 {}: {}", code, reason),
            LayerRejection::AlreadyUsed { codes } => write!(f, "码已使用: {}", codes.join(", ")),
        }
    }
}

/// 解析扫码器应答
///
/// 去掉首尾空白后等于 `no_read_answer`，或者没有任何内容时视为 NoRead
pub fn parse_layer(response: &str, no_read_answer: &str) -> LayerRead {
    let trimmed = response.trim();
    if trimmed.is_empty() || trimmed == no_read_answer {
        return LayerRead::NoRead;
    }
    LayerRead::Codes(trimmed.split_whitespace().map(str::to_string).collect())
}

/// 层级关卡：数量必须精确匹配，且层内无重复
pub fn check_layer(codes: &[String], expected: usize) -> Result<(), LayerRejection> {
    if codes.len() != expected {
        return Err(LayerRejection::WrongCount { expected, actual: codes.len() });
    }

    let mut seen = HashSet::with_capacity(codes.len());
    for code in codes {
        if !seen.insert(code.as_str()) {
            return Err(LayerRejection::DuplicateInLayer { code: code.clone() });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GTIN: &str = "04600000000017";

    fn code_with_gtin(suffix: &str) -> String {
        // 31 = "01" + 14 + "21" + 13
        format!("01{}21{:0>13}", GTIN, suffix)
    }

    fn codes(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validate_code_accepts_embedded_gtin() {
        let validator = CodeValidator::new(GTIN, 31);
        let code = code_with_gtin("ABC");
        assert_eq!(code.len(), 31);
        assert_eq!(validator.validate_code(&code), ValidationResult { valid: true, reason: None });
    }

    #[test]
    fn test_validate_code_checks_length_first() {
        let validator = CodeValidator::new(GTIN, 31);
        // 既不含GTIN长度也不对，应报长度错误
        let result = validator.validate_code("short");
        assert!(!result.valid);
        assert_eq!(result.reason, Some(CodeRejection::InvalidLength { expected: 31, actual: 5 }));
    }

    #[test]
    fn test_validate_code_gtin_not_prefix_anchored() {
        let validator = CodeValidator::new("GTIN", 20);
        assert!(validator.validate_code("0123456789012GTIN001").valid);
        assert!(validator.validate_code("GTIN0123456789012001").valid);
        let result = validator.validate_code("01234567890123456789");
        assert_eq!(result.reason, Some(CodeRejection::GtinNotFound));
    }

    #[test]
    fn test_validate_code_length_counts_bytes() {
        let validator = CodeValidator::new("GT", 4);
        // "ж" 占 2 个字节
        assert!(validator.validate_code("GTж").valid);
        let result = validator.validate_code("GTжж");
        assert_eq!(result.reason, Some(CodeRejection::InvalidLength { expected: 4, actual: 6 }));
    }

    #[test]
    fn test_parse_layer() {
        assert_eq!(parse_layer("NoRead", "NoRead"), LayerRead::NoRead);
        assert_eq!(parse_layer("  NoRead\r\n", "NoRead"), LayerRead::NoRead);
        assert_eq!(parse_layer("", "NoRead"), LayerRead::NoRead);
        assert_eq!(parse_layer("A B\tC\nD", "NoRead"), LayerRead::Codes(codes(&["A", "B", "C", "D"])));
    }

    #[test]
    fn test_check_layer_count_and_duplicates() {
        assert_eq!(check_layer(&codes(&["A", "B"]), 3), Err(LayerRejection::WrongCount { expected: 3, actual: 2 }));
        assert_eq!(check_layer(&codes(&["A", "B", "C", "D"]), 3), Err(LayerRejection::WrongCount { expected: 3, actual: 4 }));
        assert_eq!(
            check_layer(&codes(&["A", "B", "A"]), 3),
            Err(LayerRejection::DuplicateInLayer { code: "A".to_string() })
        );
        assert!(check_layer(&codes(&["A", "B", "C"]), 3).is_ok());
    }

    #[test]
    fn test_validate_codes_reports_first_invalid() {
        let validator = CodeValidator::new(GTIN, 31);
        let layer = vec![code_with_gtin("1"), "x".repeat(31), code_with_gtin("2")];
        match validator.validate_codes(&layer) {
            Err(LayerRejection::InvalidCode { code, reason }) => {
                assert_eq!(code, "x".repeat(31));
                assert_eq!(reason, CodeRejection::GtinNotFound);
            }
            other => panic!("期望 InvalidCode, 实际 {:?}", other),
        }
    }
}
