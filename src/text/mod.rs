//! 텍스트 후처리 모듈
//!
//! - patterns: 성씨 목록과 이름 정규식
//! - normalizer: 규칙표 기반 OCR 오류 교정

pub mod normalizer;
pub mod patterns;

pub use normalizer::{dictionary_rules, structural_rules, Rule, RuleSpec, RuleTable, TextNormalizer};
pub use patterns::{is_hangul_syllable, NAME_PATTERN, NAME_UNIT_PATTERN, SURNAMES};
