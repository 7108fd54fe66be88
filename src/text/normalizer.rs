//! OCR 텍스트 정규화
//!
//! 인식 결과의 체계적인 오류(음절 사이 공백, 깨진 용어, 이름+날짜 간격 등)를
//! 순서가 정해진 (패턴, 치환) 규칙표로 교정합니다.
//!
//! 규칙표는 두 부분으로 나뉩니다.
//! - 구조 규칙: 공백 정리, 페이지 번호 제거, 한글 음절 결합, 이름 간격 (고정)
//! - 붙어버린 CamelCase 분리 (보호 용어 제외)
//! - 사전 규칙: 알려진 오인식 용어 교정 (JSON으로 교체/확장 가능)
//!
//! 전체 규칙 순서를 고정점에 도달할 때까지 반복하므로
//! `normalize(normalize(t)) == normalize(t)` 가 성립합니다.
//! 추가 규칙은 텍스트를 끝없이 늘리거나 서로 되돌리면 안 됩니다.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use once_cell::sync::Lazy;

use super::patterns::surname_alternation;

/// 분리하지 않는 CamelCase 용어
pub const PROTECTED_TERMS: &[&str] = &[
    "JavaScript",
    "TypeScript",
    "CoffeeScript",
    "GitHub",
    "GitLab",
    "BitBucket",
    "PostgreSQL",
    "MySQL",
    "NoSQL",
    "GraphQL",
    "MongoDB",
    "DynamoDB",
    "MariaDB",
    "FastAPI",
    "OpenAI",
    "OpenCV",
    "PyTorch",
    "TensorFlow",
    "LinkedIn",
    "DevOps",
    "WebSocket",
    "IntelliJ",
    "JetBrains",
    "PowerPoint",
    "YouTube",
    "WordPress",
    "jQuery",
    "iOS",
    "macOS",
    "iPhone",
    "iPad",
    "NestJS",
    "LangChain",
    "RabbitMQ",
    "ElasticSearch",
];

static LETTER_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z]+").expect("letter run pattern is valid"));

// ============================================================================
// Rule Table
// ============================================================================

/// 규칙 정의 (설정 파일 형식)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSpec {
    /// 규칙 이름 (로그/테스트용)
    pub name: String,
    /// 정규식 패턴
    pub pattern: String,
    /// 치환 문자열 (`${1}` 캡처 참조 가능)
    pub replacement: String,
    /// 변화가 없을 때까지 이 규칙만 반복 적용
    #[serde(default)]
    pub repeat: bool,
}

impl RuleSpec {
    fn new(name: &str, pattern: &str, replacement: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
            repeat: false,
        }
    }

    fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }
}

/// 컴파일된 규칙
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pattern: Regex,
    replacement: String,
    repeat: bool,
}

impl Rule {
    /// 규칙 컴파일
    pub fn compile(spec: &RuleSpec) -> Result<Self> {
        let pattern = Regex::new(&spec.pattern)
            .with_context(|| format!("Invalid pattern in rule '{}'", spec.name))?;

        Ok(Self {
            name: spec.name.clone(),
            pattern,
            replacement: spec.replacement.clone(),
            repeat: spec.repeat,
        })
    }

    /// 규칙 1회 적용
    pub fn apply(&self, text: &str) -> String {
        let mut current = self.pattern.replace_all(text, self.replacement.as_str()).into_owned();

        if self.repeat {
            loop {
                let next = self
                    .pattern
                    .replace_all(&current, self.replacement.as_str())
                    .into_owned();
                if next == current {
                    break;
                }
                current = next;
            }
        }

        current
    }
}

/// 순서가 있는 규칙표
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    /// 규칙 정의 목록에서 생성
    pub fn from_specs(specs: &[RuleSpec]) -> Result<Self> {
        let rules = specs.iter().map(Rule::compile).collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// JSON 배열에서 생성
    pub fn from_json(json: &str) -> Result<Self> {
        let specs: Vec<RuleSpec> =
            serde_json::from_str(json).context("Failed to parse normalizer rules")?;
        Self::from_specs(&specs)
    }

    /// JSON 파일에서 생성
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file: {:?}", path))?;
        Self::from_json(&json)
    }

    /// 규칙 개수
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 뒤에 다른 규칙표 이어붙이기
    pub fn extend(&mut self, other: RuleTable) {
        self.rules.extend(other.rules);
    }

    /// 모든 규칙을 순서대로 1회 적용
    pub fn apply(&self, text: &str) -> String {
        self.rules
            .iter()
            .fold(text.to_string(), |acc, rule| rule.apply(&acc))
    }
}

// ============================================================================
// Built-in Rules
// ============================================================================

/// 1~5단계 구조 규칙
pub fn structural_rules() -> Vec<RuleSpec> {
    vec![
        // 1. 공백 정리
        RuleSpec::new("collapse-whitespace", r"\s+", " "),
        // 2. 페이지 번호 제거
        RuleSpec::new("strip-page-numbers", r"(?i)\b\d+\s*(?:페이지|pages?)\b", "").repeating(),
        RuleSpec::new(
            "strip-stray-symbols",
            r"[^\w\s.,!?;:\-()\[\]{}@#$%^&*+=|~`<>/\\]",
            "",
        ),
        // 3. 한글 음절 사이의 잘못된 공백
        RuleSpec::new("join-hangul-syllables", r"([가-힣])\s+([가-힣])", "${1}${2}").repeating(),
        // 4. 이름(날짜) 간격
        RuleSpec::new(
            "name-date-spacing",
            r"([가-힣]{2,4})\s*\((\d{2}\.\d{2}\.\d{2})\)",
            "${1} (${2})",
        ),
        // 5. 성씨 + 이름 사이 공백
        RuleSpec::new(
            "join-surname",
            &format!(r"({})\s+([가-힣]{{1,3}})", surname_alternation()),
            "${1}${2}",
        ),
    ]
}

/// 6단계 사전 규칙 (알려진 오인식 용어)
///
/// 겹쳐 반복된 오인식(`PythonScriptScript`)도 한 번에 정리되도록 모두 반복 규칙입니다.
pub fn dictionary_rules() -> Vec<RuleSpec> {
    let rules = vec![
        RuleSpec::new("이름", r"이\s+름", "이름"),
        RuleSpec::new("생년", r"생\s+년", "생년"),
        RuleSpec::new("생년월일", r"생년\s*월\s+일", "생년월일"),
        RuleSpec::new("연락처", r"연\s*락\s+처", "연락처"),
        RuleSpec::new("날짜정보", r"(?:낙짜|날짜)\s*전부", "날짜정보"),
        RuleSpec::new("원-간격", r"(\d+)\s+원", "${1}원"),
        RuleSpec::new("API", r"APIz\s*\}\s*(\d+)", "API ${1}"),
        RuleSpec::new("JavaScript", r"Java\s+Script", "JavaScript"),
        RuleSpec::new("TypeScript", r"Type\s+Script", "TypeScript"),
        RuleSpec::new("Node.js", r"Node\.\s+js", "Node.js"),
        RuleSpec::new("React.js", r"React\s*JS\b", "React.js"),
        RuleSpec::new("Spring Boot", r"Spring\s*Boot", "Spring Boot"),
        RuleSpec::new("GitHub", r"Git\s+Hub", "GitHub"),
        RuleSpec::new("Python", r"Python\s*Script", "Python"),
        RuleSpec::new("Docker", r"Docker\s*Container", "Docker"),
    ];
    rules.into_iter().map(RuleSpec::repeating).collect()
}

/// 7단계 마무리 규칙
fn final_rules() -> Vec<RuleSpec> {
    vec![RuleSpec::new("final-collapse", r"\s+", " ")]
}

// ============================================================================
// CamelCase Split
// ============================================================================

/// 소문자 뒤에 대문자가 붙은 영문 단어를 분리 (`fooBar` → `foo Bar`)
#[derive(Debug, Clone)]
pub struct CamelCaseSplitter {
    protected: HashSet<String>,
}

impl Default for CamelCaseSplitter {
    fn default() -> Self {
        Self::new(PROTECTED_TERMS.iter().copied())
    }
}

impl CamelCaseSplitter {
    pub fn new<'a>(protected: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            protected: protected.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn apply(&self, text: &str) -> String {
        LETTER_RUN
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let word = &caps[0];
                if self.protected.contains(word) {
                    word.to_string()
                } else {
                    split_camel(word)
                }
            })
            .into_owned()
    }
}

fn split_camel(word: &str) -> String {
    let mut out = String::with_capacity(word.len() + 4);
    let mut prev_lower = false;
    for c in word.chars() {
        if prev_lower && c.is_ascii_uppercase() {
            out.push(' ');
        }
        out.push(c);
        prev_lower = c.is_ascii_lowercase();
    }
    out
}

// ============================================================================
// TextNormalizer
// ============================================================================

/// 텍스트 정규화기
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    structural: RuleTable,
    camel: CamelCaseSplitter,
    dictionary: RuleTable,
    finishing: RuleTable,
}

impl TextNormalizer {
    /// 내장 사전으로 생성
    pub fn new() -> Result<Self> {
        Self::with_dictionary(RuleTable::from_specs(&dictionary_rules())?)
    }

    /// 사전 규칙을 지정하여 생성 (구조 규칙은 고정)
    pub fn with_dictionary(dictionary: RuleTable) -> Result<Self> {
        Ok(Self {
            structural: RuleTable::from_specs(&structural_rules())?,
            camel: CamelCaseSplitter::default(),
            dictionary,
            finishing: RuleTable::from_specs(&final_rules())?,
        })
    }

    /// 설정 파일이 있으면 내장 사전 뒤에 추가 규칙을 붙여서 생성
    pub fn from_rules_file(path: Option<&Path>) -> Result<Self> {
        let mut dictionary = RuleTable::from_specs(&dictionary_rules())?;

        if let Some(path) = path {
            let extra = RuleTable::load(path)?;
            tracing::info!("Loaded {} normalizer rules from {:?}", extra.len(), path);
            dictionary.extend(extra);
        }

        Self::with_dictionary(dictionary)
    }

    /// 규칙표 1회 적용
    fn pass(&self, text: &str) -> String {
        let text = self.structural.apply(text);
        let text = self.camel.apply(&text);
        let text = self.dictionary.apply(&text);
        let text = self.finishing.apply(&text);
        text.trim().to_string()
    }

    /// 정규화 (고정점까지 반복)
    pub fn normalize(&self, text: &str) -> String {
        let mut current = self.pass(text);
        let mut passes = 1;

        loop {
            let next = self.pass(&current);
            if next == current {
                break;
            }
            current = next;
            passes += 1;
        }

        if passes > 2 {
            tracing::debug!("Normalizer settled after {} passes", passes);
        }
        current
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> TextNormalizer {
        TextNormalizer::new().unwrap()
    }

    #[test]
    fn test_name_and_broken_label() {
        let out = normalizer().normalize("이 름 : 김철수 (90.01.01)");
        assert!(out.contains("이름"));
        assert!(out.contains("김철수 (90.01.01)"));
    }

    #[test]
    fn test_name_date_spacing_normalized() {
        let n = normalizer();
        assert_eq!(n.normalize("김철수(90.01.01)"), "김철수 (90.01.01)");
        assert_eq!(n.normalize("김철수   (90.01.01)"), "김철수 (90.01.01)");
    }

    #[test]
    fn test_hangul_spacing_joined() {
        assert_eq!(normalizer().normalize("안 녕 하 세 요"), "안녕하세요");
    }

    #[test]
    fn test_page_numbers_stripped() {
        let out = normalizer().normalize("경력 사항 3 페이지 Java 12 PAGE");
        assert!(!out.contains("페이지"));
        assert!(!out.to_lowercase().contains("page"));
        assert!(out.contains("Java"));
    }

    #[test]
    fn test_dictionary_terms() {
        let n = normalizer();
        assert_eq!(n.normalize("Java Script 개발"), "JavaScript 개발");
        assert_eq!(n.normalize("Node. js"), "Node.js");
        assert_eq!(n.normalize("SpringBoot"), "Spring Boot");
        assert_eq!(n.normalize("APIz} 60015"), "API 60015");
        assert_eq!(n.normalize("5000 원"), "5000원");
    }

    #[test]
    fn test_whitespace_collapsed_and_trimmed() {
        assert_eq!(normalizer().normalize("  a \n\t b  "), "a b");
        assert_eq!(normalizer().normalize(""), "");
    }

    #[test]
    fn test_idempotent() {
        let n = normalizer();
        let corpus = [
            "",
            "   ",
            "이 름 : 김철수 (90.01.01)",
            "생 년 월 일 : 90.01.01 연 락 처 010-1234-5678",
            "3 5 페이지 페이지 본문",
            "1 페 이지 나머지",
            "가 ※ 나 • 다",
            "Java Script, Type Script, React JS, Node. js 경험 보유",
            "Spring  Boot 기반 API 서버 개발 APIz } 42",
            "낙짜 전부 확인 2023년 10 원",
            "박 지성(82.02.25) 이 영표(77.04.23)",
            "Hello world. This is a test! Does it work?",
            "Mixed 한글 English 텍스트 123 Page",
            "((90.01.01)) (김철수)",
        ];

        for text in corpus {
            let once = n.normalize(text);
            let twice = n.normalize(&once);
            assert_eq!(once, twice, "not idempotent for input {:?}", text);
        }
    }

    #[test]
    fn test_repeated_misread_settles_in_one_call() {
        let n = normalizer();
        let input = format!("Python{}", "Script".repeat(10));
        let once = n.normalize(&input);
        assert_eq!(once, "Python");
        assert_eq!(n.normalize(&once), once);
    }

    #[test]
    fn test_camel_case_split() {
        let n = normalizer();
        assert_eq!(n.normalize("개발 userService 구현"), "개발 user Service 구현");
        assert_eq!(n.normalize("springBootApplication"), "spring Boot Application");
        assert_eq!(n.normalize("ReactJS 경험"), "React.js 경험");
    }

    #[test]
    fn test_protected_terms_kept() {
        let n = normalizer();
        for term in ["JavaScript", "TypeScript", "GitHub", "PostgreSQL", "iOS", "FastAPI"] {
            assert_eq!(n.normalize(term), term);
        }
        assert_eq!(
            n.normalize("JavaScript, MySQL, GitHub Actions"),
            "JavaScript, MySQL, GitHub Actions"
        );
    }

    #[test]
    fn test_pay_is_not_a_page_marker() {
        let out = normalizer().normalize("월 300 페이");
        assert!(out.contains("300"), "got {:?}", out);
        assert!(out.contains("페이"), "got {:?}", out);
        assert!(!normalizer().normalize("본문 12 페이지").contains("12"));
    }

    #[test]
    fn test_rules_from_json() {
        let json = r#"[{"name":"kotlin","pattern":"Kot\\s+lin","replacement":"Kotlin"}]"#;
        let table = RuleTable::from_json(json).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.apply("Kot lin"), "Kotlin");

        let n = TextNormalizer::with_dictionary(table).unwrap();
        assert_eq!(n.normalize("Kot  lin"), "Kotlin");
    }

    #[test]
    fn test_invalid_rule_rejected() {
        let json = r#"[{"name":"bad","pattern":"(","replacement":""}]"#;
        let err = RuleTable::from_json(json).unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_rules_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(
            &path,
            r#"[{"name":"docker","pattern":"Dock\\s+er","replacement":"Docker"}]"#,
        )
        .unwrap();

        let n = TextNormalizer::from_rules_file(Some(&path)).unwrap();
        assert_eq!(n.normalize("Dock er 와 Java Script"), "Docker 와 JavaScript");
    }

    mod properties {
        use super::*;
        use once_cell::sync::Lazy;
        use proptest::prelude::*;

        static NORMALIZER: Lazy<TextNormalizer> = Lazy::new(|| TextNormalizer::new().unwrap());

        fn fragment() -> impl Strategy<Value = String> {
            prop_oneof![
                "[가-힣]{1,4}",
                "[A-Za-z]{1,8}",
                "[0-9]{1,4}",
                "[ \t\n]{1,3}",
                "\\([0-9]{2}\\.[0-9]{2}\\.[0-9]{2}\\)",
                "[.!?,:()※•}]",
                Just("페이지".to_string()),
                Just("페이".to_string()),
                Just("Script".to_string()),
                Just("Python".to_string()),
                Just("Java ".to_string()),
                Just("이 름".to_string()),
                Just("원".to_string()),
            ]
        }

        fn document() -> impl Strategy<Value = String> {
            proptest::collection::vec(fragment(), 0..24).prop_map(|parts| parts.concat())
        }

        proptest! {
            #[test]
            fn normalize_is_idempotent(text in document()) {
                let once = NORMALIZER.normalize(&text);
                let twice = NORMALIZER.normalize(&once);
                prop_assert_eq!(once, twice);
            }

            #[test]
            fn normalize_is_idempotent_on_any_text(text in "\\PC{0,64}") {
                let once = NORMALIZER.normalize(&text);
                prop_assert_eq!(NORMALIZER.normalize(&once), once);
            }
        }
    }
}
