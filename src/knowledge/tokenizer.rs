//! 토큰 카운터
//!
//! 청크 토큰 예산과 같은 기준으로 길이를 셉니다.
//! 기본값은 GPT-4 계열과 같은 `cl100k_base` BPE 입니다.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tiktoken_rs::CoreBPE;
use tokenizers::Tokenizer;

/// 텍스트 → 토큰 수
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    fn name(&self) -> &str;
}

/// `cl100k_base` BPE 카운터 (기본값)
pub struct BpeTokenCounter {
    bpe: CoreBPE,
}

impl BpeTokenCounter {
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().context("Failed to load cl100k_base encoding")?;
        Ok(Self { bpe })
    }
}

impl TokenCounter for BpeTokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn name(&self) -> &str {
        "cl100k_base"
    }
}

/// 공백 단위 카운터
///
/// 한글 음절 사이 공백이 정규화로 사라지므로 실제 문서에는 맞지 않습니다. 테스트용.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenCounter;

impl TokenCounter for WhitespaceTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn name(&self) -> &str {
        "whitespace"
    }
}

/// HuggingFace `tokenizer.json` 기반 카운터
pub struct HfTokenCounter {
    tokenizer: Tokenizer,
}

impl HfTokenCounter {
    pub fn from_file(path: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow!("Failed to load tokenizer {}: {}", path.display(), e))?;
        Ok(Self { tokenizer })
    }
}

impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                tracing::warn!("Tokenizer failed, counting words instead: {}", e);
                WhitespaceTokenCounter.count(text)
            }
        }
    }

    fn name(&self) -> &str {
        "huggingface"
    }
}

/// 설정 경로에 따라 카운터 생성
pub fn load_token_counter(path: Option<&Path>) -> Result<Arc<dyn TokenCounter>> {
    match path {
        Some(path) => {
            let counter = HfTokenCounter::from_file(path)?;
            tracing::info!("Using tokenizer from {}", path.display());
            Ok(Arc::new(counter))
        }
        None => Ok(Arc::new(BpeTokenCounter::cl100k()?)),
    }
}
