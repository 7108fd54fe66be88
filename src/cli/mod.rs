//! CLI 모듈
//!
//! pdfqa 명령어 정의 및 구현

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{has_api_key, openai_api_key, OcrPolicy, Settings};
use crate::extractor::{probe, DocumentExtractor, ProgressReporter, ProgressUpdate};
use crate::knowledge::{LanceVectorIndex, VectorIndex, EMBEDDING_DIMENSION};
use crate::qa::PdfQaSystem;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "pdfqa")]
#[command(version, about = "PDF 질의응답 시스템 (OCR 품질 파이프라인)", long_about = None)]
pub struct Cli {
    /// JSON 설정 파일
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// PDF 를 처리해 인덱스에 적재 (기존 인덱스 교체)
    Ingest {
        /// PDF 파일 경로
        pdf: PathBuf,

        /// OCR 끄고 텍스트 레이어만 사용
        #[arg(long)]
        no_ocr: bool,

        /// OCR 정책 (always, when-layer-insufficient[:N])
        #[arg(long)]
        policy: Option<OcrPolicy>,
    },

    /// 적재된 문서에 질문
    Ask {
        /// 질문
        question: String,

        /// 참고할 청크 수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// 텍스트만 추출 (인덱스 변경 없음)
    Extract {
        /// PDF 파일 경로
        pdf: PathBuf,

        /// 청크 단위로 출력
        #[arg(long)]
        chunks: bool,

        /// OCR 끄고 텍스트 레이어만 사용
        #[arg(long)]
        no_ocr: bool,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref()).context("설정 로드 실패")?;

    match cli.command {
        Commands::Ingest {
            pdf,
            no_ocr,
            policy,
        } => {
            apply_ocr_flags(&mut settings, no_ocr, policy);
            cmd_ingest(&settings, &pdf).await
        }
        Commands::Ask { question, top_k } => cmd_ask(&settings, &question, top_k).await,
        Commands::Extract {
            pdf,
            chunks,
            no_ocr,
        } => {
            apply_ocr_flags(&mut settings, no_ocr, None);
            cmd_extract(&settings, &pdf, chunks).await
        }
        Commands::Status => cmd_status(&settings).await,
    }
}

fn apply_ocr_flags(settings: &mut Settings, no_ocr: bool, policy: Option<OcrPolicy>) {
    if no_ocr {
        settings.use_ocr = false;
    }
    if let Some(policy) = policy {
        settings.ocr_policy = policy;
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 적재 명령어 (ingest)
async fn cmd_ingest(settings: &Settings, pdf: &Path) -> Result<()> {
    ensure_api_key()?;
    ensure_pdf(pdf)?;

    let system = PdfQaSystem::from_settings(settings)
        .await
        .context("PdfQaSystem 초기화 실패")?;

    print_capabilities(settings, &system.capabilities());
    println!("[*] PDF 처리 중: {}", pdf.display());

    let report = system
        .process_pdf(pdf, Some(progress_printer()))
        .await
        .context("PDF 처리 실패")?;

    println!();
    println!("[OK] {} 개 청크가 인덱싱되었습니다", report.chunks_processed);
    println!("     파일: {}", report.source);
    println!("     SHA-256: {}", report.fingerprint);

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(settings: &Settings, question: &str, top_k: Option<usize>) -> Result<()> {
    ensure_api_key()?;

    let system = PdfQaSystem::from_settings(settings)
        .await
        .context("PdfQaSystem 초기화 실패")?;

    println!("[*] 질문: \"{}\"", question);

    let answer = system
        .ask_with_top_k(question, top_k.unwrap_or(settings.top_k).max(1))
        .await
        .context("답변 생성 실패")?;

    println!();
    match answer.provider {
        Some(ref provider) => println!("[OK] 답변 ({}):\n", provider),
        None => println!("[!] 답변:\n"),
    }
    println!("{}", answer.answer.trim());

    if !answer.sources.is_empty() {
        println!("\n[*] 참고한 내용 ({} 건):", answer.sources.len());
        for (i, source) in answer.sources.iter().enumerate() {
            println!("  {}. [{}] {}", i + 1, source.chunk_id, truncate_text(&source.snippet, 120));
        }
    }

    Ok(())
}

/// 추출 명령어 (extract)
///
/// 임베딩/생성 API 없이 OCR 파이프라인만 실행합니다.
async fn cmd_extract(settings: &Settings, pdf: &Path, show_chunks: bool) -> Result<()> {
    ensure_pdf(pdf)?;

    let extractor = DocumentExtractor::from_settings(settings).context("추출기 초기화 실패")?;
    print_capabilities(settings, &extractor.capabilities());

    if show_chunks {
        let chunks = extractor
            .process_document(pdf, Some(progress_printer()))
            .await
            .context("PDF 처리 실패")?;

        println!("\n[OK] 청크 {} 개:\n", chunks.len());
        for chunk in &chunks {
            println!("--- {} ({} tokens) ---", chunk.id, chunk.token_count);
            println!("{}\n", chunk.text);
        }
    } else {
        let text = extractor
            .extract_text(pdf, Some(progress_printer()))
            .await
            .context("텍스트 추출 실패")?;

        println!("\n[OK] 추출된 텍스트 ({} 자):\n", text.chars().count());
        println!("{}", text);
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(settings: &Settings) -> Result<()> {
    println!("pdfqa v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let data_dir = settings.data_dir();
    println!("[*] 데이터 디렉토리: {}", data_dir.display());
    println!(
        "[*] OCR: {} (정책: {}, 백엔드: {})",
        if settings.use_ocr { "사용" } else { "끔" },
        settings.ocr_policy,
        settings.ocr_backend
    );

    let capabilities = probe(settings).capabilities;
    print_capabilities(settings, &capabilities);

    if has_api_key() {
        println!("[OK] Gemini API 키: 설정됨");
    } else {
        println!("[!] Gemini API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }
    if openai_api_key().is_some() {
        println!("[OK] OpenAI 대체 생성기: 사용 가능");
    }

    let index_path = data_dir.join("chunks.lance");
    match LanceVectorIndex::open_with_dimension(&index_path, EMBEDDING_DIMENSION).await {
        Ok(index) => match index.stats().await {
            Ok(stats) => {
                println!("[OK] 벡터 인덱스: {} 청크", stats.count);
                println!("     차원: {}", stats.dimension);
            }
            Err(e) => println!("[!] 인덱스 통계 조회 실패: {}", e),
        },
        Err(e) => {
            tracing::debug!("LanceDB 열기 실패: {}", e);
            println!("[!] 벡터 인덱스 없음");
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn ensure_api_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }
    Ok(())
}

fn ensure_pdf(path: &Path) -> Result<()> {
    if !path.is_file() {
        bail!("파일을 찾을 수 없습니다: {}", path.display());
    }
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        bail!("PDF 파일만 지원합니다: {}", path.display());
    }
    Ok(())
}

fn print_capabilities(settings: &Settings, capabilities: &crate::extractor::Capabilities) {
    if !settings.use_ocr {
        println!("[*] 텍스트 레이어만 사용합니다");
    } else if capabilities.ocr_ready() {
        println!("[OK] OCR 사용 가능");
    } else {
        println!(
            "[!] OCR 사용 불가 (인식 엔진: {}, 렌더러: {}), 텍스트 레이어로 대체합니다",
            yes_no(capabilities.recognition_available),
            yes_no(capabilities.imaging_available)
        );
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "있음"
    } else {
        "없음"
    }
}

fn progress_printer() -> Arc<dyn ProgressReporter> {
    Arc::new(|update: ProgressUpdate| eprintln!("{}", format_progress(&update)))
}

/// 진행 상황 한 줄
fn format_progress(update: &ProgressUpdate) -> String {
    if update.total_pages > 0 {
        format!(
            "    [{:>3}%] {} ({}/{})",
            update.percent, update.label, update.current_page, update.total_pages
        )
    } else {
        format!("    [{:>3}%] {}", update.percent, update.label)
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
