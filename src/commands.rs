use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use console::style;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::{Itertools, iproduct};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::MatchError;
use crate::config::Config;
use crate::conversion::{
    BatchConversion, Conversion, ConversionOutcome, EmbeddingConverter, RecordFailure,
};
use crate::documents::DocumentType;
use crate::embeddings::OllamaClient;
use crate::scoring::{ComponentScores, Scorer, SimilarityReport};
use crate::store::VectorStore;

const MAX_CONCURRENT_CONVERSIONS: usize = 4;
const SCORE_BAR_WIDTH: usize = 20;

/// One scored JD/resume pair as written to the reports directory
#[derive(Debug, Serialize)]
pub struct PairReport {
    pub jd: String,
    pub resume: String,
    #[serde(flatten)]
    pub report: SimilarityReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedMatch {
    pub jd: String,
    pub resume: String,
    pub final_score: f64,
    pub component_scores: ComponentScores,
    pub advisories: usize,
    /// Per-pair report written for this match
    pub report: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedPair {
    pub jd: String,
    pub resume: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedRecord {
    pub path: PathBuf,
    pub error: String,
}

/// Contents of `summary.json` for a match run
#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub generated_at: DateTime<Utc>,
    pub embedding_model: String,
    pub matches: Vec<RankedMatch>,
    pub failed_pairs: Vec<FailedPair>,
    pub failed_records: Vec<FailedRecord>,
}

fn build_converter(config: &Config) -> Result<Arc<EmbeddingConverter>> {
    let client =
        OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?;
    let store =
        VectorStore::open(config.vector_store_path()).context("Failed to open vector store")?;
    Ok(Arc::new(EmbeddingConverter::new(Arc::new(client), store)))
}

fn progress_bar(len: usize, message: &'static str) -> ProgressBar {
    let bar = if console::user_attended_stderr() {
        ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}").map_or_else(
            |_| ProgressBar::new_spinner(),
            |template| ProgressBar::new_spinner().with_style(template),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_length(len as u64);
    bar.set_message(message);
    bar
}

/// Convert record files concurrently, one blocking task per record.
///
/// Each input carries the document type to assume when the record omits one.
#[inline]
pub async fn convert_batch(
    converter: Arc<EmbeddingConverter>,
    inputs: Vec<(PathBuf, Option<DocumentType>)>,
) -> BatchConversion {
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_CONVERSIONS));
    let bar = progress_bar(inputs.len(), "Converting records");

    let tasks = inputs.into_iter().map(|(path, fallback_type)| {
        let converter = Arc::clone(&converter);
        let semaphore = Arc::clone(&semaphore);
        let bar = bar.clone();
        async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => {
                    let task_path = path.clone();
                    tokio::task::spawn_blocking(move || {
                        converter.convert_file(&task_path, fallback_type)
                    })
                    .await
                    .unwrap_or_else(|e| {
                        Err(MatchError::Other(anyhow::anyhow!(
                            "Conversion task failed: {e}"
                        )))
                    })
                }
                Err(e) => Err(MatchError::Other(anyhow::anyhow!(
                    "Conversion scheduler closed: {e}"
                ))),
            };
            bar.inc(1);
            (path, result)
        }
    });

    let mut batch = BatchConversion::default();
    for (path, result) in join_all(tasks).await {
        match result {
            Ok(conversion) => batch.converted.push(conversion),
            Err(error) => {
                warn!("Skipping record {}: {}", path.display(), error);
                batch.failed.push(RecordFailure { path, error });
            }
        }
    }
    bar.finish_and_clear();

    info!(
        "Converted {} records ({} failed)",
        batch.converted.len(),
        batch.failed.len()
    );
    batch
}

/// Convert record files into the vector store
#[inline]
pub async fn convert_records(config: &Config, files: Vec<PathBuf>) -> Result<()> {
    let converter = build_converter(config)?;
    let inputs = files
        .into_iter()
        .map(|path| {
            let fallback_type = DocumentType::infer_from_path(&path);
            (path, fallback_type)
        })
        .collect();

    let batch = convert_batch(converter, inputs).await;

    for conversion in &batch.converted {
        print_conversion(conversion);
    }
    for failure in &batch.failed {
        println!(
            "{} {}: {}",
            style("✗").red(),
            failure.path.display(),
            failure.error
        );
    }

    println!();
    println!(
        "Converted {} records, {} failed",
        batch.converted.len(),
        batch.failed.len()
    );

    if batch.failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "{} of {} records could not be converted",
            batch.failed.len(),
            batch.failed.len() + batch.converted.len()
        ))
    }
}

fn print_conversion(conversion: &Conversion) {
    let outcome = match conversion.outcome {
        ConversionOutcome::Generated => style("generated").green(),
        ConversionOutcome::Reused => style("reused").cyan(),
    };
    println!(
        "{} {} [{}] → {}",
        style("✓").green(),
        conversion.name,
        outcome,
        style(conversion.path.display()).dim()
    );
    for failure in &conversion.failed_fields {
        println!(
            "   {} {} not embedded: {}",
            style("⚠").yellow(),
            failure.field,
            failure.reason
        );
    }
}

/// Score two stored vector documents, JD first
#[inline]
pub fn score_documents(
    config: &Config,
    jd_path: &Path,
    resume_path: &Path,
    json: bool,
) -> Result<()> {
    let jd = VectorStore::read_document(jd_path)
        .with_context(|| format!("Failed to load JD vectors from {}", jd_path.display()))?;
    let resume = VectorStore::read_document(resume_path).with_context(|| {
        format!(
            "Failed to load resume vectors from {}",
            resume_path.display()
        )
    })?;

    let report = Scorer::with_policy(config.scoring)
        .context("Invalid scoring policy")?
        .score(&jd, &resume)
        .with_context(|| {
            format!(
                "Failed to score {} against {}",
                resume_path.display(),
                jd_path.display()
            )
        })?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        println!("JD:     {}", jd_path.display());
        println!("Resume: {}", resume_path.display());
        println!();
        print_report(&report);
    }

    Ok(())
}

/// Qualitative band used only for display
#[inline]
pub fn score_band(score: f64) -> &'static str {
    if score >= 70.0 {
        "MEETS"
    } else if score >= 50.0 {
        "PARTIAL"
    } else {
        "BELOW"
    }
}

/// Fixed-width text bar for a score in `[0, 100]`
#[inline]
pub fn score_bar(score: f64) -> String {
    let filled = ((score.clamp(0.0, 100.0) / 100.0) * SCORE_BAR_WIDTH as f64).round() as usize;
    format!(
        "{}{}",
        "█".repeat(filled),
        "░".repeat(SCORE_BAR_WIDTH.saturating_sub(filled))
    )
}

fn print_report(report: &SimilarityReport) {
    let scores = &report.component_scores;
    let rows = [
        ("Summary", scores.summary),
        ("Skills", scores.skills),
        ("Responsibilities", scores.responsibilities),
        ("Certifications", scores.certifications),
        ("Experience", scores.experience),
    ];

    println!("{}", style("Component Scores").bold().cyan());
    for (name, score) in rows {
        let band = match score_band(score) {
            "MEETS" => style("MEETS").green(),
            "PARTIAL" => style("PARTIAL").yellow(),
            other => style(other).red(),
        };
        println!("  {name:<18} {score:>6.1}  {}  {band}", score_bar(score));
    }

    println!();
    println!(
        "{} {}",
        style("Final Score:").bold(),
        style(format!("{:.1}", report.final_score)).bold().cyan()
    );

    if !report.advisories.is_empty() {
        println!();
        println!("{}", style("Advisories").bold().yellow());
        for advisory in &report.advisories {
            println!("  {} {}", style("⚠").yellow(), advisory);
        }
    }
}

/// Convert and score every JD × resume pair, writing reports to `output_dir`
#[inline]
pub async fn run_matching(
    converter: Arc<EmbeddingConverter>,
    scorer: &Scorer,
    jd_files: Vec<PathBuf>,
    resume_files: Vec<PathBuf>,
    output_dir: &Path,
) -> Result<MatchSummary> {
    fs::create_dir_all(output_dir).with_context(|| {
        format!(
            "Failed to create report directory: {}",
            output_dir.display()
        )
    })?;

    let embedding_model = converter.model_id().to_string();
    let inputs = jd_files
        .into_iter()
        .map(|path| (path, Some(DocumentType::Jd)))
        .chain(
            resume_files
                .into_iter()
                .map(|path| (path, Some(DocumentType::Resume))),
        )
        .collect();
    let batch = convert_batch(converter, inputs).await;

    let (jds, resumes): (Vec<&Conversion>, Vec<&Conversion>) = batch
        .converted
        .iter()
        .partition(|conversion| conversion.document.document_type == DocumentType::Jd);

    let mut matches = Vec::new();
    let mut failed_pairs = Vec::new();

    for (jd, resume) in iproduct!(jds.iter(), resumes.iter()) {
        match scorer.score(&jd.document, &resume.document) {
            Ok(report) => {
                let report_path = write_pair_report(output_dir, jd, resume, &report)?;
                matches.push(RankedMatch {
                    jd: jd.name.clone(),
                    resume: resume.name.clone(),
                    final_score: report.final_score,
                    component_scores: report.component_scores,
                    advisories: report.advisories.len(),
                    report: report_path,
                });
            }
            Err(e) => {
                error!(
                    "Could not score {} against {}: {}",
                    resume.name, jd.name, e
                );
                failed_pairs.push(FailedPair {
                    jd: jd.name.clone(),
                    resume: resume.name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    let summary = MatchSummary {
        generated_at: Utc::now(),
        embedding_model,
        matches: rank_matches(matches),
        failed_pairs,
        failed_records: batch
            .failed
            .iter()
            .map(|failure| FailedRecord {
                path: failure.path.clone(),
                error: failure.error.to_string(),
            })
            .collect(),
    };

    let summary_path = output_dir.join("summary.json");
    let content =
        serde_json::to_string_pretty(&summary).context("Failed to serialize match summary")?;
    fs::write(&summary_path, content)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    info!(
        "Scored {} pairs ({} failed), summary at {}",
        summary.matches.len(),
        summary.failed_pairs.len(),
        summary_path.display()
    );
    Ok(summary)
}

/// Pair reports are named by store identity so same-named records never collide
fn write_pair_report(
    output_dir: &Path,
    jd: &Conversion,
    resume: &Conversion,
    report: &SimilarityReport,
) -> Result<PathBuf> {
    let path = output_dir.join(format!("{}__{}.json", jd.identity, resume.identity));
    let pair = PairReport {
        jd: jd.name.clone(),
        resume: resume.name.clone(),
        report: report.clone(),
    };
    let content = serde_json::to_string_pretty(&pair).context("Failed to serialize report")?;
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Highest final score first; ties keep JD then resume order
#[inline]
pub fn rank_matches(matches: Vec<RankedMatch>) -> Vec<RankedMatch> {
    matches
        .into_iter()
        .sorted_by(|a, b| {
            b.final_score
                .total_cmp(&a.final_score)
                .then_with(|| a.jd.cmp(&b.jd))
                .then_with(|| a.resume.cmp(&b.resume))
        })
        .collect()
}

/// `match` command: convert inputs, score all pairs and print the ranking
#[inline]
pub async fn match_documents(
    config: &Config,
    jd_files: Vec<PathBuf>,
    resume_files: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let converter = build_converter(config)?;
    let scorer = Scorer::with_policy(config.scoring).context("Invalid scoring policy")?;
    let output_dir = output_dir.unwrap_or_else(|| config.reports_path());

    let summary = run_matching(converter, &scorer, jd_files, resume_files, &output_dir).await?;

    println!("{}", style("🏁 Match Results").bold().cyan());
    println!();
    if summary.matches.is_empty() {
        println!("No pairs were scored.");
    }
    for ranked in &summary.matches {
        let advisories = if ranked.advisories > 0 {
            style(format!(" ({} advisories)", ranked.advisories))
                .yellow()
                .to_string()
        } else {
            String::new()
        };
        println!(
            "  {:>6.1}  {}  {} ↔ {}{}",
            ranked.final_score,
            score_bar(ranked.final_score),
            ranked.jd,
            ranked.resume,
            advisories
        );
    }

    for failure in &summary.failed_records {
        println!(
            "  {} {}: {}",
            style("✗").red(),
            failure.path.display(),
            failure.error
        );
    }
    for failure in &summary.failed_pairs {
        println!(
            "  {} {} ↔ {}: {}",
            style("✗").red(),
            failure.jd,
            failure.resume,
            failure.error
        );
    }

    println!();
    println!(
        "Reports written to {}",
        style(output_dir.display()).cyan()
    );
    Ok(())
}

/// Show Ollama health and an inventory of the vector store
#[inline]
pub fn show_status(config: &Config) -> Result<()> {
    println!("📊 Resume Match Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Model: {}", config.ollama.model);
                println!("   🔢 Batch Size: {}", config.ollama.batch_size);
            }
            Err(e) => println!("   ⚠️  Ollama: Unavailable - {:#}", e),
        },
        Err(e) => println!("   ❌ Ollama: Invalid configuration - {}", e),
    }

    println!();
    println!("🔍 Vector Store Status:");
    let store =
        VectorStore::open(config.vector_store_path()).context("Failed to open vector store")?;
    let artifacts = store.list().context("Failed to list vector store")?;
    println!("   📁 Location: {}", store.root().display());
    println!("   📄 Documents: {}", artifacts.len());

    let mut by_kind: BTreeMap<(String, &'static str), usize> = BTreeMap::new();
    let mut unreadable = 0_usize;
    let mut degraded = 0_usize;
    for path in &artifacts {
        match VectorStore::read_document(path) {
            Ok(document) => {
                if !document.is_complete() {
                    degraded += 1;
                }
                *by_kind
                    .entry((document.embedding_model, document.document_type.as_str()))
                    .or_default() += 1;
            }
            Err(e) => {
                warn!("{}", e);
                unreadable += 1;
            }
        }
    }

    for ((model, kind), count) in &by_kind {
        let marker = if *model == config.ollama.model {
            ""
        } else {
            " (different model)"
        };
        println!("   • {count} {kind} documents embedded with {model}{marker}");
    }
    if degraded > 0 {
        println!("   ⚠️  {degraded} documents have fields that failed to embed");
    }
    if unreadable > 0 {
        println!("   ❌ {unreadable} documents could not be read");
    }

    Ok(())
}
