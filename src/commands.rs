//! Implementations behind the `pstudio` subcommands.
//!
//! Each function prints human-readable output to stdout. Commands that
//! produce structured results accept a `json` flag and print pretty JSON
//! instead.

use std::path::Path;

use anyhow::{Context, Result};
use prompt_studio_core::models::{ExpectedOutput, OptimizationResult, StructureType, TemplateAnalysis};
use prompt_studio_core::template::analyze_template;

use crate::config::Config;
use crate::studio::Studio;
use crate::{db, migrate};

/// Create the database schema and the uploads directory.
pub async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    std::fs::create_dir_all(&config.uploads.dir).with_context(|| {
        format!(
            "failed to create uploads dir {}",
            config.uploads.dir.display()
        )
    })?;
    println!("Database initialized successfully.");
    println!("  Store:   {}", config.store.path.display());
    println!("  Uploads: {}", config.uploads.dir.display());
    Ok(())
}

pub async fn run_ingest(studio: &Studio, path: &Path) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");

    let doc = studio.ingest(filename, &bytes).await?;
    println!("Ingested {} ({})", doc.filename, doc.document_type);
    println!("  id:     {}", doc.id);
    println!("  chunks: {}", doc.chunk_count);
    Ok(())
}

pub async fn run_documents(studio: &Studio, json: bool) -> Result<()> {
    let docs = studio.list_documents().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&docs)?);
        return Ok(());
    }
    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    for doc in &docs {
        println!(
            "{}  {:<5} {:>5} chunks  {}  {}",
            doc.id,
            doc.document_type.as_str(),
            doc.chunk_count,
            doc.created_at.format("%Y-%m-%d %H:%M"),
            doc.filename
        );
    }
    println!("\n{} document(s)", docs.len());
    Ok(())
}

pub async fn run_get(studio: &Studio, id: &str) -> Result<()> {
    let doc = studio.get_document(id).await?;
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

pub async fn run_delete(studio: &Studio, id: &str) -> Result<()> {
    let removed = studio.delete_document(id).await?;
    println!("Deleted {} ({} chunks removed)", id, removed);
    Ok(())
}

pub async fn run_clear(studio: &Studio) -> Result<()> {
    let cleared = studio.clear_documents().await?;
    println!("Cleared {} document(s).", cleared);
    Ok(())
}

pub async fn run_search(
    studio: &Studio,
    query: &str,
    top_k: usize,
    documents: &[String],
    json: bool,
) -> Result<()> {
    let filter = (!documents.is_empty()).then_some(documents);
    let results = studio.search(query, top_k, filter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, r) in results.iter().enumerate() {
        println!("{}. [{:.3}] {}", i + 1, r.score, r.chunk_id);
        println!("   {}", snippet(&r.content, 160));
    }
    Ok(())
}

/// Build an expected output from a template file and CLI flags.
pub fn expected_output(
    template_file: &Path,
    description: Option<String>,
    instructions: Option<String>,
    format: Option<&str>,
) -> Result<ExpectedOutput> {
    let template = std::fs::read_to_string(template_file)
        .with_context(|| format!("failed to read template {}", template_file.display()))?;
    let output_format = match format {
        Some(f) => f.parse::<StructureType>()?,
        None => StructureType::Text,
    };
    let expected = ExpectedOutput {
        template,
        description,
        output_instructions: instructions,
        examples: Vec::new(),
        output_format,
    };
    expected.validate()?;
    Ok(expected)
}

pub fn run_analyze(expected: &ExpectedOutput, json: bool) -> Result<()> {
    let analysis = analyze_template(expected);
    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        print_analysis(&analysis);
    }
    Ok(())
}

fn print_analysis(analysis: &TemplateAnalysis) {
    println!("Structure: {}", analysis.structure_type);
    println!("Placeholders: {}", analysis.placeholders.len());
    for p in &analysis.placeholders {
        println!("  {{{}}}  ({})", p.name, p.detected_type);
    }
    if !analysis.information_requirements.is_empty() {
        println!("Requirements:");
        for req in &analysis.information_requirements {
            println!("  - {}", req);
        }
    }
    if !analysis.suggested_queries.is_empty() {
        println!("Suggested queries:");
        for q in &analysis.suggested_queries {
            println!("  - {}", q);
        }
    }
}

pub async fn run_optimize(
    studio: &Studio,
    expected: &ExpectedOutput,
    documents: &[String],
    json: bool,
) -> Result<()> {
    let filter = (!documents.is_empty()).then_some(documents);
    let result = studio.optimize(expected, filter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_optimization(&result);
    }
    Ok(())
}

fn print_optimization(result: &OptimizationResult) {
    println!("{}", result.message);
    println!("Status: {}", result.status.as_str());
    println!();
    for it in &result.iterations {
        let marker = if it.iteration == result.best_iteration {
            "*"
        } else {
            " "
        };
        println!(
            "{} #{:<2} score {:.2}  contexts {:<2}  query: {}",
            marker,
            it.iteration,
            it.evaluation.match_score,
            it.retrieved_contexts.len(),
            snippet(&it.query, 80)
        );
    }
    println!();
    println!("Final prompt (iteration {}):", result.best_iteration);
    println!("{}", result.final_prompt.render_transcript());
}

pub async fn run_stats(studio: &Studio, json: bool) -> Result<()> {
    let stats = studio.stats().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("Prompt Studio Stats");
    println!("===================");
    println!();
    println!("  Store:      {}", studio.config().store.path.display());
    println!("  Documents:  {}", stats.documents);
    println!("  Indexed:    {} document(s)", stats.total_documents);
    println!("  Chunks:     {}", stats.total_chunks);
    println!("  Dimension:  {}", stats.dimension);
    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut)
}
