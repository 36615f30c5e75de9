use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Input, Password};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::{IndexManifest, VectorIndex};
use crate::embeddings::{Embedder, OllamaClient};
use crate::indexer::{Indexer, IndexingStats};
use crate::llm::{ChatModel, OllamaChatClient};
use crate::pipeline::{Answer, RagPipeline};
use crate::session::{Role, Session};

/// Ollama-backed providers for one command
struct Providers {
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
}

impl Providers {
    fn from_config(config: &Config) -> Result<Self> {
        let embedder =
            OllamaClient::new(&config.ollama).context("Failed to create embedding client")?;
        let chat = OllamaChatClient::new(&config.ollama).context("Failed to create chat client")?;
        Ok(Self {
            embedder: Arc::new(embedder),
            chat: Arc::new(chat),
        })
    }
}

/// Build (or rebuild) the index from the configured source directory
#[inline]
pub async fn index(config: &Config, rebuild: bool) -> Result<()> {
    if !rebuild && let Some(existing) = VectorIndex::open(config).await? {
        let manifest = existing.manifest();
        eprintln!(
            "Index already exists ({} chunks, built {}).",
            manifest.chunk_count,
            manifest.created_at.format("%Y-%m-%d %H:%M")
        );
        eprintln!("Use 'company-brain index --rebuild' to re-index the documents.");
        return Ok(());
    }

    let providers = Providers::from_config(config)?;
    let (_, stats) = build_index(config, Arc::clone(&providers.embedder)).await?;
    print_indexing_stats(&stats);
    Ok(())
}

/// Load, chunk and embed the corpus, showing progress on an attended terminal
#[inline]
pub async fn build_index(
    config: &Config,
    embedder: Arc<dyn Embedder>,
) -> Result<(VectorIndex, IndexingStats)> {
    eprintln!(
        "Indexing documents from {}",
        style(config.source_path().display()).cyan()
    );

    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding chunks {wide_bar}")
                .context("Invalid progress template")?,
        )
    } else {
        ProgressBar::hidden()
    };

    let progress_bar = bar.clone();
    let indexer = Indexer::from_config(config, embedder).with_progress(Arc::new(
        move |done: usize, total: usize| {
            progress_bar.set_length(total as u64);
            progress_bar.set_position(done as u64);
        },
    ));

    let result = indexer.build_from_source(config).await;
    bar.finish_and_clear();

    let (index, stats) = result.context("Indexing failed")?;
    info!(
        "Indexed {} chunks into {}",
        index.len(),
        index.path().display()
    );
    Ok((index, stats))
}

fn print_indexing_stats(stats: &IndexingStats) {
    eprintln!("{}", style("✓ Indexing complete").green());
    eprintln!("  Documents loaded: {}", stats.documents_loaded);
    eprintln!("  Chunks indexed: {}", stats.chunks_created);
    if stats.files_skipped > 0 {
        eprintln!("  Unsupported files skipped: {}", stats.files_skipped);
    }
    if !stats.failures.is_empty() {
        eprintln!(
            "  {}",
            style(format!("Files that could not be read: {}", stats.failures.len())).yellow()
        );
        for failure in &stats.failures {
            eprintln!("    {}: {}", failure.path.display(), failure.reason);
        }
    }
}

/// Open the existing index, building it first when there is none yet
#[inline]
pub async fn open_or_build(config: &Config, embedder: Arc<dyn Embedder>) -> Result<VectorIndex> {
    if let Some(index) = VectorIndex::open(config).await? {
        return Ok(index);
    }

    info!("No index found, building one from {}", config.source_path().display());
    let (index, stats) = build_index(config, embedder).await?;
    print_indexing_stats(&stats);
    Ok(index)
}

fn build_pipeline(config: &Config, providers: &Providers, index: VectorIndex) -> RagPipeline {
    RagPipeline::from_config(
        config,
        Arc::clone(&providers.embedder),
        Arc::clone(&providers.chat),
        Arc::new(index),
    )
}

/// Answer a single question and print the result
#[inline]
pub async fn ask(config: &Config, question: &str, show_sources: bool) -> Result<()> {
    let providers = Providers::from_config(config)?;
    let index = open_or_build(config, Arc::clone(&providers.embedder)).await?;
    let pipeline = build_pipeline(config, &providers, index);

    match pipeline.answer(question).await {
        Ok(answer) => {
            print_answer(&answer, show_sources);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", style(format!("❌ {}", e.user_message())).red());
            Err(e.into())
        }
    }
}

fn print_answer(answer: &Answer, show_sources: bool) {
    let label = if answer.rewrite_fell_back {
        "Refined Query (rewrite failed, using question)"
    } else {
        "Refined Query"
    };
    eprintln!("{}: {}", style(label).dim(), style(&answer.search_query).dim());
    if answer.expansion_failed {
        eprintln!(
            "{}",
            style("Could not generate alternative queries, searched the question only").yellow()
        );
    }

    println!("{}", answer.text);

    if show_sources && !answer.context.is_empty() {
        println!();
        println!("{}", style("Sources:").bold());
        for location in answer.context.iter().map(|c| c.location()).unique() {
            println!("  • {}", location);
        }
    }
}

/// Interactive chat loop with password gate, transcript and re-indexing
#[inline]
pub async fn chat(config: &Config) -> Result<()> {
    let providers = Providers::from_config(config)?;

    let mut session = Session::new(config.chat.password.clone());
    while !session.is_authenticated() {
        eprintln!("{}", style("🔒 Company Private Data Assistant").bold().cyan());
        let attempt = Password::new().with_prompt("Password").interact()?;
        let (next, accepted) = session.authenticate(&attempt);
        session = next;
        if !accepted {
            eprintln!("{}", style("❌ Incorrect password. Please try again.").red());
        }
    }

    let index = open_or_build(config, Arc::clone(&providers.embedder)).await?;
    let mut pipeline = build_pipeline(config, &providers, index);

    eprintln!("{}", style("🤖 Company Private Data Assistant").bold().cyan());
    eprintln!("Ask questions about company policies, FAQs, or guidelines.");
    eprintln!(
        "{}",
        style("Commands: /rebuild to re-index, /history to show the conversation, /quit to exit")
            .dim()
    );

    loop {
        let line: String = Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()?;
        let line = line.trim();

        match line {
            "" => {}
            "/quit" | "/exit" => break,
            "/history" => print_transcript(&session),
            "/rebuild" => {
                eprintln!("{}", style("🔄 Re-indexing knowledge base...").yellow());
                match build_index(config, Arc::clone(&providers.embedder)).await {
                    Ok((index, stats)) => {
                        print_indexing_stats(&stats);
                        pipeline = build_pipeline(config, &providers, index);
                    }
                    Err(e) => {
                        warn!("Rebuild failed: {:#}", e);
                        eprintln!(
                            "{}",
                            style(format!("❌ Re-indexing failed, keeping the current index: {:#}", e))
                                .red()
                        );
                    }
                }
            }
            question => {
                eprintln!("{}", style("🔍 Thinking and searching internal documents...").dim());
                let (next, result) = session.ask(&pipeline, question).await;
                session = next;
                match result {
                    Ok(answer) => println!("{}\n", answer.text),
                    Err(e) => {
                        warn!("Question failed: {}", e);
                        eprintln!("{}\n", style(format!("❌ {}", e.user_message())).red());
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_transcript(session: &Session) {
    if session.transcript().is_empty() {
        eprintln!("No messages yet.");
        return;
    }

    for turn in session.transcript() {
        let speaker = match turn.role {
            Role::User => style("You").bold().green(),
            Role::Assistant => style("Assistant").bold().cyan(),
        };
        println!("{}: {}", speaker, turn.text);
    }
    println!();
}

/// Show configuration, provider reachability and index state
#[inline]
pub async fn status(config: &Config) -> Result<()> {
    println!("{}", style("📊 Company Brain Status").bold().cyan());
    println!();

    println!("{}", style("Ollama:").bold().yellow());
    match config.ollama_url() {
        Ok(url) => println!("   URL: {}", url),
        Err(e) => println!("   URL: invalid ({})", e),
    }
    println!("   Embedding model: {}", config.ollama.embedding_model);
    println!("   Chat model: {}", config.ollama.chat_model);

    let client = OllamaClient::new(&config.ollama)?;
    let models = [
        config.ollama.embedding_model.as_str(),
        config.ollama.chat_model.as_str(),
    ];
    match client.health_check(&models) {
        Ok(()) => println!("   {}", style("✅ Reachable, models available").green()),
        Err(e) => println!("   {}", style(format!("❌ {:#}", e)).red()),
    }

    println!();
    println!("{}", style("Knowledge base:").bold().yellow());
    println!("   Source directory: {}", config.source_path().display());
    if !config.source_path().is_dir() {
        println!("   {}", style("⚠️  Source directory does not exist").yellow());
    }
    let index_path = config.index_path();
    println!("   Index directory: {}", index_path.display());

    match IndexManifest::read(&index_path) {
        Ok(Some(manifest)) => {
            println!("   Chunks indexed: {}", manifest.chunk_count);
            println!("   Vector dimension: {}", manifest.dimension);
            println!("   Built with: {}", manifest.embedding_model);
            println!(
                "   Built at: {}",
                manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if manifest.embedding_model != config.ollama.embedding_model {
                println!(
                    "   {}",
                    style("⚠️  Index was built with a different embedding model, rebuild it")
                        .yellow()
                );
            }
        }
        Ok(None) => println!("   Not built yet, run 'company-brain index'"),
        Err(e) => println!("   {}", style(format!("❌ {}", e)).red()),
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'company-brain index --rebuild' after changing the documents");
    println!("   • Use 'company-brain ask \"<question>\"' for a single question");
    println!("   • Use 'company-brain chat' to start a conversation");

    Ok(())
}
