use std::{
    io::{self, Write},
    path::Path,
    process,
    sync::Arc,
};

use clap::CommandFactory;
use quire::{
    application::{
        analysis::ComplexityAnalyzer,
        error::AppError,
        render::{RenderPipeline, RenderPipelineConfig},
    },
    cache::{CacheConfig, MarkupCache},
    config::{self, AnalyzeArgs, ChunkArgs, CliArgs, RenderArgs, Settings},
    domain::DomainError,
    infra::{
        memory::{MemoryPressureMonitor, SystemMemorySampler},
        render_sink::HtmlRenderSink,
        telemetry,
    },
    util::bytes::ByteSize,
};
use serde_json::json;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let messages = error.messages();
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?messages, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?messages, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let Some(command) = cli_args.command else {
        CliArgs::command().print_help()?;
        return Ok(());
    };

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Render(args) => run_render(settings, args).await,
        config::Command::Chunk(args) => run_chunk(settings, args).await,
        config::Command::Analyze(args) => run_analyze(settings, args).await,
    }
}

async fn read_document(path: &Path) -> Result<String, AppError> {
    let text = tokio::fs::read_to_string(path).await?;
    info!(
        path = %path.display(),
        size = %ByteSize(text.len() as u64),
        "Loaded document"
    );
    Ok(text)
}

async fn run_render(settings: Settings, args: RenderArgs) -> Result<(), AppError> {
    let text = read_document(&args.file).await?;
    let output = args.output_path();

    let monitor = Arc::new(MemoryPressureMonitor::new(settings.memory.thresholds));
    let sampling = match SystemMemorySampler::new() {
        Ok(sampler) => Some(monitor.spawn_sampling(sampler, settings.memory.sampling_interval)),
        Err(err) => {
            warn!(error = %err, "Memory sampling unavailable, rendering without pressure checks");
            None
        }
    };

    let sink = Arc::new(HtmlRenderSink::new());
    let cache = Arc::new(MarkupCache::new(CacheConfig::from(&settings.cache)));
    let pipeline = RenderPipeline::new(
        sink.clone(),
        cache,
        monitor.subscribe(),
        RenderPipelineConfig::from(&settings),
    );

    let mut stderr = io::stderr();
    let result = pipeline
        .render(&text, |progress, label| {
            let _ = writeln!(stderr, "[{:>5.1}%] {label}", progress * 100.0);
        })
        .await;

    if let Some(handle) = sampling {
        handle.abort();
    }

    let report = result?;
    tokio::fs::write(&output, sink.snapshot()).await?;

    let strategy = report
        .strategy
        .map(|strategy| strategy.to_string())
        .unwrap_or_else(|| "cached".to_string());
    println!(
        "{} -> {} ({strategy}, {} chunks{})",
        args.file.display(),
        output.display(),
        report.chunks_delivered,
        if report.used_fallback {
            ", whole-document fallback"
        } else {
            ""
        },
    );
    Ok(())
}

async fn run_chunk(settings: Settings, args: ChunkArgs) -> Result<(), AppError> {
    let text = read_document(&args.file).await?;
    let size = args
        .size
        .unwrap_or(settings.render.thresholds.standard_chunk_size);
    if size == 0 {
        return Err(DomainError::validation("chunk size must be greater than zero").into());
    }

    let chunker = args.chunker;
    let chunks = tokio::task::spawn_blocking(move || chunker.chunk(&text, size))
        .await
        .map_err(|err| AppError::unexpected(format!("chunking task failed: {err}")))?;

    let mut stdout = io::stdout().lock();
    for chunk in &chunks {
        let first_line = chunk.content.lines().next().unwrap_or_default();
        if args.json {
            let line = json!({
                "index": chunk.index,
                "chars": chunk.chars,
                "start": chunk.span.start,
                "end": chunk.span.end,
                "synthetic_fence": chunk.synthetic_fence,
                "first_line": first_line,
            });
            writeln!(stdout, "{line}")?;
        } else {
            writeln!(
                stdout,
                "{:>5} {:>9} {:>10}..{:<10} {}{}",
                chunk.index,
                chunk.chars,
                chunk.span.start,
                chunk.span.end,
                first_line,
                if chunk.synthetic_fence { " [fence closed]" } else { "" },
            )?;
        }
    }
    info!(chunker = chunker.as_str(), size, chunks = chunks.len(), "Chunked document");
    Ok(())
}

async fn run_analyze(settings: Settings, args: AnalyzeArgs) -> Result<(), AppError> {
    let text = read_document(&args.file).await?;
    let analyzer = ComplexityAnalyzer::new(settings.complexity);
    let report = analyzer
        .analyze_blocking(Arc::from(text))
        .await
        .map_err(|err| AppError::unexpected(format!("analysis task failed: {err}")))?;
    let multiplier = report.level.chunk_multiplier();
    let pacing_ms = report.level.pacing_delay().as_millis();

    let mut stdout = io::stdout().lock();
    if args.json {
        let value = json!({
            "metrics": report.metrics,
            "score": report.score,
            "level": report.level,
            "chunk_multiplier": multiplier,
            "pacing_ms": pacing_ms,
        });
        writeln!(stdout, "{value}")?;
        return Ok(());
    }

    let m = &report.metrics;
    writeln!(stdout, "lines        {}", m.lines)?;
    writeln!(stdout, "characters   {}", m.characters)?;
    writeln!(stdout, "headings     {}", m.headings)?;
    writeln!(stdout, "list items   {}", m.list_items)?;
    writeln!(stdout, "code blocks  {}", m.code_blocks)?;
    writeln!(stdout, "table rows   {}", m.table_rows)?;
    writeln!(stdout, "formulas     {}", m.formulas)?;
    writeln!(stdout, "images       {}", m.images)?;
    writeln!(stdout, "links        {}", m.links)?;
    writeln!(stdout, "score        {:.2}", report.score)?;
    writeln!(stdout, "level        {}", report.level)?;
    writeln!(stdout, "multiplier   {multiplier}")?;
    writeln!(stdout, "pacing       {pacing_ms} ms")?;
    Ok(())
}
