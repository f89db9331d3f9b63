//! The `glimpse index` command: scan, register, then thumbnail and hash.

use clap::Args;
use glimpse_core::{Config, FolderScanner, ImageStore, IndexingService, JobOutcome};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

/// Arguments for the `index` command.
#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Folder (or single image) to index
    pub path: PathBuf,

    /// Number of indexing workers (overrides config)
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Queue priority for these images (lower runs first)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub priority: i32,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

pub async fn execute(args: IndexArgs, mut config: Config) -> anyhow::Result<()> {
    let root = super::expand(&args.path);
    if !root.exists() {
        anyhow::bail!(
            "Input path does not exist: {:?}\n\n  Hint: Check the path and try again.",
            root
        );
    }
    if let Some(parallel) = args.parallel {
        config.processing.parallel_workers = parallel.max(1);
    }

    let store = super::open_store(&config)?;
    let factory = super::build_factory(&config).await;

    let scanner = FolderScanner::new(&config.processing.supported_formats)
        .excluding(config.thumbnail_dir());
    let scan_store = store.clone();
    let scan_root = root.clone();
    let ids = tokio::task::spawn_blocking(move || {
        scanner.scan(scan_store.as_ref() as &dyn ImageStore, &scan_root)
    })
    .await??;

    if ids.is_empty() {
        println!("No supported images found under {}", root.display());
        return Ok(());
    }

    let mut service = IndexingService::start(store.clone(), factory, &config);
    let mut outcomes = service
        .subscribe()
        .ok_or_else(|| anyhow::anyhow!("indexing outcome stream already taken"))?;

    let progress = if args.no_progress {
        ProgressBar::hidden()
    } else {
        create_progress_bar(ids.len() as u64)
    };
    let reporter = {
        let progress = progress.clone();
        tokio::spawn(async move {
            let mut failures = Vec::new();
            while let Some(outcome) = outcomes.recv().await {
                if let JobOutcome::Failed { image, error } = &outcome {
                    failures.push((*image, error.clone()));
                }
                progress.set_message(format!("image {}", outcome.image()));
                progress.inc(1);
            }
            failures
        })
    };

    let submitted = ids
        .iter()
        .filter(|id| service.submit(**id, args.priority))
        .count();
    tracing::debug!("Submitted {} of {} images", submitted, ids.len());

    let stats = service.finish().await;
    let failures = reporter.await?;
    progress.finish_and_clear();

    println!(
        "Indexed {} images ({} failed) in {}",
        stats.indexed,
        stats.failed,
        root.display()
    );
    for (image, error) in failures.iter().take(20) {
        eprintln!("  image {image}: {error}");
    }
    if failures.len() > 20 {
        eprintln!("  ... and {} more", failures.len() - 20);
    }
    println!("Catalog now holds {} images", store.image_count()?);
    Ok(())
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}
