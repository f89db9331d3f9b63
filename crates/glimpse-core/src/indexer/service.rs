//! Fixed-size worker pool that turns queued image ids into thumbnails and
//! hashes.
//!
//! Workers pull from one [`UniqueWorkQueue`]. Each worker owns an image end
//! to end and only checks for cancellation between images.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;

use super::layout::ThumbnailLayout;
use crate::config::Config;
use crate::error::{GlimpseError, PipelineError, StoreError};
use crate::pipeline::{Hasher, Validator};
use crate::processor::{run_blocking, ProcessorFactory};
use crate::queue::UniqueWorkQueue;
use crate::store::ImageStore;
use crate::types::{ImageHashes, ImageId};

/// What happened to one submitted image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Indexed {
        image: ImageId,
        processor: &'static str,
        /// False when every thumbnail was already on disk
        thumbs_generated: bool,
    },
    Failed {
        image: ImageId,
        error: String,
    },
}

impl JobOutcome {
    pub fn image(&self) -> ImageId {
        match self {
            JobOutcome::Indexed { image, .. } | JobOutcome::Failed { image, .. } => *image,
        }
    }
}

/// Totals reported when the pool stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub indexed: usize,
    pub failed: usize,
    /// Still queued when the pool stopped (non-zero only after `cancel`)
    pub abandoned: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    /// Finish what is queued, accept nothing new
    Draining,
    Cancelled,
}

struct Worker {
    store: Arc<dyn ImageStore>,
    factory: Arc<ProcessorFactory>,
    queue: UniqueWorkQueue<ImageId, ImageId>,
    validator: Validator,
    layout: ThumbnailLayout,
    wake: Notify,
    outcomes: mpsc::UnboundedSender<JobOutcome>,
    indexed: AtomicUsize,
    failed: AtomicUsize,
}

pub struct IndexingService {
    shared: Arc<Worker>,
    state: watch::Sender<RunState>,
    handles: Vec<JoinHandle<()>>,
    outcomes: Option<mpsc::UnboundedReceiver<JobOutcome>>,
}

impl IndexingService {
    /// Spawn `processing.parallel_workers` workers on the current runtime.
    pub fn start(
        store: Arc<dyn ImageStore>,
        factory: Arc<ProcessorFactory>,
        config: &Config,
    ) -> Self {
        let layout = ThumbnailLayout::new(config.thumbnail_dir(), config.thumbnails.sizes.clone());
        Self::with_layout(store, factory, config, layout)
    }

    /// Like [`start`](Self::start) with an explicit thumbnail layout.
    pub fn with_layout(
        store: Arc<dyn ImageStore>,
        factory: Arc<ProcessorFactory>,
        config: &Config,
        layout: ThumbnailLayout,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(RunState::Running);
        let shared = Arc::new(Worker {
            store,
            factory,
            queue: UniqueWorkQueue::new(),
            validator: Validator::new(config.limits.clone()),
            layout,
            wake: Notify::new(),
            outcomes: tx,
            indexed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        });

        let workers = config.processing.parallel_workers.max(1);
        let handles = (0..workers)
            .map(|n| {
                let shared = shared.clone();
                let state = state.subscribe();
                tokio::spawn(async move { shared.run(n, state).await })
            })
            .collect();
        tracing::debug!("Started {} indexing workers", workers);

        Self {
            shared,
            state,
            handles,
            outcomes: Some(rx),
        }
    }

    /// Take the outcome stream. Only the first call returns it.
    pub fn subscribe(&mut self) -> Option<mpsc::UnboundedReceiver<JobOutcome>> {
        self.outcomes.take()
    }

    /// Queue an image. False if it is already pending or the pool is stopping.
    /// Lower `priority` runs first.
    pub fn submit(&self, image: ImageId, priority: i32) -> bool {
        if *self.state.borrow() != RunState::Running {
            return false;
        }
        let queued = self.shared.queue.try_enqueue(image, image, priority);
        if queued {
            self.shared.wake.notify_one();
        }
        queued
    }

    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Process everything already queued, then stop.
    pub async fn finish(self) -> IndexStats {
        self.stop(RunState::Draining).await
    }

    /// Stop after the images currently in progress; the rest stay unprocessed.
    pub async fn cancel(self) -> IndexStats {
        self.stop(RunState::Cancelled).await
    }

    async fn stop(self, state: RunState) -> IndexStats {
        self.state.send_replace(state);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!("Indexing worker panicked: {e}");
            }
        }
        let stats = IndexStats {
            indexed: self.shared.indexed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            abandoned: self.shared.queue.len(),
        };
        tracing::info!(
            "Indexing stopped: {} indexed, {} failed, {} abandoned",
            stats.indexed,
            stats.failed,
            stats.abandoned
        );
        stats
    }
}

impl Worker {
    async fn run(&self, n: usize, mut state: watch::Receiver<RunState>) {
        loop {
            if *state.borrow() == RunState::Cancelled {
                break;
            }

            // registered before the queue check so a submit in between is not lost
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(image) = self.queue.try_dequeue() {
                let outcome = self.index(image).await;
                // nobody listening is fine
                let _ = self.outcomes.send(outcome);
                continue;
            }
            if *state.borrow() == RunState::Draining {
                break;
            }
            tokio::select! {
                _ = &mut notified => {}
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::trace!("Indexing worker {} exiting", n);
    }

    async fn index(&self, image: ImageId) -> JobOutcome {
        let start = Instant::now();
        match self.process(image).await {
            Ok((processor, thumbs_generated)) => {
                self.indexed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Indexed image {} with {} in {:?}", image, processor, start.elapsed());
                JobOutcome::Indexed {
                    image,
                    processor,
                    thumbs_generated,
                }
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Failed to index image {}: {}", image, e);
                JobOutcome::Failed {
                    image,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn process(&self, image: ImageId) -> Result<(&'static str, bool), GlimpseError> {
        let record = self
            .store
            .get_image(image)?
            .ok_or(StoreError::NotFound { kind: "image", id: image.0 })?;
        let path = record.path;
        self.validator.validate(&path)?;

        let processor = self
            .factory
            .for_path(&path)
            .ok_or_else(|| PipelineError::UnsupportedFormat {
                path: path.clone(),
                format: path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("none")
                    .to_string(),
            })?;
        tracing::debug!("Image {} {:?} -> {}", image, path, processor.name());

        // in-process folds cannot be interrupted, so the key stays held until
        // they return; the external tool enforces its own time limit
        let targets = self.layout.targets(image);
        let result = processor.create_thumbs(&path, &targets).await?;

        let keep_stored = !result.thumbs_generated && self.store.get_hash(image)?.is_some();
        if !keep_stored {
            let hashes = self.hash(image, path, result.content_hash).await?;
            self.store.upsert_hash(image, &hashes)?;
        }
        self.store
            .upsert_thumbnail_state(image, &self.layout.existing(image))?;

        Ok((processor.name(), result.thumbs_generated))
    }

    /// Perceptual hash from the largest thumbnail; the backend's content
    /// hash wins when it produced one.
    async fn hash(
        &self,
        image: ImageId,
        source: PathBuf,
        content_hash: String,
    ) -> Result<ImageHashes, PipelineError> {
        let Some(largest) = self.layout.largest_existing(image) else {
            return Err(PipelineError::FileNotFound(source));
        };
        let path = largest.clone();
        let mut hashes = run_blocking(&largest, move || Hasher::new().hash_file(&path)).await?;
        if !content_hash.is_empty() {
            hashes.content_hash = content_hash;
        }
        Ok(hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineResult;
    use crate::pipeline::{LanczosScaler, ThumbnailEngine};
    use crate::processor::{Capabilities, FastProcessor, ImageProcessor};
    use crate::types::{ImageProcessResult, ThumbTarget};
    use std::path::Path;
    use crate::store::{MemoryStore, NewImage};
    use crate::types::{ExifData, ThumbConfig, ThumbSize};
    use image::{DynamicImage, Rgb, RgbImage};

    fn config(workers: usize) -> Config {
        let mut config = Config::default();
        config.processing.parallel_workers = workers;
        config
    }

    fn setup(dir: &std::path::Path) -> (Arc<MemoryStore>, Arc<ProcessorFactory>, ThumbnailLayout) {
        let store = Arc::new(MemoryStore::new());
        let factory = Arc::new(ProcessorFactory::new(vec![Arc::new(FastProcessor::new(85))]));
        let layout = ThumbnailLayout::new(
            dir.join("thumbs"),
            vec![
                ThumbConfig::new(ThumbSize::Big, 64, 64, false),
                ThumbConfig::new(ThumbSize::Small, 16, 16, true),
            ],
        );
        (store, factory, layout)
    }

    fn register(store: &MemoryStore, path: std::path::PathBuf) -> ImageId {
        store
            .register_image(&NewImage {
                file_size: std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0),
                path,
                modified_at: chrono::NaiveDate::from_ymd_opt(2020, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
                exif: ExifData::default(),
            })
            .unwrap()
    }

    fn write_png(path: &std::path::Path, shade: u8) {
        DynamicImage::ImageRgb8(RgbImage::from_fn(120, 90, |x, y| {
            Rgb([shade, (x * 2) as u8, (y * 2) as u8])
        }))
        .save_with_format(path, image::ImageFormat::Png)
        .unwrap();
    }

    #[tokio::test]
    async fn test_indexes_and_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let (store, factory, layout) = setup(dir.path());

        let good = dir.path().join("good.png");
        write_png(&good, 10);
        let good = register(&store, good);
        let missing = register(&store, dir.path().join("gone.png"));

        let mut service =
            IndexingService::with_layout(store.clone(), factory, &config(2), layout.clone());
        let mut outcomes = service.subscribe().unwrap();
        assert!(service.subscribe().is_none());

        assert!(service.submit(good, 1));
        assert!(service.submit(missing, 2));
        let stats = service.finish().await;
        assert_eq!((stats.indexed, stats.failed, stats.abandoned), (1, 1, 0));

        let mut seen = Vec::new();
        while let Some(outcome) = outcomes.recv().await {
            seen.push(outcome);
        }
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&JobOutcome::Indexed {
            image: good,
            processor: "fast",
            thumbs_generated: true,
        }));
        assert!(seen
            .iter()
            .any(|o| matches!(o, JobOutcome::Failed { image, .. } if *image == missing)));

        let record = store.get_image(good).unwrap().unwrap();
        assert_eq!(record.thumb_sizes, vec![ThumbSize::Big, ThumbSize::Small]);
        let hash = store.get_hash(good).unwrap().unwrap();
        assert_eq!(hash.content_hash.len(), 64);
        assert!(hash.perceptual().is_some());
        assert!(layout.path(good, ThumbSize::Small).is_file());
    }

    #[tokio::test]
    async fn test_rerun_keeps_existing_hash() {
        let dir = tempfile::tempdir().unwrap();
        let (store, factory, layout) = setup(dir.path());
        let source = dir.path().join("a.png");
        write_png(&source, 200);
        let id = register(&store, source);

        let service =
            IndexingService::with_layout(store.clone(), factory.clone(), &config(1), layout.clone());
        service.submit(id, 0);
        service.finish().await;
        let first = store.get_hash(id).unwrap().unwrap();

        let mut service = IndexingService::with_layout(store.clone(), factory, &config(1), layout);
        let mut outcomes = service.subscribe().unwrap();
        service.submit(id, 0);
        service.finish().await;
        assert_eq!(
            outcomes.recv().await,
            Some(JobOutcome::Indexed {
                image: id,
                processor: "fast",
                thumbs_generated: false,
            })
        );
        assert_eq!(store.get_hash(id).unwrap().unwrap(), first);
    }

    #[tokio::test]
    async fn test_cancel_stops_accepting_work() {
        let dir = tempfile::tempdir().unwrap();
        let (store, factory, layout) = setup(dir.path());
        let service = IndexingService::with_layout(store, factory, &config(1), layout);
        let stats = service.cancel().await;
        assert_eq!(stats, IndexStats::default());
    }

    #[tokio::test]
    async fn test_unsupported_extension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (store, factory, layout) = setup(dir.path());
        let odd = dir.path().join("scan.bmp");
        DynamicImage::ImageRgb8(RgbImage::new(8, 8)).save(&odd).unwrap();
        let id = register(&store, odd);

        let mut service = IndexingService::with_layout(store, factory, &config(1), layout);
        let mut outcomes = service.subscribe().unwrap();
        service.submit(id, 0);
        service.finish().await;
        match outcomes.recv().await {
            Some(JobOutcome::Failed { error, .. }) => assert!(error.contains("bmp")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    /// In-process backend that takes far longer than the configured limits.
    struct SlowProcessor;

    #[async_trait::async_trait]
    impl ImageProcessor for SlowProcessor {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn supported_extensions(&self) -> &'static [&'static str] {
            &[".png"]
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                thumbnails: true,
                ..Capabilities::default()
            }
        }

        async fn create_thumbs(
            &self,
            source: &Path,
            targets: &[ThumbTarget],
        ) -> PipelineResult<ImageProcessResult> {
            let (source, targets) = (source.to_path_buf(), targets.to_vec());
            run_blocking(&source.clone(), move || {
                std::thread::sleep(std::time::Duration::from_millis(200));
                ThumbnailEngine::new(LanczosScaler, 90).generate(&source, &targets)
            })
            .await
        }
    }

    #[tokio::test]
    async fn test_slow_in_process_fold_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _, layout) = setup(dir.path());
        let factory = Arc::new(ProcessorFactory::new(vec![Arc::new(SlowProcessor)]));
        let source = dir.path().join("slow.png");
        write_png(&source, 50);
        let id = register(&store, source);

        let mut config = config(1);
        config.limits.decode_timeout_ms = 10;
        config.limits.external_tool_timeout_ms = 10;

        let mut service = IndexingService::with_layout(store.clone(), factory, &config, layout.clone());
        let mut outcomes = service.subscribe().unwrap();
        service.submit(id, 0);
        let stats = service.finish().await;

        assert_eq!((stats.indexed, stats.failed), (1, 0));
        assert_eq!(
            outcomes.recv().await,
            Some(JobOutcome::Indexed {
                image: id,
                processor: "slow",
                thumbs_generated: true,
            })
        );
        assert!(layout.path(id, ThumbSize::Big).is_file());
        assert!(layout.path(id, ThumbSize::Small).is_file());
    }
}
