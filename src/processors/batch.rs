// thumbgate/src/processors/batch.rs
use crate::backend::raster::RustBackend;
use crate::core::context::RequestContext;
use crate::core::processor::{Processor, ThumbnailRequest};
use crate::core::{Result, ThumbnailError};
use crate::processors::{Compressor, Loader};
use crate::utils::is_supported_format;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub processed_count: usize,
    pub total_size_before: u64,
    pub total_size_after: u64,
    /// Path and message of every file that failed.
    pub errors: Vec<(String, String)>,
}

/// Thumbnails every image in a directory with one shared request.
pub struct BatchProcessor {
    processor: Processor<RustBackend>,
    loader: Loader,
    compressor: Compressor,
    request: ThumbnailRequest,
    thread_pool: Option<rayon::ThreadPool>,
    show_progress: bool,
}

impl BatchProcessor {
    pub fn new(
        processor: Processor<RustBackend>,
        compressor: Compressor,
        request: ThumbnailRequest,
        max_threads: usize,
    ) -> Result<Self> {
        // Initialize thread pool once
        let thread_pool = match max_threads {
            0 => None,
            n => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| {
                        ThumbnailError::Config(format!("Failed to create thread pool: {}", e))
                    })?,
            ),
        };

        Ok(Self {
            processor,
            loader: Loader::new(),
            compressor,
            request,
            thread_pool,
            show_progress: true,
        })
    }

    pub fn with_loader(mut self, loader: Loader) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn process_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        recursive: bool,
    ) -> Result<ProcessingStats> {
        self.validate_paths(input_dir, output_dir)?;

        let image_paths = self.collect_image_paths(input_dir, recursive);
        if image_paths.is_empty() {
            log::warn!("No image files found in {}", input_dir.display());
            return Ok(ProcessingStats::default());
        }

        log::info!(
            "Processing {} images from {}",
            image_paths.len(),
            input_dir.display()
        );
        std::fs::create_dir_all(output_dir)?;

        let pb = self.create_progress_bar(image_paths.len());
        let run = || -> Vec<(PathBuf, Result<(u64, u64)>)> {
            image_paths
                .par_iter()
                .progress_with(pb.clone())
                .map(|path| (path.clone(), self.process_one(path, output_dir)))
                .collect()
        };
        let results = match &self.thread_pool {
            Some(pool) => pool.install(run),
            None => run(),
        };

        let mut stats = ProcessingStats::default();
        for (path, result) in results {
            match result {
                Ok((before, after)) => {
                    stats.processed_count += 1;
                    stats.total_size_before += before;
                    stats.total_size_after += after;
                }
                Err(e) => {
                    log::warn!("{}: {}", path.display(), e);
                    stats.errors.push((path.display().to_string(), e.to_string()));
                }
            }
        }

        pb.finish_with_message(format!(
            "Processed {} images ({:.1}% size reduction)",
            stats.processed_count,
            self.compressor
                .calculate_savings(stats.total_size_before, stats.total_size_after)
        ));

        Ok(stats)
    }

    /// Returns the input and output sizes in bytes.
    fn process_one(&self, input_path: &Path, output_dir: &Path) -> Result<(u64, u64)> {
        let file_name = input_path.file_name().ok_or_else(|| {
            ThumbnailError::InvalidParameter(format!("Invalid file name: {}", input_path.display()))
        })?;
        let output_path = output_dir.join(file_name);

        let blob = self.loader.load(input_path)?;
        let ctx = RequestContext::generate();
        log::debug!("request_id={} input={}", ctx.request_id(), input_path.display());

        let image = self.processor.new_thumbnail(&ctx, &blob, &self.request)?;
        let written = self.compressor.save(&image, &output_path)?;
        Ok((blob.size().unwrap_or(0), written))
    }

    fn collect_image_paths(&self, input_dir: &Path, recursive: bool) -> Vec<PathBuf> {
        let walker = if recursive {
            WalkDir::new(input_dir)
        } else {
            WalkDir::new(input_dir).max_depth(1)
        };

        let mut paths: Vec<PathBuf> = walker
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| is_supported_format(entry.path()))
            .map(|entry| entry.into_path())
            .collect();
        paths.sort();
        paths
    }

    fn create_progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        pb
    }

    pub fn validate_paths(&self, input_dir: &Path, output_dir: &Path) -> Result<()> {
        if !input_dir.exists() {
            return Err(ThumbnailError::NotFound);
        }

        if !input_dir.is_dir() {
            return Err(ThumbnailError::InvalidParameter(format!(
                "Input path is not a directory: {}",
                input_dir.display()
            )));
        }

        if output_dir.exists() && !output_dir.is_dir() {
            return Err(ThumbnailError::InvalidParameter(format!(
                "Output path exists but is not a directory: {}",
                output_dir.display()
            )));
        }

        // Thumbnails would be picked up as inputs on the next run.
        if input_dir == output_dir {
            return Err(ThumbnailError::InvalidParameter(
                "Input and output directories cannot be the same".to_string(),
            ));
        }

        Ok(())
    }
}
