// thumbgate/src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use std::path::Path;
use std::time::Duration;
use thumbgate::backend::raster::RustBackend;
use thumbgate::backend::ImageHandle;
use thumbgate::cli::{Algorithm, Cli, Commands};
use thumbgate::core::context::RequestContext;
use thumbgate::core::crop::CropPolicy;
use thumbgate::core::frames::FrameRequest;
use thumbgate::core::processor::{Processor, ThumbnailRequest};
use thumbgate::core::session::{LibrarySession, Runtime, RuntimeSettings};
use thumbgate::utils::{format_file_size, generate_output_path};
use thumbgate::{BatchProcessor, Compressor, Loader, MetadataProcessor, ProcessConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .parse_default_env()
        .init();

    let config = match &cli.config {
        Some(path) => ProcessConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ProcessConfig::default(),
    };

    let runtime = Runtime::new();

    match cli.command {
        Commands::Thumbnail {
            input,
            output,
            width,
            height,
            crop,
            page,
            frames,
            dpi,
            filters,
            quality,
            unlimited,
            algorithm,
            timeout_ms,
        } => {
            let config = overrides(config, quality, algorithm, unlimited);
            let session = startup(&runtime, &config)?;
            let request = ThumbnailRequest {
                width,
                height,
                crop,
                frames: FrameRequest { n: frames, page },
                dpi: dpi.filter(|d| *d > 0),
                filters,
            };
            let output = output.unwrap_or_else(|| generate_output_path(&input, None, "thumb"));
            run_thumbnail(&session, config, &input, &output, &request, timeout_ms)?;
            session.shutdown();
        }
        Commands::Batch {
            input,
            output,
            width,
            height,
            crop,
            threads,
            recursive,
            quality,
            algorithm,
        } => {
            let config = overrides(config, quality, algorithm, false);
            let session = startup(&runtime, &config)?;
            run_batch(&session, config, &input, &output, width, height, crop, threads, recursive)?;
            session.shutdown();
        }
        Commands::Info { input } => {
            let session = startup(&runtime, &config)?;
            run_info(&session, config, &input)?;
            session.shutdown();
        }
    }

    Ok(())
}

fn overrides(
    mut config: ProcessConfig,
    quality: Option<u8>,
    algorithm: Option<Algorithm>,
    unlimited: bool,
) -> ProcessConfig {
    if let Some(quality) = quality {
        config.quality = quality;
    }
    if let Some(algorithm) = algorithm {
        config.algorithm = algorithm.into();
    }
    config.unlimited |= unlimited;
    config
}

fn startup(runtime: &std::sync::Arc<Runtime>, config: &ProcessConfig) -> Result<LibrarySession> {
    let settings = RuntimeSettings {
        concurrency: config.concurrency,
        debug: config.debug,
    };
    Ok(runtime.startup(&settings)?)
}

fn processor(session: &LibrarySession, config: ProcessConfig) -> Result<Processor<RustBackend>> {
    let backend = RustBackend::new(session, config.algorithm);
    Ok(Processor::new(backend, config)?)
}

fn run_thumbnail(
    session: &LibrarySession,
    config: ProcessConfig,
    input: &Path,
    output: &Path,
    request: &ThumbnailRequest,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let compressor = Compressor::new(config.quality);
    let processor = processor(session, config)?;

    let blob = Loader::new().load(input)?;
    let mut ctx = RequestContext::generate();
    if let Some(ms) = timeout_ms {
        ctx = ctx.with_timeout(Duration::from_millis(ms));
    }

    let image = processor
        .new_thumbnail(&ctx, &blob, request)
        .with_context(|| format!("Failed to thumbnail {}", input.display()))?;
    let written = compressor.save(&image, output)?;

    println!(
        "Thumbnail {}x{} ({} page(s), {}) saved to: {}",
        image.width(),
        image.page_height(),
        image.pages(),
        format_file_size(written),
        output.display()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_batch(
    session: &LibrarySession,
    config: ProcessConfig,
    input: &Path,
    output: &Path,
    width: u32,
    height: u32,
    crop: CropPolicy,
    threads: usize,
    recursive: bool,
) -> Result<()> {
    let compressor = Compressor::new(config.quality);
    let processor = processor(session, config)?;
    let request = ThumbnailRequest::new(width, height, crop);

    let batch = BatchProcessor::new(processor, compressor, request, threads)?;
    let stats = batch.process_directory(input, output, recursive)?;

    println!(
        "Batch processing complete. Processed {} images to: {}",
        stats.processed_count,
        output.display()
    );
    for (path, error) in &stats.errors {
        eprintln!("  failed: {}: {}", path, error);
    }
    Ok(())
}

fn run_info(session: &LibrarySession, config: ProcessConfig, input: &Path) -> Result<()> {
    let processor = processor(session, config)?;
    let blob = Loader::new().load(input)?;
    let ctx = RequestContext::generate();
    let image = processor
        .new_image(&ctx, &blob, FrameRequest::all(), None)
        .with_context(|| format!("Failed to decode {}", input.display()))?;

    println!("=== Image Information ===");
    println!("File: {}", input.display());
    println!("Size: {}", format_file_size(blob.size().unwrap_or(0)));
    println!("Format: {}", blob.blob_type());
    println!("Dimensions: {} x {} pixels", image.width(), image.page_height());
    println!("Pages: {}", image.pages());
    println!("Orientation: {}", image.orientation());

    let metadata = MetadataProcessor::new();
    match metadata.read_metadata(input) {
        Ok(Some(exif)) => {
            println!("\n=== EXIF Metadata ===");
            for (label, value) in metadata.extract_common_metadata(&exif) {
                println!("{:25}: {}", label, value);
            }
        }
        Ok(None) => println!("Has EXIF metadata: false"),
        Err(e) => log::debug!("no EXIF for {}: {}", input.display(), e),
    }
    Ok(())
}
