use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use motion_photo::{
    extract_video, find_eoi, probe, JpegSegments, MediaType, MotionPhotoComposer, Mp4Box,
    Mp4BoxWalker,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "motion-photo")]
#[command(author, version, about = "Compose and inspect Motion Photo JPEGs")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuse a JPEG and an MP4 into a Motion Photo
    Compose {
        /// Still image (JPEG)
        #[arg(required = true)]
        image: PathBuf,

        /// Video to embed (MP4)
        #[arg(required = true)]
        video: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Declared MIME type of the image (detected from its bytes if omitted)
        #[arg(long)]
        image_type: Option<String>,

        /// Presentation timestamp in microseconds (defaults to half the video duration)
        #[arg(long)]
        timestamp_us: Option<u64>,

        /// Fail instead of guessing when the image's EOI is not structurally reachable
        #[arg(long)]
        strict: bool,
    },

    /// Show the Motion Photo fields and embedded video of a file
    Inspect {
        /// File to inspect
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Write the embedded video of a Motion Photo to a file
    Extract {
        /// Motion Photo
        #[arg(required = true)]
        file: PathBuf,

        /// Output file (defaults to the input with an .mp4 extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick a level from the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "motion_photo=debug".to_string()
        } else {
            "motion_photo=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter.as_str())
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Compose {
            image,
            video,
            output,
            image_type,
            timestamp_us,
            strict,
        } => compose_file(
            &image,
            &video,
            &output,
            image_type.as_deref(),
            timestamp_us,
            strict,
        ),
        Commands::Inspect { file } => inspect_file(&file),
        Commands::Extract { file, output } => {
            let output =
                output.unwrap_or_else(|| file.with_extension(MediaType::Mp4.to_extension()));
            extract_file(&file, &output)
        }
    }
}

fn compose_file(
    image_path: &Path,
    video_path: &Path,
    output: &Path,
    image_type: Option<&str>,
    timestamp_us: Option<u64>,
    strict: bool,
) -> Result<()> {
    let image = std::fs::read(image_path)
        .with_context(|| format!("Failed to read image {:?}", image_path))?;
    let video = std::fs::read(video_path)
        .with_context(|| format!("Failed to read video {:?}", video_path))?;

    let image_type = image_type.unwrap_or_else(|| MediaType::detect(&image).to_mime());
    tracing::info!("Composing {:?} ({}) with {:?}", image_path, image_type, video_path);

    let mut composer = MotionPhotoComposer::new().strict_eoi(strict);
    if let Some(timestamp_us) = timestamp_us {
        composer = composer.with_presentation_timestamp(timestamp_us);
    }
    let photo = composer
        .assemble(&image, image_type, &video)
        .context("Failed to compose motion photo")?;

    std::fs::write(output, photo.as_bytes())
        .with_context(|| format!("Failed to write {:?}", output))?;

    println!("Output: {}", output.display());
    println!("Size: {} bytes", photo.len());
    println!("Video length: {} bytes", photo.metadata.container_length);
    println!("Media data length: {} bytes", photo.metadata.data_length);
    println!(
        "Presentation timestamp: {} us",
        photo.metadata.presentation_timestamp_us
    );
    if photo.trimmed_bytes > 0 {
        println!("Dropped {} bytes after the image's EOI", photo.trimmed_bytes);
    }
    Ok(())
}

fn inspect_file(path: &Path) -> Result<()> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;

    println!("File: {}", path.display());
    println!("Type: {}", MediaType::detect(&data));

    if let Ok(segments) = JpegSegments::new(&data) {
        println!("\nSegments:");
        for segment in segments {
            println!(
                "  {} @ {}: {} bytes",
                segment.marker.label(),
                segment.marker.offset,
                segment.total_size()
            );
        }
        println!();
    }

    match find_eoi(&data) {
        Ok(eoi) => println!("EOI: offset {} ({:?})", eoi.offset, eoi.method),
        Err(e) => println!("EOI: {}", e),
    }

    let fields = probe(&data);
    tracing::debug!("XMP fields: {:?}", fields);
    println!("Motion Photo: {}", fields.is_motion_photo());
    println!(
        "Presentation timestamp: {} us",
        fields.presentation_timestamp_us
    );
    println!("Declared video length: {}", fields.video_length_declared);
    println!("Motion item length: {}", fields.motion_length);
    if fields.gain_map_length > 0 {
        println!("Gain map length: {}", fields.gain_map_length);
    }
    if !fields.version_tag.is_empty() {
        println!("Gain map version: {}", fields.version_tag);
    }

    if let Some(video) = extract_video(&data) {
        let walker = Mp4BoxWalker::new(video);
        println!("\nEmbedded video: {} bytes", video.len());
        for mp4_box in walker.boxes() {
            print_box(&mp4_box);
        }
        if let Some(duration) = walker.movie_duration_micros() {
            println!("Duration: {} us", duration);
        }
    }
    Ok(())
}

fn print_box(mp4_box: &Mp4Box) {
    let truncated = if mp4_box.is_truncated() { " (truncated)" } else { "" };
    println!(
        "  {} @ {}: {} bytes{}",
        mp4_box.fourcc_str(),
        mp4_box.offset,
        mp4_box.size,
        truncated
    );
}

fn extract_file(path: &Path, output: &Path) -> Result<()> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;

    let Some(video) = extract_video(&data) else {
        anyhow::bail!("No embedded video declared in {:?}", path);
    };

    std::fs::write(output, video).with_context(|| format!("Failed to write {:?}", output))?;
    tracing::info!("Extracted {} bytes to {:?}", video.len(), output);
    println!("Output: {}", output.display());
    Ok(())
}
