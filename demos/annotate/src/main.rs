//! Terminal driver: pick an image, press Enter to start recording a spoken
//! annotation for it, press Enter again to stop and save it.

mod console_delegate;

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use annotation_capture_core::storage::paths::{
    annotation_target, ensure_directory, existing_annotation, is_image, list_images,
};
use annotation_capture_core::{
    CaptureConfiguration, CaptureError, CaptureProvider, RecordingResult, RecordingSession,
    SyntheticCapture, WavFileWriter,
};
use annotation_capture_cpal::{check_microphone_access, CpalMicCapture, DeviceEnumerator};

use console_delegate::ConsoleDelegate;

#[derive(Parser, Debug)]
#[command(name = "annotate", about = "Record spoken annotations for images")]
struct Args {
    /// Directory holding the images to annotate
    #[arg(long, default_value = "images")]
    images: PathBuf,

    /// Directory the recordings are written to
    #[arg(long, default_value = "audio_annotations")]
    annotations: PathBuf,

    /// Annotate this image instead of choosing from a list
    #[arg(long)]
    image: Option<String>,

    /// Stop automatically after this many seconds
    #[arg(long)]
    duration: Option<f64>,

    /// JSON capture configuration; command-line flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Record a generated tone instead of the microphone
    #[arg(long)]
    synthetic: bool,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if args.list_devices {
        return list_devices();
    }

    let config = load_configuration(&args)?;
    ensure_directory(&config.output_directory)?;

    if args.synthetic {
        let block_frames = config.block_frames.unwrap_or(1024) as usize;
        let tone = SyntheticCapture::new(config.sample_rate, block_frames).with_tone(440.0, 0.3);
        run(tone, config, &args)
    } else {
        if !check_microphone_access()? {
            bail!("no microphone is reachable; try --list-devices or --synthetic");
        }
        let mic = CpalMicCapture::from_configuration(&config);
        run(mic, config, &args)
    }
}

fn list_devices() -> Result<()> {
    let devices = DeviceEnumerator::new().list_capture_devices()?;
    if devices.is_empty() {
        println!("No input devices found.");
    }
    for device in devices {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("{}{}", device.name, marker);
    }
    Ok(())
}

fn load_configuration(args: &Args) -> Result<CaptureConfiguration> {
    let mut config = match args.config {
        Some(ref path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<CaptureConfiguration>(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => CaptureConfiguration::default(),
    };

    config.output_directory = args.annotations.clone();
    if args.duration.is_some() {
        config.max_duration_secs = args.duration;
    }
    config.validate().map_err(CaptureError::ConfigurationFailed)?;
    Ok(config)
}

fn run<P: CaptureProvider + 'static>(
    provider: P,
    config: CaptureConfiguration,
    args: &Args,
) -> Result<()> {
    let device = provider.device_info();
    let session = RecordingSession::with_wav_writer(provider, config)?;
    let delegate = Arc::new(ConsoleDelegate::new());
    ConsoleDelegate::spawn_meter(&delegate);
    session.set_delegate(delegate);
    log::info!("recording from {}", device.name);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    if let Some(ref image) = args.image {
        if !is_image(image) {
            bail!("{} is not a supported image", image);
        }
        if !args.images.join(image).is_file() {
            bail!("{} not found in {}", image, args.images.display());
        }
        return annotate(&session, image, &mut lines);
    }

    loop {
        let images = list_images(&args.images)?;
        if images.is_empty() {
            bail!("no images found in {}", args.images.display());
        }

        let Some(choice) = choose_image(&images, &session.config().output_directory, &mut lines)?
        else {
            return Ok(());
        };
        annotate(&session, &images[choice], &mut lines)?;
    }
}

/// Print the numbered image list and read a selection. `None` means quit.
fn choose_image(
    images: &[String],
    output_directory: &Path,
    lines: &mut impl Iterator<Item = io::Result<String>>,
) -> Result<Option<usize>> {
    println!();
    for (i, name) in images.iter().enumerate() {
        let annotated = annotation_target(name)
            .ok()
            .and_then(|target| existing_annotation(output_directory, &target))
            .is_some();
        println!("{:>3}. {}{}", i + 1, name, if annotated { "  [annotated]" } else { "" });
    }

    loop {
        let Some(input) = prompt("Image number (q to quit): ", lines)? else {
            return Ok(None);
        };
        let input = input.trim();
        if input.eq_ignore_ascii_case("q") {
            return Ok(None);
        }
        match parse_choice(input, images.len()) {
            Some(index) => return Ok(Some(index)),
            None => println!("Enter a number between 1 and {}.", images.len()),
        }
    }
}

/// 1-based menu choice to index.
fn parse_choice(input: &str, count: usize) -> Option<usize> {
    match input.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Some(n - 1),
        _ => None,
    }
}

fn annotate<P: CaptureProvider + 'static>(
    session: &RecordingSession<P, WavFileWriter>,
    image: &str,
    lines: &mut impl Iterator<Item = io::Result<String>>,
) -> Result<()> {
    let target = annotation_target(image)?;
    let output_directory = session.config().output_directory;

    println!("\nImage: {}", image);
    match existing_annotation(&output_directory, &target) {
        Some(path) => println!("Existing annotation: {} (will be replaced)", path.display()),
        None => println!("No annotation yet."),
    }

    if prompt("Press Enter to start recording...", lines)?.is_none() {
        return Ok(());
    }
    if let Err(e) = session.start(&target) {
        println!("Could not start recording: {}", e);
        return Ok(());
    }

    match session.config().max_duration_secs {
        Some(secs) => println!("Recording for up to {:.1}s, press Enter to stop early.", secs),
        None => println!("Recording, press Enter to stop."),
    }
    let _ = prompt("", lines)?;

    match session.stop() {
        Ok(result) => report_saved(&result),
        // Already stopped by the duration limit; report what that stop produced.
        Err(CaptureError::InvalidState(_)) => match session.last_outcome() {
            Some(Ok(result)) => report_saved(&result),
            Some(Err(e)) => println!("Recording failed: {}", e),
            None => println!("Recording was not saved."),
        },
        Err(e) => println!("Recording failed: {}", e),
    }
    Ok(())
}

fn report_saved(result: &RecordingResult) {
    println!(
        "Saved {} ({:.2}s)",
        result.file_path.display(),
        result.duration_secs
    );
}

/// Print `text` and read one line. `None` on end of input.
fn prompt(
    text: &str,
    lines: &mut impl Iterator<Item = io::Result<String>>,
) -> Result<Option<String>> {
    if !text.is_empty() {
        print!("{}", text);
        io::stdout().flush()?;
    }
    match lines.next() {
        Some(line) => Ok(Some(line?)),
        None => Ok(None),
    }
}
