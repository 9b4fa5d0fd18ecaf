//! dabpad-encoder: DAB/DAB+ PAD encoder for MOT Slideshow and Dynamic Labels.
//!
//! Reads slide images from a directory and label text from files, and
//! serves ready-made PAD frames to the audio encoder over a local datagram
//! socket, one frame per request.

use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};

use dabpad_protocol::mot::MAXSLIDESIZE_SIMPLE;
use dabpad_protocol::types::DabCharset;
use dabpad_protocol::PadPacketizer;

mod error;
mod imaging;
mod labels;
mod logging;
mod scheduler;
mod slides;
mod sls;
mod transport;

use labels::DlParams;
use scheduler::{PadEncoder, PadEncoderOptions};
use transport::PadInterface;

/// dabpad-encoder - DAB PAD encoder for MOT Slideshow and DLS
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// PAD transport identifier; the socket is bound at /tmp/<IDENT>.padenc
    #[arg(short, long, default_value = "pad")]
    ident: String,

    /// Directory to read slides from
    #[arg(short = 'd', long = "dir")]
    sls_dir: Option<PathBuf>,

    /// File to read DLS text from; can be given more than once to rotate
    #[arg(short = 't', long = "dls")]
    dls_files: Vec<PathBuf>,

    /// Initial PAD length; the peer renegotiates it with every request
    #[arg(short, long, default_value = "58")]
    padlen: usize,

    /// Seconds between slides; 0 or less keeps the slideshow continuous
    #[arg(short = 's', long, default_value = "10")]
    slide_interval: i64,

    /// Seconds between label file rotations
    #[arg(short = 'l', long, default_value = "12")]
    label_interval: u64,

    /// Milliseconds between label insertions
    #[arg(short = 'L', long, default_value = "1200")]
    label_insertion: u64,

    /// Output X-PAD in every Nth frame only
    #[arg(long, default_value = "1")]
    xpad_interval: u32,

    /// Maximum encoded slide size in bytes
    #[arg(long, default_value_t = MAXSLIDESIZE_SIMPLE)]
    max_slide_size: usize,

    /// Charset id of the DLS text input (0: EBU Latin, 6: UCS-2 BE, 15: UTF-8)
    #[arg(short, long, default_value = "15")]
    charset: u8,

    /// Do not convert DLS texts to the EBU Latin repertoire
    #[arg(short = 'C', long)]
    raw_dls: bool,

    /// Always insert a Remove Label command when replacing a DLS text
    #[arg(short = 'r', long)]
    remove_dls: bool,

    /// Do not process slides; integrity checks and resizing are skipped
    #[arg(short = 'R', long)]
    raw_slides: bool,

    /// Erase slides once they have been encoded
    #[arg(short = 'e', long = "erase")]
    erase_after_tx: bool,

    /// Write each slide being transmitted to this path
    #[arg(long)]
    current_slide_dump: Option<PathBuf>,

    /// Move the dump here once the slide has fully left the queue
    #[arg(long)]
    completed_slide_dump: Option<PathBuf>,

    /// Separate label file supplying the DL Plus item toggle/running bits
    #[arg(long)]
    item_state_file: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory where log files are stored
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Number of days to keep log files
    #[arg(long, default_value = "7")]
    log_retention_days: u64,
}

/// Configuration file format.
#[derive(Debug, serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    encoder: EncoderSection,
    #[serde(default)]
    slides: SlidesSection,
    #[serde(default)]
    labels: LabelsSection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, serde::Deserialize, Default)]
struct EncoderSection {
    ident: Option<String>,
    padlen: Option<usize>,
    xpad_interval: Option<u32>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct SlidesSection {
    dir: Option<PathBuf>,
    slide_interval: Option<i64>,
    max_slide_size: Option<usize>,
    erase_after_tx: Option<bool>,
    raw_slides: Option<bool>,
    current_slide_dump: Option<PathBuf>,
    completed_slide_dump: Option<PathBuf>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct LabelsSection {
    files: Option<Vec<PathBuf>>,
    label_interval: Option<u64>,
    label_insertion: Option<u64>,
    charset: Option<u8>,
    raw_dls: Option<bool>,
    remove_dls: Option<bool>,
    item_state_file: Option<PathBuf>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct LoggingSection {
    log_dir: Option<PathBuf>,
    retention_days: Option<u64>,
}

fn load_config(path: &PathBuf) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

fn list_dls_files(dls_files: &[PathBuf]) -> String {
    dls_files
        .iter()
        .map(|f| format!("'{}'", f.display()))
        .collect::<Vec<_>>()
        .join("/")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load config file: explicit path > auto-detect > default
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from("dabpad.toml");
        if default_path.exists() {
            Some(default_path)
        } else {
            None
        }
    });
    let file_config = if let Some(config_path) = &config_path {
        match load_config(config_path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", config_path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e);
            }
        }
    } else {
        ConfigFile::default()
    };

    // Merge: command line takes precedence, file values fill in defaults
    let log_dir = if args.log_dir != PathBuf::from("logs") {
        args.log_dir.clone()
    } else {
        file_config.logging.log_dir.unwrap_or_else(|| PathBuf::from("logs"))
    };
    let log_retention_days = if args.log_retention_days != 7 {
        args.log_retention_days
    } else {
        file_config.logging.retention_days.unwrap_or(7)
    };

    logging::init_logging(&log_dir, log_retention_days, args.verbose)
        .expect("Failed to initialize logging");

    let ident = if args.ident != "pad" {
        args.ident
    } else {
        file_config.encoder.ident.unwrap_or(args.ident)
    };
    let padlen = if args.padlen != 58 {
        args.padlen
    } else {
        file_config.encoder.padlen.unwrap_or(args.padlen)
    };
    let xpad_interval = if args.xpad_interval != 1 {
        args.xpad_interval
    } else {
        file_config.encoder.xpad_interval.unwrap_or(args.xpad_interval)
    };

    let sls_dir = args.sls_dir.or(file_config.slides.dir);
    let dls_files = if !args.dls_files.is_empty() {
        args.dls_files
    } else {
        file_config.labels.files.unwrap_or_default()
    };

    let slide_interval = if args.slide_interval != 10 {
        args.slide_interval
    } else {
        file_config.slides.slide_interval.unwrap_or(args.slide_interval)
    };
    let label_interval = if args.label_interval != 12 {
        args.label_interval
    } else {
        file_config.labels.label_interval.unwrap_or(args.label_interval)
    };
    let label_insertion = if args.label_insertion != 1200 {
        args.label_insertion
    } else {
        file_config.labels.label_insertion.unwrap_or(args.label_insertion)
    };

    let mut max_slide_size = if args.max_slide_size != MAXSLIDESIZE_SIMPLE {
        args.max_slide_size
    } else {
        file_config.slides.max_slide_size.unwrap_or(args.max_slide_size)
    };
    let charset_id = if args.charset != 15 {
        args.charset
    } else {
        file_config.labels.charset.unwrap_or(args.charset)
    };

    let erase_after_tx = args.erase_after_tx || file_config.slides.erase_after_tx.unwrap_or(false);
    let raw_slides = args.raw_slides || file_config.slides.raw_slides.unwrap_or(false);
    let raw_dls = args.raw_dls || file_config.labels.raw_dls.unwrap_or(false);
    let remove_dls = args.remove_dls || file_config.labels.remove_dls.unwrap_or(false);

    let current_slide_dump = args.current_slide_dump.or(file_config.slides.current_slide_dump);
    let completed_slide_dump = args
        .completed_slide_dump
        .or(file_config.slides.completed_slide_dump);
    let item_state_file = args.item_state_file.or(file_config.labels.item_state_file);

    // Validate what cannot be fixed up
    if !PadPacketizer::check_pad_len(padlen) {
        return Err(format!(
            "PAD length {} invalid: allowed are 6 (short X-PAD) and 8 to 196 (variable size X-PAD)",
            padlen
        )
        .into());
    }

    let charset = DabCharset::try_from(charset_id).map_err(|e| e.to_string())?;
    if !raw_dls
        && !matches!(charset, DabCharset::CompleteEbuLatin | DabCharset::Utf8)
    {
        return Err("DLS conversion to EBU Latin is only supported for UTF-8 input".into());
    }

    if sls_dir.is_none() && dls_files.is_empty() {
        return Err("neither DLS nor Slideshow to encode".into());
    }

    if max_slide_size > MAXSLIDESIZE_SIMPLE {
        warn!(
            "max slide size {} exceeds Simple Profile limit, capping at {}",
            max_slide_size, MAXSLIDESIZE_SIMPLE
        );
        max_slide_size = MAXSLIDESIZE_SIMPLE;
    }

    match (&sls_dir, dls_files.is_empty()) {
        (Some(dir), false) => info!(
            "encoding Slideshow from '{}' and DLS from {}",
            dir.display(),
            list_dls_files(&dls_files)
        ),
        (Some(dir), true) => info!("encoding Slideshow from '{}'. No DLS.", dir.display()),
        (None, _) => info!(
            "encoding DLS from {}. No Slideshow.",
            list_dls_files(&dls_files)
        ),
    }
    info!("using charset {} ({})", charset.display_name(), charset as u8);
    if !raw_dls && charset == DabCharset::Utf8 {
        info!("converting DLS texts to Complete EBU Latin");
    }

    let transport = PadInterface::open(&ident)?;

    let options = PadEncoderOptions {
        padlen,
        slide_interval_s: slide_interval,
        label_interval_s: label_interval,
        label_insertion_ms: label_insertion,
        xpad_interval: xpad_interval.max(1),
        max_slide_size,
        erase_after_tx,
        raw_slides,
        dl_params: DlParams {
            charset,
            raw_dls,
            remove_dls,
        },
        sls_dir,
        dls_files,
        item_state_file,
        current_slide_dump,
        completed_slide_dump,
    };

    let mut encoder = PadEncoder::new(options, transport)?;
    encoder.run().await?;

    Ok(())
}
