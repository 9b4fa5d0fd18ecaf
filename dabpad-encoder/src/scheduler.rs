//! The request-driven encode loop.
//!
//! # How It Works
//!
//! 1. The audio encoder requests one PAD frame per audio frame
//! 2. Each request runs one encode cycle: slide and label cadence checks,
//!    re-read requests, then exactly one PAD frame is emitted
//! 3. Label Data Groups are prepended to the queue so text overtakes a
//!    slide that is still draining
//!
//! Timers are absolute deadlines on a monotonic clock, advanced by their
//! period, so transient delays do not compound.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::signal::unix::{signal, SignalKind};

use dabpad_protocol::dls::{DlsEncoder, APPTYPE_DLS_START};
use dabpad_protocol::mot::{APPTYPE_MOT_START, MAXSLIDESIZE_SIMPLE};
use dabpad_protocol::types::DabCharset;
use dabpad_protocol::PadPacketizer;

use crate::error::EncoderError;
use crate::labels::{self, DlParams, REQUEST_REREAD_SUFFIX};
use crate::slides::{SlideStore, REQUEST_REREAD_FILENAME};
use crate::sls::SlsEncoder;
use crate::transport::PadInterface;

/// Encoder configuration, fully resolved from CLI and config file.
#[derive(Debug, Clone)]
pub struct PadEncoderOptions {
    /// Initial PAD length; re-negotiated by every peer request.
    pub padlen: usize,
    /// Seconds between slides; zero or negative keeps the queue busy.
    pub slide_interval_s: i64,
    /// Seconds between label file rotations.
    pub label_interval_s: u64,
    /// Milliseconds between label insertions.
    pub label_insertion_ms: u64,
    /// Emit X-PAD in every Nth frame only.
    pub xpad_interval: u32,
    /// Maximum encoded slide size in bytes (Simple Profile cap applies).
    pub max_slide_size: usize,
    pub erase_after_tx: bool,
    pub raw_slides: bool,
    pub dl_params: DlParams,
    pub sls_dir: Option<PathBuf>,
    pub dls_files: Vec<PathBuf>,
    pub item_state_file: Option<PathBuf>,
    pub current_slide_dump: Option<PathBuf>,
    pub completed_slide_dump: Option<PathBuf>,
}

impl Default for PadEncoderOptions {
    fn default() -> Self {
        Self {
            padlen: 58,
            slide_interval_s: 10,
            label_interval_s: 12,
            label_insertion_ms: 1200,
            xpad_interval: 1,
            max_slide_size: MAXSLIDESIZE_SIMPLE,
            erase_after_tx: false,
            raw_slides: false,
            dl_params: DlParams::default(),
            sls_dir: None,
            dls_files: Vec::new(),
            item_state_file: None,
            current_slide_dump: None,
            completed_slide_dump: None,
        }
    }
}

/// The encoder: owns the packetizer queue, both content encoders, the
/// slide store and the transport. Single task, no shared state.
pub struct PadEncoder {
    options: PadEncoderOptions,
    transport: PadInterface,

    packetizer: PadPacketizer,
    dls: DlsEncoder,
    sls: SlsEncoder,
    slides: SlideStore,

    current_padlen: usize,
    curr_dls_file: usize,
    xpad_counter: u32,

    next_slide: Instant,
    next_label: Instant,
    next_label_insertion: Instant,
}

impl PadEncoder {
    pub fn new(options: PadEncoderOptions, transport: PadInterface) -> Result<Self, EncoderError> {
        let packetizer = PadPacketizer::new(options.padlen)?;
        let now = Instant::now();

        Ok(Self {
            current_padlen: options.padlen,
            options,
            transport,
            packetizer,
            dls: DlsEncoder::new(),
            sls: SlsEncoder::new(),
            slides: SlideStore::default(),
            curr_dls_file: 0,
            xpad_counter: 0,
            next_slide: now,
            next_label: now,
            next_label_insertion: now,
        })
    }

    /// Serve PAD requests until shutdown.
    pub async fn run(&mut self) -> Result<(), EncoderError> {
        let mut sigterm = signal(SignalKind::terminate())?;

        info!("waiting for PAD requests");
        loop {
            let request = tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = sigterm.recv() => break,
                request = self.transport.receive_request() => request?,
            };

            if let Some(padlen) = request {
                self.encode_cycle(padlen as usize).await?;
            }
        }

        info!("exiting");
        Ok(())
    }

    /// One full request cycle, ending in exactly one emitted PAD frame.
    async fn encode_cycle(&mut self, padlen: usize) -> Result<(), EncoderError> {
        if padlen != self.current_padlen {
            // the peer dictates the PAD length; an unusable value is fatal
            self.packetizer = PadPacketizer::new(padlen)?;
            self.current_padlen = padlen;
            info!("peer changed PAD length to {}", padlen);
        }

        let now = Instant::now();

        self.move_completed_slide_dump();
        self.check_slides_reread_request();
        self.handle_slide_cadence(now);
        self.check_dls_reread_requests(now);
        self.rotate_dls_file(now);
        self.handle_label_insertion(now);

        let output_xpad = self.xpad_counter == 0;
        self.xpad_counter = (self.xpad_counter + 1) % self.options.xpad_interval;

        let frame = self.packetizer.next_frame(output_xpad);
        // the trailing used-length byte stays local
        self.transport.send_pad_data(&frame[..self.current_padlen]).await;

        Ok(())
    }

    /// Step 1: the previously dumped slide has left the queue; archive it.
    fn move_completed_slide_dump(&mut self) {
        let (Some(current), Some(completed)) = (
            self.options.current_slide_dump.as_ref(),
            self.options.completed_slide_dump.as_ref(),
        ) else {
            return;
        };

        if current.exists() && !self.packetizer.queue_contains(APPTYPE_MOT_START) {
            if let Err(e) = fs::rename(current, completed) {
                warn!(
                    "renaming slide dump '{}' to '{}' failed: {}",
                    current.display(),
                    completed.display(),
                    e
                );
            }
        }
    }

    /// Step 2: honour a pending slides directory re-read request.
    fn check_slides_reread_request(&mut self) {
        let Some(dir) = self.options.sls_dir.as_ref() else {
            return;
        };

        let request = dir.join(REQUEST_REREAD_FILENAME);
        if request.exists() {
            info!("slides directory re-read requested");
            self.slides.clear();
            if let Err(e) = fs::remove_file(&request) {
                warn!("removing '{}' failed: {}", request.display(), e);
            }
        }
    }

    /// Step 3: encode the next slide when due.
    fn handle_slide_cadence(&mut self, now: Instant) {
        let Some(dir) = self.options.sls_dir.clone() else {
            return;
        };
        // an unfinished slide must fully drain first
        if self.packetizer.queue_contains(APPTYPE_MOT_START) {
            return;
        }

        let due = if self.options.slide_interval_s > 0 {
            now >= self.next_slide
        } else {
            true
        };
        if !due {
            return;
        }

        if self.encode_next_slide(&dir) && self.options.slide_interval_s > 0 {
            self.next_slide += Duration::from_secs(self.options.slide_interval_s as u64);
        }
    }

    /// Encode the first slide that succeeds; refill the store when empty.
    /// Gives up for this cycle once a freshly read batch failed completely.
    fn encode_next_slide(&mut self, dir: &Path) -> bool {
        if self.slides.is_empty() {
            if let Err(e) = self.slides.init_from_dir(dir) {
                error!("cannot read slides directory '{}': {}", dir.display(), e);
                return false;
            }
        }

        while let Some(slide) = self.slides.next() {
            let result = self.sls.encode_slide(
                &mut self.packetizer,
                &slide.filepath,
                slide.fidx,
                self.options.raw_slides,
                self.options.max_slide_size,
                self.options.current_slide_dump.as_deref(),
            );

            if self.options.erase_after_tx {
                if let Err(e) = fs::remove_file(&slide.filepath) {
                    error!("erasing file '{}' failed: {}", slide.filepath.display(), e);
                }
            }

            match result {
                Ok(()) => return true,
                Err(e) => {
                    error!("cannot encode file '{}': {}", slide.filepath.display(), e);
                }
            }
        }

        false
    }

    /// Step 4: a re-read request switches to that label file immediately.
    fn check_dls_reread_requests(&mut self, now: Instant) {
        for i in 0..self.options.dls_files.len() {
            let request = append_suffix(&self.options.dls_files[i], REQUEST_REREAD_SUFFIX);
            if !request.exists() {
                continue;
            }

            info!(
                "DLS re-read requested for '{}'",
                self.options.dls_files[i].display()
            );
            self.curr_dls_file = i;
            self.next_label = now + Duration::from_secs(self.options.label_interval_s);
            // force immediate insertion
            self.next_label_insertion = now;

            if let Err(e) = fs::remove_file(&request) {
                warn!("removing '{}' failed: {}", request.display(), e);
            }
        }
    }

    /// Step 5: rotate through the label files.
    fn rotate_dls_file(&mut self, now: Instant) {
        if self.options.dls_files.len() <= 1 || now < self.next_label {
            return;
        }

        self.curr_dls_file = (self.curr_dls_file + 1) % self.options.dls_files.len();
        self.next_label += Duration::from_secs(self.options.label_interval_s);
        self.next_label_insertion = now;
    }

    /// Step 6: insert the current label when due.
    fn handle_label_insertion(&mut self, now: Instant) {
        if self.options.dls_files.is_empty() || now < self.next_label_insertion {
            return;
        }
        // an unfinished label burst must fully drain first
        if self.packetizer.queue_contains(APPTYPE_DLS_START) {
            return;
        }

        self.encode_label();
        self.next_label_insertion += Duration::from_millis(self.options.label_insertion_ms);
    }

    fn encode_label(&mut self) {
        let path = &self.options.dls_files[self.curr_dls_file];

        let mut state = match labels::parse_label_file(path, &self.options.dl_params) {
            Ok(state) => state,
            Err(e) => {
                error!("could not read label file '{}': {}", path.display(), e);
                return;
            }
        };

        // if configured, the item toggle/running bits come from their own file
        if let Some(item_state_file) = self.options.item_state_file.as_ref() {
            match labels::parse_label_file(item_state_file, &DlParams::default()) {
                Ok(item_state) => {
                    state.dl_plus_enabled = true;
                    state.dl_plus_item_toggle = item_state.dl_plus_item_toggle;
                    state.dl_plus_item_running = item_state.dl_plus_item_running;
                }
                Err(e) => {
                    error!(
                        "could not read item state file '{}': {}",
                        item_state_file.display(),
                        e
                    );
                    return;
                }
            }
        }

        debug!(
            "writing DLS text \"{}\"",
            String::from_utf8_lossy(&state.text)
        );

        let prefix_charset = if self.options.dl_params.raw_dls {
            self.options.dl_params.charset
        } else {
            DabCharset::CompleteEbuLatin
        };

        let burst = self
            .dls
            .encode(&state, prefix_charset, self.options.dl_params.remove_dls);
        // labels overtake any pending slide segments
        self.packetizer.add_dgs(burst, true);
    }
}

/// `<path><suffix>`, keeping the original extension.
fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default() {
        let options = PadEncoderOptions::default();
        assert_eq!(options.padlen, 58);
        assert_eq!(options.slide_interval_s, 10);
        assert_eq!(options.label_interval_s, 12);
        assert_eq!(options.label_insertion_ms, 1200);
        assert_eq!(options.xpad_interval, 1);
        assert_eq!(options.max_slide_size, MAXSLIDESIZE_SIMPLE);
    }

    #[test]
    fn test_append_suffix() {
        assert_eq!(
            append_suffix(Path::new("/x/label.txt"), REQUEST_REREAD_SUFFIX),
            PathBuf::from("/x/label.txt.REQUEST_DLS_REREAD")
        );
    }
}
