//! Slide directory scanning and transmission history.
//!
//! Transmitted files are fingerprinted so that retransmitting an identical
//! slide reuses the prior transport id and receivers hit their cache.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use log::{debug, warn};

use dabpad_protocol::mot::MAXSLIDEID;

/// Sidecar suffix for MOT parameter files.
pub const SLS_PARAMS_SUFFIX: &str = ".sls_params";

/// A zero-byte file of this name triggers a directory re-scan.
pub const REQUEST_REREAD_FILENAME: &str = "REQUEST_SLIDES_DIR_REREAD";

/// How many slides to keep in history.
const MAXHISTORYLEN: usize = 50;

/// A slide queued for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideMetadata {
    pub filepath: PathBuf,
    /// Transport id, 0..=9999, rolls over.
    pub fidx: u32,
}

/// A simple fingerprint of a slide file. Two files with the same name, size
/// and modification time are considered the same slide.
#[derive(Debug, Clone)]
struct Fingerprint {
    name: String,
    size: u64,
    mtime: u64,
    fidx: u32,
}

impl Fingerprint {
    fn load_from_file(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let mtime = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Ok(Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: metadata.len(),
            mtime,
            fidx: 0,
        })
    }

    fn matches(&self, other: &Fingerprint) -> bool {
        self.name == other.name && self.size == other.size && self.mtime == other.mtime
    }
}

/// Bounded FIFO of transmitted slide fingerprints.
pub struct History {
    database: VecDeque<Fingerprint>,
    hist_size: usize,
    last_given_fidx: u32,
}

impl Default for History {
    fn default() -> Self {
        Self::new(MAXHISTORYLEN)
    }
}

impl History {
    pub fn new(hist_size: usize) -> Self {
        Self {
            database: VecDeque::new(),
            hist_size,
            last_given_fidx: 0,
        }
    }

    fn find(&self, fp: &Fingerprint) -> Option<u32> {
        self.database.iter().find(|e| e.matches(fp)).map(|e| e.fidx)
    }

    fn add(&mut self, fp: Fingerprint) {
        self.database.push_back(fp);
        if self.database.len() > self.hist_size {
            self.database.pop_front();
        }
    }

    /// Look up the slide id for a file, assigning a fresh one for slides not
    /// seen within the history window.
    pub fn get_fidx(&mut self, filepath: &Path) -> io::Result<u32> {
        Ok(self.lookup(Fingerprint::load_from_file(filepath)?))
    }

    fn lookup(&mut self, mut fp: Fingerprint) -> u32 {
        if let Some(fidx) = self.find(&fp) {
            debug!("reusing fidx {} for '{}'", fidx, fp.name);
            return fidx;
        }

        let fidx = self.last_given_fidx;
        self.last_given_fidx += 1;
        if self.last_given_fidx > MAXSLIDEID {
            self.last_given_fidx = 0;
        }

        fp.fidx = fidx;
        self.add(fp);
        fidx
    }
}

/// The queue of slides pending transmission, refilled from the slide
/// directory.
#[derive(Default)]
pub struct SlideStore {
    slides: VecDeque<SlideMetadata>,
    history: History,
}

impl SlideStore {
    /// Scan `dir` and queue its slides ordered by ascending fidx.
    pub fn init_from_dir(&mut self, dir: &Path) -> io::Result<()> {
        let mut slides = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
                continue;
            };
            if !Self::is_slide_filename(&name) {
                continue;
            }
            if !entry.file_type()?.is_file() {
                continue;
            }

            match self.history.get_fidx(&path) {
                Ok(fidx) => slides.push(SlideMetadata {
                    filepath: path,
                    fidx,
                }),
                Err(e) => {
                    warn!("skipping slide '{}': {}", path.display(), e);
                }
            }
        }

        // transmit in a deterministic order
        slides.sort_by_key(|s| s.fidx);
        self.slides = slides.into();
        Ok(())
    }

    /// Whether `name` refers to slide data (as opposed to hidden files,
    /// sidecar parameters or the re-read request file).
    fn is_slide_filename(name: &str) -> bool {
        !name.starts_with('.')
            && !name.ends_with(SLS_PARAMS_SUFFIX)
            && name != REQUEST_REREAD_FILENAME
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    /// Take the next slide off the queue.
    pub fn next(&mut self) -> Option<SlideMetadata> {
        self.slides.pop_front()
    }

    /// Drop all queued slides; the history stays intact.
    pub fn clear(&mut self) {
        self.slides.clear();
    }
}
