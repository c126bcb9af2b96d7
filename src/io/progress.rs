use std::{
    path::PathBuf,
    sync::{Mutex, OnceLock},
};

use crate::{core::stage::Stage, types::Stem};

/// Progress events raised while a file is being split.
#[derive(Clone, Debug)]
pub enum SplitProgress {
    /// A pipeline stage is starting.
    Stage(Stage),
    AudioLoaded {
        sample_rate: u32,
        channels: usize,
        frames: usize,
    },
    Resampling {
        from: u32,
        to: u32,
    },
    Chunks {
        done: usize,
        total: usize,
    },
    StemWritten {
        stem: Stem,
        path: PathBuf,
    },
    StemFailed {
        stem: Stem,
        path: PathBuf,
        error: String,
    },
    Finished {
        written: usize,
        failed: usize,
    },
}

type DownloadCb = Box<dyn Fn(u64, u64) + Send + 'static>;
type SplitCb = Box<dyn Fn(&SplitProgress) + Send + 'static>;

static DOWNLOAD_PROGRESS_CB: OnceLock<Mutex<Option<DownloadCb>>> = OnceLock::new();
static SPLIT_PROGRESS_CB: OnceLock<Mutex<Option<SplitCb>>> = OnceLock::new();

/// Installs the download callback, replacing any previous one.
pub fn set_download_progress_callback(cb: impl Fn(u64, u64) + Send + 'static) {
    let slot = DOWNLOAD_PROGRESS_CB.get_or_init(|| Mutex::new(None));
    if let Ok(mut g) = slot.lock() {
        *g = Some(Box::new(cb));
    }
}

/// Installs the split callback, replacing any previous one.
pub fn set_split_progress_callback(cb: impl Fn(&SplitProgress) + Send + 'static) {
    let slot = SPLIT_PROGRESS_CB.get_or_init(|| Mutex::new(None));
    if let Ok(mut g) = slot.lock() {
        *g = Some(Box::new(cb));
    }
}

pub fn emit_download_progress(done: u64, total: u64) {
    if let Some(m) = DOWNLOAD_PROGRESS_CB.get() {
        if let Ok(g) = m.lock() {
            if let Some(cb) = &*g {
                cb(done, total);
            }
        }
    }
}

pub fn emit_split_progress(event: SplitProgress) {
    if let Some(m) = SPLIT_PROGRESS_CB.get() {
        if let Ok(g) = m.lock() {
            if let Some(cb) = &*g {
                cb(&event);
            }
        }
    }
}
