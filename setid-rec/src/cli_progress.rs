//! Terminal progress bars for the CLI

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

use setid_rec::services::{Pass, ProgressSink};

const TEMPLATE: &str =
    "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})";

/// One bar per pass
#[derive(Default)]
pub struct BarProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressSink for BarProgress {
    fn pass_started(&self, pass: Pass, total: usize) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::with_template(TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb.set_message(pass.to_string());

        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(pb);
        }
    }

    fn segment_done(&self, _pass: Pass, done: usize, _total: usize) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(pb) = slot.as_ref() {
                pb.set_position(done as u64);
            }
        }
    }

    fn pass_finished(&self, pass: Pass) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(pb) = slot.take() {
                pb.finish_with_message(format!("{} done", pass));
            }
        }
    }
}
