use std::fmt::Write;

use blobstore::{ObjectKey, UploadReporter};
use indicatif::{HumanBytes, ProgressBar, ProgressState, ProgressStyle};
use parking_lot::Mutex;

use crate::global_multi_progress;

/// Shows a progress bar for the blob being uploaded.
#[derive(Default)]
pub struct IndicatifReporter {
    bar: Mutex<Option<ProgressBar>>,
}

fn default_bytes_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(
            "{spinner:.green} {prefix:20!} [{elapsed_precise}] [{bar:40!.bright.yellow/dim.white}] {bytes:>8} @ {smoothed_bytes_per_sec:8}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━━╾─")
        .with_key(
            "smoothed_bytes_per_sec",
            |s: &ProgressState, w: &mut dyn Write| match (s.pos(), s.elapsed().as_millis()) {
                (pos, elapsed_ms) if elapsed_ms > 0 => {
                    _ = write!(
                        w,
                        "{}/s",
                        HumanBytes((pos as f64 * 1000_f64 / elapsed_ms as f64) as u64)
                    );
                }
                _ => {
                    _ = write!(w, "-");
                }
            },
        )
}

impl UploadReporter for IndicatifReporter {
    fn on_upload_start(&self, key: &ObjectKey, total_bytes: u64) -> usize {
        let bar = global_multi_progress().add(
            ProgressBar::new(total_bytes)
                .with_style(default_bytes_style())
                .with_prefix(key.as_str().chars().take(20).collect::<String>()),
        );
        // The client uploads one blob at a time.
        *self.bar.lock() = Some(bar);
        0
    }

    fn on_upload_progress(&self, _index: usize, bytes_uploaded: u64, _total_bytes: u64) {
        if let Some(bar) = self.bar.lock().as_ref() {
            bar.set_position(bytes_uploaded);
        }
    }

    fn on_upload_complete(&self, _index: usize) {
        if let Some(bar) = self.bar.lock().take() {
            bar.finish_and_clear();
        }
    }

    fn on_duplicate(&self, key: &ObjectKey) {
        tracing::info!("{} {key} is already stored", console::style("✔").green());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobstore_digest::{compute_bytes_digest, Sha256};

    #[test]
    fn test_bar_follows_upload() {
        let reporter = IndicatifReporter::default();
        let key = ObjectKey::for_digest(&compute_bytes_digest::<Sha256>("helloworld"));

        let index = reporter.on_upload_start(&key, 10);
        reporter.on_upload_progress(index, 4, 10);
        assert_eq!(
            reporter.bar.lock().as_ref().map(ProgressBar::position),
            Some(4)
        );

        reporter.on_upload_complete(index);
        assert!(reporter.bar.lock().is_none());

        // Late progress after completion has no bar to update.
        reporter.on_upload_progress(index, 10, 10);
        assert!(reporter.bar.lock().is_none());
    }
}
