use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use docdrop_store::SweeperStats;

pub struct Counter {
    value: Arc<AtomicU64>,
    name: &'static str,
    help: &'static str,
}

impl Counter {
    pub fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0)),
            name,
            help,
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn render(&self, output: &mut String) {
        write_counter(output, self.name, self.help, self.get());
    }
}

impl Clone for Counter {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            name: self.name,
            help: self.help,
        }
    }
}

fn write_counter(output: &mut String, name: &str, help: &str, value: u64) {
    // Writing into a String cannot fail.
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} counter");
    let _ = writeln!(output, "{name} {value}");
}

/// Request-path counters for the upload/convert service.
pub struct ServiceMetrics {
    pub uploads: Counter,
    pub upload_bytes: Counter,
    pub upload_failures: Counter,
    pub conversions: Counter,
    pub conversion_failures: Counter,
    pub conversion_timeouts: Counter,
    pub deletions: Counter,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            uploads: Counter::new("docdrop_uploads_total", "Files stored."),
            upload_bytes: Counter::new("docdrop_upload_bytes_total", "Bytes stored."),
            upload_failures: Counter::new("docdrop_upload_failures_total", "Uploads rejected or failed."),
            conversions: Counter::new("docdrop_conversions_total", "Successful conversions."),
            conversion_failures: Counter::new(
                "docdrop_conversion_failures_total",
                "Conversions that failed for any reason.",
            ),
            conversion_timeouts: Counter::new(
                "docdrop_conversion_timeouts_total",
                "Conversions that exceeded their time budget.",
            ),
            deletions: Counter::new("docdrop_deletions_total", "Files removed on request."),
        }
    }

    fn counters(&self) -> [&Counter; 7] {
        [
            &self.uploads,
            &self.upload_bytes,
            &self.upload_failures,
            &self.conversions,
            &self.conversion_failures,
            &self.conversion_timeouts,
            &self.deletions,
        ]
    }

    /// Prometheus text exposition, including sweeper totals when available.
    pub fn render_prometheus(&self, sweeper: Option<&SweeperStats>) -> String {
        let mut output = String::new();
        for counter in self.counters() {
            counter.render(&mut output);
        }

        if let Some(stats) = sweeper {
            write_counter(&mut output, "docdrop_sweeps_total", "Completed retention sweeps.", stats.sweeps);
            write_counter(
                &mut output,
                "docdrop_sweep_files_scanned_total",
                "Files inspected by the retention sweeper.",
                stats.files_scanned,
            );
            write_counter(
                &mut output,
                "docdrop_sweep_files_deleted_total",
                "Expired files deleted by the retention sweeper.",
                stats.files_deleted,
            );
            write_counter(
                &mut output,
                "docdrop_sweep_errors_total",
                "Per-file failures skipped by the retention sweeper.",
                stats.errors,
            );
        }
        output
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}
