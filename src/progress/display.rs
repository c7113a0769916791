//! Terminal rendering of polled task snapshots.
//!
//! [`TaskDisplay`] owns a main bar for a task's overall progress and a child
//! bar for the bytes of the current item. It never talks to the transfer
//! itself: it is fed [`TaskSnapshot`]s, so it renders any task the registry
//! knows about, including ones started by another caller.
//!
//! # Examples
//!
//! ```rust,no_run
//! use comfy_fetch::progress::{StyleOptions, TaskDisplay};
//! use comfy_fetch::service::{DownloadRequest, TransferService};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), comfy_fetch::Error> {
//! let service = TransferService::builder().build()?;
//! let id = service.download(DownloadRequest::new(
//!     "https://example.com/upscale/4x.pth",
//!     "models/upscale_models/4x.pth",
//! ))?;
//!
//! let mut display = TaskDisplay::new(StyleOptions::default(), "4x.pth");
//! let last = display.watch(&service, &id, Duration::from_millis(250)).await;
//! # Ok(())
//! # }
//! ```

use crate::progress::StyleOptions;
use crate::service::TransferService;
use crate::task::{TaskId, TaskSnapshot, TaskStatus};

use indicatif::{HumanBytes, HumanDuration, MultiProgress, ProgressBar, ProgressDrawTarget};
use std::time::Duration;

/// Progress bars for one task.
pub struct TaskDisplay {
    multi: MultiProgress,
    main: ProgressBar,
    child: ProgressBar,
    style_options: StyleOptions,
    current_index: Option<usize>,
}

impl TaskDisplay {
    /// Create the bars; `label` prefixes the main bar.
    pub fn new(style_options: StyleOptions, label: impl Into<String>) -> Self {
        let multi = match style_options.is_enabled() {
            true => MultiProgress::new(),
            false => MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        };

        let main = multi.add(style_options.main().to_progress_bar(100));
        main.set_prefix(label.into());
        let child = multi.add(style_options.child().to_progress_bar(0));
        main.tick();

        Self {
            multi,
            main,
            child,
            style_options,
            current_index: None,
        }
    }

    /// Get the multi-progress instance, e.g. to print above the bars.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }

    /// Position of the main bar, in percent.
    pub fn position(&self) -> u64 {
        self.main.position()
    }

    /// Render one snapshot.
    pub fn update(&mut self, snapshot: &TaskSnapshot) {
        self.main.set_position(u64::from(snapshot.overall_progress));
        if snapshot.item_count > 1 {
            self.main.set_message(format!(
                "item {}/{}",
                (snapshot.current_index + 1).min(snapshot.item_count),
                snapshot.item_count
            ));
        }

        if self.current_index != Some(snapshot.current_index) {
            self.child.reset();
            self.current_index = Some(snapshot.current_index);
        }
        self.child.set_length(snapshot.total_bytes);
        self.child.set_position(snapshot.downloaded_bytes);
        self.child.set_message(rate(snapshot));
    }

    /// Render the last snapshot and stop the bars.
    pub fn finish(&self, snapshot: &TaskSnapshot) {
        let message = match (&snapshot.status, &snapshot.error) {
            (TaskStatus::Error, Some(error)) => format!("failed: {}", error),
            (TaskStatus::Completed, _) if !snapshot.item_errors.is_empty() => {
                format!("done, {} item(s) failed", snapshot.item_errors.len())
            }
            (status, _) => format!("{:?}", status).to_lowercase(),
        };
        self.main.set_message(message);

        if self.style_options.child().clear {
            self.child.finish_and_clear();
        } else {
            self.child.finish();
        }
        if self.style_options.main().clear {
            self.main.finish_and_clear();
        } else {
            self.main.finish();
        }
    }

    /// Poll `id` every `interval` and render it until the run stops.
    ///
    /// Returns the last snapshot, or `None` if the task is unknown or
    /// vanished while watching.
    pub async fn watch(
        &mut self,
        service: &TransferService,
        id: &TaskId,
        interval: Duration,
    ) -> Option<TaskSnapshot> {
        let mut seen_running = false;
        loop {
            let snapshot = service.poll(id)?;
            self.update(&snapshot);

            let stopped = snapshot.status.is_terminal()
                || (seen_running && snapshot.status == TaskStatus::Pending);
            if stopped {
                self.finish(&snapshot);
                return Some(snapshot);
            }
            seen_running |= snapshot.status == TaskStatus::Running;
            tokio::time::sleep(interval).await;
        }
    }
}

fn rate(snapshot: &TaskSnapshot) -> String {
    if snapshot.speed_bytes_per_sec <= 0.0 {
        return String::new();
    }
    let speed = HumanBytes(snapshot.speed_bytes_per_sec as u64);
    match snapshot.eta_seconds {
        Some(eta) => format!(
            "{}/s eta {}",
            speed,
            HumanDuration(Duration::from_secs_f64(eta))
        ),
        None => format!("{}/s", speed),
    }
}
