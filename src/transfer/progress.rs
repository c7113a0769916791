//! Progress reports pushed by the engine while a body streams in.

/// One progress report, emitted for the resume offset and for every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Whole percentage complete, `None` when the total is unknown.
    pub percent: Option<u8>,
    /// Bytes present in the partial file, including the resumed prefix.
    pub downloaded: u64,
    /// Declared total size, if the server sent one.
    pub total: Option<u64>,
}

impl Progress {
    /// Build a report, deriving the percentage from the byte counters.
    pub fn new(downloaded: u64, total: Option<u64>) -> Self {
        let percent = total.filter(|t| *t > 0).map(|t| {
            let pct = (downloaded.min(t) as u128 * 100) / t as u128;
            pct as u8
        });
        Self {
            percent,
            downloaded,
            total,
        }
    }
}

/// Observer receiving [`Progress`] reports in the order bytes arrived.
///
/// Any `FnMut(Progress) + Send` closure is a sink.
pub trait ProgressSink: Send {
    /// Called for every report.
    fn on_progress(&mut self, progress: Progress);
}

impl<F> ProgressSink for F
where
    F: FnMut(Progress) + Send,
{
    fn on_progress(&mut self, progress: Progress) {
        self(progress)
    }
}

/// A sink that drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&mut self, _progress: Progress) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_is_floored() {
        assert_eq!(Progress::new(400, Some(1000)).percent, Some(40));
        assert_eq!(Progress::new(999, Some(1000)).percent, Some(99));
        assert_eq!(Progress::new(1000, Some(1000)).percent, Some(100));
    }

    #[test]
    fn test_percent_unknown_without_total() {
        assert_eq!(Progress::new(512, None).percent, None);
        assert_eq!(Progress::new(0, Some(0)).percent, None);
    }

    #[test]
    fn test_closure_is_a_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |p: Progress| seen.push(p.downloaded);
            sink.on_progress(Progress::new(1, None));
            sink.on_progress(Progress::new(2, None));
        }
        assert_eq!(seen, vec![1, 2]);
    }
}
