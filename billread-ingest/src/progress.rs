use std::{fmt, panic::AssertUnwindSafe};

use tracing::debug;

/// Milestones of a folder analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    FilesFound { total: usize },
    FileStarted { index: usize, total: usize, filename: String },
    FileFinished { filename: String, rows: usize },
    FileFailed { filename: String, error: String },
    MonthStarted { year: i32, month: u8 },
    BatchFinished { processed: usize, failed: usize },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FilesFound { total } => write!(f, "files found: {total}"),
            Self::FileStarted { index, total, filename } => write!(f, "[{index}/{total}] processing {filename}"),
            Self::FileFinished { filename, rows } => write!(f, "  ok {filename}: {rows} rows"),
            Self::FileFailed { filename, error } => write!(f, "  failed {filename}: {error}"),
            Self::MonthStarted { year, month } => write!(f, "month {year}-{month:02}"),
            Self::BatchFinished { processed, failed } => {
                write!(f, "done: {processed} processed, {failed} failed")
            }
        }
    }
}

/// Receiver of progress milestones. Anything a sink does wrong, returning
/// an error or panicking, is swallowed by the caller.
pub trait ProgressSink {
    fn report(&self, event: &ProgressEvent) -> anyhow::Result<()>;
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) -> anyhow::Result<()>,
{
    fn report(&self, event: &ProgressEvent) -> anyhow::Result<()> {
        self(event)
    }
}

pub(crate) fn notify(sink: Option<&dyn ProgressSink>, event: ProgressEvent) {
    let Some(sink) = sink else {
        return;
    };
    match std::panic::catch_unwind(AssertUnwindSafe(|| sink.report(&event))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, %event, "progress sink failed"),
        Err(_) => debug!(%event, "progress sink panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn closure_sink_receives_events() {
        let seen = RefCell::new(Vec::new());
        let sink = |event: &ProgressEvent| -> anyhow::Result<()> {
            seen.borrow_mut().push(event.to_string());
            Ok(())
        };
        notify(Some(&sink), ProgressEvent::FilesFound { total: 2 });
        notify(None, ProgressEvent::FilesFound { total: 3 });
        assert_eq!(seen.into_inner(), vec!["files found: 2"]);
    }

    #[test]
    fn failing_sinks_are_ignored() {
        let erroring = |_: &ProgressEvent| -> anyhow::Result<()> { anyhow::bail!("display gone") };
        let panicking = |_: &ProgressEvent| -> anyhow::Result<()> { panic!("ui thread died") };
        let event = ProgressEvent::BatchFinished { processed: 1, failed: 0 };
        notify(Some(&erroring), event.clone());
        notify(Some(&panicking), event);
    }
}
