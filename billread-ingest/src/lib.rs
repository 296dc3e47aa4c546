pub mod analyzer;
pub mod config;
pub mod metrics_textfile;
pub mod observability;
pub mod pipeline;
pub mod progress;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use analyzer::{AnalysisError, AnalysisOutcome, AnalysisRequest, Analyzer, RangeRequest, Resolution};
pub use pipeline::{process_file, FileError, IngestSettings, Source};
pub use progress::{ProgressEvent, ProgressSink};
