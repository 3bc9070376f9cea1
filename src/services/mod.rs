//! Services around the pipeline: codecs, output formats and progress reporting
//!
//! These keep file and byte handling out of the processor so the pipeline
//! itself only ever sees decoded buffers.

pub mod format;
pub mod io;
pub mod progress;

pub use format::OutputFormatHandler;
pub use io::{detect_image_format, normalize_depth, ImageIOService};
pub use progress::{
    BatchProcessingStats, BatchProgressUpdate, ConsoleProgressReporter, NoOpProgressReporter,
    ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
};
