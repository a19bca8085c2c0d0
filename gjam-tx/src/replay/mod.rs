//! Replay pipeline
//!
//! **Data flow:** SampleSource → ReplayThread (chunk fill) → chunk pool →
//! SampleProcessor (per-tick copy) → radio transmit buffer.
//!
//! **Back-pressure:** the processor raises a `ReadinessSignal` when its
//! buffered data runs low; the replay thread refills every free chunk and
//! clears the request once the pool is full.

pub mod chunk;
pub mod monitor;
pub mod processor;
pub mod signal;
pub mod source;
pub mod thread;

pub use chunk::{chunk_pool, ConsumeSide, FillSide, SampleChunk};
pub use monitor::spawn_underrun_monitor;
pub use processor::{
    Binding, ProcessorHandle, ProcessorMessage, ProcessorSnapshot, ProcessorStats, SampleProcessor,
    TickOutcome,
};
pub use signal::ReadinessSignal;
pub use source::{FileOpener, FileSource, ReaderSource, SampleSource, SourceOpener};
pub use thread::{CompletionCallback, ReplayNotice, ReplayReport, ReplayThread};
