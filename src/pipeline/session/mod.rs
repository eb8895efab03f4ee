//! Interactive counting phase.
//!
//! ```text
//! ArtifactStore → CountingSession (+ PeakDetector, Input/Output) → ResultStore
//! ```
//!
//! The host UI is reached only through the `Input` / `Output` traits, so the
//! state machine and the control loop run unchanged against a terminal, a
//! GUI, or a scripted test double.

pub mod driver;
pub mod machine;
pub mod terminal;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use driver::{resume_index, run_analysis, AnalysisSummary};
pub use machine::{CountingSession, LineAnalysis, RegionVerdict, SessionState, Tally};
pub use terminal::{LogOutput, TerminalInput};
pub use traits::{Input, LineResponse, Output, PreviewChoice, PreviewPrompt};
