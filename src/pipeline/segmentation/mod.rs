//! External segmentation tool seam.
//!
//! ```text
//! SegmentationClient ─start_instance→ SegmentationInstance
//!     ─load_model / compute_probability→ Pending<T>
//! ```
//!
//! The client is unreliable and has no latency bound, so every request is
//! resolved through a bounded `Pending::wait`.

pub mod command;
pub mod error;
pub mod handle;
pub mod mock;
pub mod traits;

pub use command::ExternalCommandClient;
pub use error::SegmentationError;
pub use handle::{AsyncOperation, HandleState, Pending, Stage};
pub use mock::{ScriptStats, ScriptedBehavior, ScriptedSegmentationClient};
pub use traits::{ReclaimLevel, SegmentationClient, SegmentationInstance};
