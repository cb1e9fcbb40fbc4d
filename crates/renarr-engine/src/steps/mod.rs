//! Step implementations.

mod analyze;
mod compose;
mod narration;
mod process_segments;
mod segments_create;

pub use analyze::AnalyzeVideoStep;
pub use compose::ComposeFinalStep;
pub use narration::OptimizeNarrationStep;
pub use process_segments::ProcessSegmentsStep;
pub use segments_create::CreateSegmentsStep;
