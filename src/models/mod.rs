mod run;
mod verdict;

pub use run::{PipelineRun, RunStatus};
pub use verdict::{RawVerdict, TruthLabel, Verdict};
