pub mod analysis;
pub mod controller;
pub mod sources;

pub use analysis::{
    service_from_settings, AnalysisService, HttpAnalysisService, MockAnalysisService,
};
pub use controller::CapturePipeline;
pub use sources::{Acquisition, FileImageSource, ImagePayload, ImageSource, SourceKind};
