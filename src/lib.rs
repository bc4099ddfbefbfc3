pub mod comparator;
pub mod config;
pub mod extractor;
pub mod server;

pub use comparator::{Comparator, Comparison, CompareError, FaceEmbedding};
pub use extractor::{Extraction, ExtractError, Extractor, ExtractorPool, FaceSelector};

// Re-export vision types for convenience
pub use facematch_vision::{Detection, FaceBackend, Pipeline, VisionConfig};
