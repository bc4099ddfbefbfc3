pub mod backend;
pub mod config;
pub mod face;
pub mod model;
pub mod pipeline;
pub mod yunet;

pub use backend::FaceBackend;
pub use config::VisionConfig;
pub use face::Detection;
pub use pipeline::Pipeline;
