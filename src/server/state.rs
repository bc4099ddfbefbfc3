use std::time::Instant;

use anyhow::{Context, Result};
use facematch_vision::Pipeline;

use crate::comparator::Comparator;
use crate::config::Config;
use crate::extractor::{Extractor, ExtractorPool};

/// Shared, read-only application state.
pub struct AppState {
    pub config: Config,
    pub comparator: Comparator,
    pub extractors: ExtractorPool,
    pub started: Instant,
}

impl AppState {
    pub fn new(config: Config, extractors: ExtractorPool) -> Result<Self> {
        config.validate()?;
        let comparator = config.comparator()?;
        Ok(Self {
            config,
            comparator,
            extractors,
            started: Instant::now(),
        })
    }

    /// Load `config.workers` ONNX pipelines and wrap them in state.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let extractors = (0..config.workers)
            .map(|i| {
                let pipeline = Pipeline::new(&config.vision)
                    .with_context(|| format!("initializing extraction worker {}", i))?;
                Ok(Extractor::new(Box::new(pipeline))
                    .with_selector(config.face_selection.selector()))
            })
            .collect::<Result<Vec<_>>>()?;
        log::info!(
            "loaded {} extraction worker(s) (selection: {:?})",
            extractors.len(),
            config.face_selection
        );
        Self::new(config, ExtractorPool::new(extractors)?)
    }
}
