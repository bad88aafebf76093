use crate::config::{Config, ErrorPolicy};

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub error_policy: ErrorPolicy,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            error_policy: config.pipeline.error_policy,
        }
    }
}
