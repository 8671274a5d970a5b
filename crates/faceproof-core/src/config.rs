use serde::Serialize;

/// Per-request pipeline switches. Built once, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PipelineConfig {
    skip_quality_check: bool,
    skip_occlusion_check: bool,
    debug_logging: bool,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Skip the brightness/sharpness/face-presence gate.
    pub fn skip_quality_check(&self) -> bool {
        self.skip_quality_check
    }

    /// Skip the hand/mask occlusion gate.
    pub fn skip_occlusion_check(&self) -> bool {
        self.skip_occlusion_check
    }

    /// Emit per-stage debug diagnostics for this request.
    pub fn debug_logging(&self) -> bool {
        self.debug_logging
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn skip_quality_check(mut self, skip: bool) -> Self {
        self.config.skip_quality_check = skip;
        self
    }

    pub fn skip_occlusion_check(mut self, skip: bool) -> Self {
        self.config.skip_occlusion_check = skip;
        self
    }

    pub fn debug_logging(mut self, enabled: bool) -> Self {
        self.config.debug_logging = enabled;
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_run_every_gate() {
        let config = PipelineConfig::builder().build();
        assert!(!config.skip_quality_check());
        assert!(!config.skip_occlusion_check());
        assert!(!config.debug_logging());
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn flags_are_independent() {
        let config = PipelineConfig::builder()
            .skip_occlusion_check(true)
            .debug_logging(true)
            .build();
        assert!(!config.skip_quality_check());
        assert!(config.skip_occlusion_check());
        assert!(config.debug_logging());
    }
}
