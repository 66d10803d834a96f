use crate::error::ConfigError;
use crate::fill::DEFAULT_CHUNK;
use crate::orchestrator::{Orchestrator, DEFAULT_WORKERS};
use crate::unit::{GenerationMode, ModeGenerator};
use serde::Serialize;

/// Deepest tree accepted from the command line.
pub const MAX_TREE_DEPTH: usize = 64;

pub const DEFAULT_TREE_DEPTH: usize = 3;

/// Everything a generation run needs besides the size list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GenerateConfig {
    pub max_workers: usize,
    pub mode: GenerationMode,
    pub chunk_size: usize,
    pub show_progress: bool,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_WORKERS,
            mode: GenerationMode::default(),
            chunk_size: DEFAULT_CHUNK,
            show_progress: true,
        }
    }
}

impl GenerateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunk);
        }
        if let GenerationMode::Tree { max_depth, .. } = self.mode {
            if max_depth > MAX_TREE_DEPTH {
                return Err(ConfigError::DepthTooLarge(max_depth, MAX_TREE_DEPTH));
            }
        }
        Ok(())
    }

    /// Validated orchestrator over the standard generator.
    pub fn orchestrator(&self) -> Result<Orchestrator<ModeGenerator>, ConfigError> {
        self.validate()?;
        let generator = ModeGenerator::new(self.mode).with_chunk_size(self.chunk_size);
        Ok(Orchestrator::new(generator, self.max_workers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = GenerateConfig::default();
        assert_eq!(cfg.max_workers, 5);
        assert_eq!(cfg.mode, GenerationMode::SingleFile);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        let cfg = GenerateConfig { max_workers: 0, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::NoWorkers)));
        let cfg = GenerateConfig { chunk_size: 0, ..Default::default() };
        assert!(matches!(cfg.orchestrator(), Err(ConfigError::ZeroChunk)));
        let cfg = GenerateConfig {
            mode: GenerationMode::Tree { max_depth: 65, target_files: None },
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::DepthTooLarge(65, 64))));
    }
}
