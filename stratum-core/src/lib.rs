pub mod cancel;
pub mod cleanup;
pub mod config;
pub mod describe;
pub mod error;
pub mod fill;
pub mod orchestrator;
pub mod package;
pub mod plan;
pub mod progress;
pub mod report;
pub mod size;
pub mod tree;
pub mod unit;

pub use cancel::CancelToken;
pub use cleanup::{create_workdir, CleanupGuard};
pub use config::GenerateConfig;
pub use error::{GenerateError, SizeError, WriteError};
pub use orchestrator::{GenerateReport, Orchestrator, UnitRecord};
pub use progress::ProgressReporter;
pub use unit::{GenerationMode, ModeGenerator, UnitGenerator, UnitJob};
