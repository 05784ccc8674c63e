// Stage collaborators
pub mod build;
pub mod engine;
pub mod source;
pub mod test_generation;

// Re-exports
pub use build::{ProjectBuilder, SimulatedBuilder};
pub use engine::{ContainerExecTransport, EngineClient, EngineTransport, HttpEngineTransport};
pub use source::{
    extract_archive, SourceAcquirer, SourceProvider, SourceRef, DEFAULT_MAX_EXTRACTED_BYTES,
};
pub use test_generation::{EvoSuiteClient, TestGenReport, TestGenRequest, TestGenerator};
