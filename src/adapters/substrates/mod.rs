//! Concrete LLM backend connections (§1 Non-goals: the core treats these as
//! external collaborators; this is the seam's one real implementation).

pub mod http_backend;
pub mod registry;

pub use http_backend::OpenAiCompatibleBackend;
pub use registry::ConfiguredBackendRegistry;
