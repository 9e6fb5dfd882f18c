//! Shader programs
//!
//! WGSL sources are embedded at compile time. Keyword variants are resolved
//! by the preprocessor and compiled lazily through the registry.

pub mod keywords;
pub mod preprocessor;
pub mod program;
pub mod registry;

pub use keywords::ShaderKeywords;
pub use preprocessor::{preprocess_program, PreprocessError, ShaderPreprocessor};
pub use program::{BlendMode, ProgramKind, ProgramOutput};
pub use registry::{ProgramHandle, ShaderRegistry};
