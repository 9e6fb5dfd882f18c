//! Error taxonomy for the fluid engine
//!
//! Start-up failures are returned once to the caller. Per-frame failures are
//! logged by the engine and swallowed so the host animation loop keeps running.

use crate::targets::TargetId;
use thiserror::Error;

/// Type alias for fluid engine operation results
pub type FluidResult<T> = Result<T, FluidError>;

#[derive(Debug, Error)]
pub enum FluidError {
    /// No graphics context of any supported kind could be obtained.
    #[error("No graphics context available: {reason}")]
    NoGraphicsContext { reason: String },

    #[error("Shader compile failed for '{program}': {message}")]
    ShaderCompile { program: String, message: String },

    #[error("Shader link failed for '{program}': {message}")]
    ShaderLink { program: String, message: String },

    #[error("Unsupported render-target format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Graphics context lost")]
    ContextLost,

    #[error("Surface error: {0}")]
    Surface(String),

    #[error("Invalid simulation config: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    Config(String),

    #[error("Double buffer roles alias the same target {0:?}")]
    TargetAliasing(TargetId),

    #[error("Unknown render target {0:?}")]
    UnknownTarget(TargetId),

    #[error("Readback failed: {0}")]
    Readback(String),

    #[error("Mask error: {0}")]
    Mask(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FluidError {
    /// Whether the error leaves the engine usable for the next frame.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            FluidError::NoGraphicsContext { .. } | FluidError::ContextLost
        )
    }
}

/// Helper trait for wrapping foreign errors with the operation that produced them
pub trait FluidErrorContext<T> {
    fn surface_context(self, operation: &str) -> FluidResult<T>;
    fn config_context(self, operation: &str) -> FluidResult<T>;
}

impl<T, E> FluidErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn surface_context(self, operation: &str) -> FluidResult<T> {
        self.map_err(|e| FluidError::Surface(format!("{}: {}", operation, e)))
    }

    fn config_context(self, operation: &str) -> FluidResult<T> {
        self.map_err(|e| FluidError::Config(format!("{}: {}", operation, e)))
    }
}

/// Create a shader compile error
pub fn shader_compile_error(program: &str, message: impl std::fmt::Display) -> FluidError {
    FluidError::ShaderCompile {
        program: program.to_string(),
        message: message.to_string(),
    }
}

/// Create a shader link error
pub fn shader_link_error(program: &str, message: impl std::fmt::Display) -> FluidError {
    FluidError::ShaderLink {
        program: program.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors_are_not_recoverable() {
        let fatal = FluidError::NoGraphicsContext {
            reason: "no adapter".into(),
        };
        assert!(!fatal.is_recoverable());
        assert!(!FluidError::ContextLost.is_recoverable());
        assert!(shader_compile_error("curl", "bad token").is_recoverable());
    }

    #[test]
    fn test_context_wraps_display() {
        let result: Result<(), &str> = Err("expected `=`");
        let err = result.config_context("parse config.toml").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Config parse error: parse config.toml: expected `=`"
        );
    }
}
