//! Renderer error types

use std::panic::Location;

use tessera_paint::TextureId;
use tessera_text::TextError;
use thiserror::Error;

use crate::shader::ShaderKind;
use crate::vertex::PrimitiveMode;

/// Error reported by a render backend call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// No frame is in progress
    #[error("No frame in progress")]
    NoFrame,

    /// The GPU device was lost
    #[error("Device lost")]
    DeviceLost,

    /// Out of GPU memory
    #[error("Out of memory")]
    OutOfMemory,

    /// The backend rejected the call
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The backend lacks a required capability
    #[error("Unsupported: {0}")]
    Unsupported(&'static str),

    /// A texture handle the backend does not know about
    #[error("Unknown texture {0:?}")]
    UnknownTexture(TextureId),

    /// Failure injected by a test backend
    #[error("Simulated failure of `{0}`")]
    Simulated(&'static str),
}

/// Rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    /// A backend call failed; `location` is where it was issued
    #[error("Backend call `{call}` failed at {location}: {source}")]
    Backend {
        call: &'static str,
        location: String,
        #[source]
        source: BackendError,
    },

    /// A reservation hint asked for more vertices than the array can ever hold
    #[error("Not enough room in vertex array: requested {requested}, capacity {capacity}")]
    NotEnoughRoom { requested: usize, capacity: usize },

    /// A draw span exceeds the buffered vertices
    #[error("Invalid draw count: {count} vertices from {first} with {size} buffered")]
    InvalidDrawCount {
        first: usize,
        count: usize,
        size: usize,
    },

    /// A texture barrier draw was requested for an incompatible primitive mode
    #[error("Cannot use texture barrier with {mode:?}")]
    CannotUseBarrier { mode: PrimitiveMode },

    /// A shader program failed to compile or link
    #[error("Shader program {program:?} failed: {message}")]
    ShaderProgram { program: ShaderKind, message: String },

    /// A shader program has no variable of that name
    #[error("Shader program {program:?} has no variable `{name}`")]
    VariableNotFound {
        program: ShaderKind,
        name: &'static str,
    },

    /// Stencil clipping nested deeper than the stencil buffer can count
    #[error("Clip depth {depth} exceeds the stencil range")]
    ClipDepthExceeded { depth: usize },

    #[error(transparent)]
    Text(#[from] TextError),
}

/// Result type for rendering operations
pub type Result<T> = std::result::Result<T, RenderError>;

/// Turns backend results into [`RenderError::Backend`] tagged with the call site
pub trait Checked<T> {
    fn checked(self, call: &'static str) -> Result<T>;
}

impl<T> Checked<T> for std::result::Result<T, BackendError> {
    #[track_caller]
    fn checked(self, call: &'static str) -> Result<T> {
        let location = Location::caller();
        self.map_err(|source| RenderError::Backend {
            call,
            location: location.to_string(),
            source,
        })
    }
}
