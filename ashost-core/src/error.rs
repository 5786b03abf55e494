//! Error types for the host bridge

use crate::loader::LoadError;
use crate::rtti::ElementKind;
use thiserror::Error;

/// A guest export the bridge needs but the module does not provide.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Capability {
    Memory,
    Table,
    Allocator,
    Pin,
    Unpin,
    Collector,
    Rtti,
}

impl Capability {
    /// Export name that would provide this capability.
    pub fn export_name(self) -> &'static str {
        use crate::abi::guest_exports as e;
        match self {
            Capability::Memory => e::MEMORY,
            Capability::Table => e::TABLE,
            Capability::Allocator => e::NEW,
            Capability::Pin => e::PIN,
            Capability::Unpin => e::UNPIN,
            Capability::Collector => e::COLLECT,
            Capability::Rtti => e::RTTI_BASE,
        }
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Capability::Table => write!(f, "an exported function table (`table`)"),
            Capability::Memory => write!(f, "a linear memory (`memory`)"),
            other => write!(f, "the runtime export `{}`", other.export_name()),
        }
    }
}

/// Errors raised by the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Type id outside the declared RTTI range
    #[error("invalid id: {id}")]
    InvalidId { id: u32 },

    /// Header id differs from the id the read operation expects
    #[error("type mismatch at {ptr:#x}: expected id {expected}, found {found}")]
    TypeMismatch { ptr: u32, expected: u32, found: u32 },

    /// RTTI flags carry no array kind
    #[error("not an array: {id}, flags={flags}")]
    NotAnArray { id: u32, flags: u32 },

    /// The module was built without a required export
    #[error("operation requires {0}")]
    Unsupported(Capability),

    /// No typed view exists for this element alignment
    #[error("unsupported align: {align}")]
    UnsupportedAlignment { align: i32 },

    /// Host element type does not match the layout declared for `id`
    #[error("element type mismatch for id {id}: layout holds {expected:?}")]
    ElementMismatch { id: u32, expected: ElementKind },

    /// Access past the end of linear memory
    #[error("out of bounds access at {ptr:#x} (+{len} bytes)")]
    OutOfBounds { ptr: u64, len: u64 },

    /// The guest called `env.abort`
    #[error("abort: {message} at {file}:{line}:{column}")]
    Abort {
        message: String,
        file: String,
        line: u32,
        column: u32,
    },

    /// No export at this path
    #[error("unknown export: {path}")]
    UnknownExport { path: String },

    /// The export exists but is not a function
    #[error("export is not callable: {path}")]
    NotCallable { path: String },

    /// Class has no such method or property
    #[error("class {class} has no member `{member}`")]
    UnknownMember { class: String, member: String },

    /// Property half missing (getter-only or setter-only)
    #[error("property `{name}` has no {accessor}")]
    MissingAccessor { name: String, accessor: &'static str },

    /// A call returned something other than the expected single value
    #[error("unexpected result from `{path}`")]
    UnexpectedResult { path: String },

    /// More arguments than the export declares
    #[error("expected at most {expected} arguments, got {supplied}")]
    Arity { expected: usize, supplied: usize },

    /// An omitted parameter of a type that has no zero value to pad with
    #[error("cannot omit a parameter of type {ty}")]
    UnsupportedParameter { ty: String },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("failed to read module source: {0}")]
    Io(#[from] std::io::Error),

    /// Compile, instantiate and trap errors from the engine
    #[error(transparent)]
    Wasm(#[from] anyhow::Error),
}

impl BridgeError {
    /// Recover a bridge error raised inside a host import (e.g. `abort`),
    /// otherwise keep the engine error as-is.
    pub(crate) fn from_call(err: anyhow::Error) -> Self {
        match err.downcast::<BridgeError>() {
            Ok(bridge) => bridge,
            Err(other) => BridgeError::Wasm(other),
        }
    }
}

pub type Result<T, E = BridgeError> = core::result::Result<T, E>;
