//! Crate-wide recoverable error types, following the `failure` convention
//! used throughout `rendy-command`, `rendy-factory`, `rendy-frame`,
//! `rendy-memory`, and `rendy-shader`. Fatal conditions (AST pool overflow,
//! missing shader stage, transient-resource pool overflow, device-lost on
//! present) are deliberately *not* representable here — those paths
//! `panic!` at the call site instead of being threaded through a `Result`.

use failure::Fail;

/// Errors surfaced by a `Device` implementation.
#[derive(Debug, Fail)]
pub enum DeviceError {
    #[fail(display = "out of device memory while creating a resource")]
    OutOfMemory,

    #[fail(display = "pipeline state creation failed: {}", _0)]
    PipelineCreation(String),

    #[fail(display = "the device was lost")]
    DeviceLost,

    #[fail(display = "unsupported operation: {}", _0)]
    Unsupported(String),
}

/// Errors that can occur while resolving configuration or filesystem
/// collaborators.
#[derive(Debug, Fail)]
pub enum CoreError {
    #[fail(display = "failed to open '{}': {}", path, reason)]
    FileOpen { path: String, reason: String },

    #[fail(display = "failed to parse configuration: {}", _0)]
    ConfigParse(String),

    #[fail(display = "device error: {}", _0)]
    Device(#[cause] DeviceError),
}

impl From<DeviceError> for CoreError {
    fn from(err: DeviceError) -> Self {
        CoreError::Device(err)
    }
}

/// Errors surfaced by the shader cache and the pipeline-state cache.
/// Kept distinct from `CoreError` since both caches need to
/// distinguish "the backing file is absent" (recoverable — fall back) from
/// "the backing file exists but its contents don't match the documented
/// on-disk layout" (a corrupt-cache condition worth its own variant).
#[derive(Debug, Fail)]
pub enum CacheError {
    #[fail(display = "cache blob '{}' is corrupt: {}", path, reason)]
    CorruptBlob { path: String, reason: String },

    #[fail(display = "filesystem error: {}", _0)]
    Filesystem(#[cause] CoreError),

    #[fail(display = "device error: {}", _0)]
    Device(#[cause] DeviceError),
}

impl From<CoreError> for CacheError {
    fn from(err: CoreError) -> Self {
        CacheError::Filesystem(err)
    }
}

impl From<DeviceError> for CacheError {
    fn from(err: DeviceError) -> Self {
        CacheError::Device(err)
    }
}
