//! Shared vocabulary for the render-library compiler and the frame graph:
//! opaque handles, the Murmur3 hashing used for shader/pipeline digests, the
//! `Device`/`CommandList`/`Filesystem` contracts the core consumes, engine
//! configuration, and the crate-wide error types.

pub mod config;
pub mod device;
pub mod error;
pub mod filesystem;
pub mod handle;
pub mod hash;

pub use config::EngineConfig;
pub use device::{CommandList, Device, ImageViewFlags};
pub use error::{CacheError, CoreError, DeviceError};
pub use filesystem::{FileOpenMode, Filesystem, FsObject};
pub use handle::Handle;
pub use hash::{murmur3_x64_128, string_hash32, Hash128};
