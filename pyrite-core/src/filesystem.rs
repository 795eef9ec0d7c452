//! The virtual-filesystem contract the shader cache, the PSO blob cache and
//! the render-library generator consume. Out of scope to implement a
//! concrete backend; this is the seam.

use crate::error::CoreError;
use bitflags::bitflags;
use std::io::{Read, Seek, Write};

bitflags! {
    pub struct FileOpenMode: u32 {
        const READ   = 0b0001;
        const WRITE  = 0b0010;
        const BINARY = 0b0100;
    }
}

pub trait FsObject: Read + Write + Seek {
    fn size(&self) -> u64;
    fn close(&mut self);
}

pub trait Filesystem {
    type Object: FsObject;

    fn open(&self, path: &str, mode: FileOpenMode) -> Result<Self::Object, CoreError>;
}
