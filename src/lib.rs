//! Locate and decode the code signature of Mach-O images.
//!
//! The input is an in-memory buffer holding either a thin Mach-O image or a
//! universal (fat) file. Every offset read from the file is checked before use,
//! and all decoded structures borrow from the buffer.
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let buf = std::fs::read("/bin/ls")?;
//! let file = mach_codesign::UniversalFile::parse(&buf)?;
//!
//! for image in file.images.iter().flatten() {
//!     if let Some(signature) = image.signature() {
//!         if let Some(cd) = signature?.code_directory() {
//!             println!("{}", cd.identifier);
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```
#[macro_use]
extern crate log;
#[macro_use]
extern crate bitflags;

mod codec;
mod codesign;
mod commands;
mod consts;
#[cfg(feature = "display")]
mod display;
mod errors;
mod fat;
mod loader;

#[cfg(test)]
mod testdata;

pub use crate::codec::{read_uint, swap16, swap32, swap64, ByteSpan, SpanReader};
pub use crate::codesign::{
    slot_name, Blob, BlobIndex, CodeDirectory, CodeSigningFlags, EmbeddedSignature, ExecSegment, ExecSegmentFlags,
    HashType, SuperBlobKind,
};
pub use crate::commands::{
    BuildTarget, DyLib, EncryptionInfo, LcString, LinkEditData, LoadCommand, MachCommand, Section, SegmentFlags,
    VersionTag,
};
pub use crate::consts::*;
pub use crate::errors::{MachError, Result};
pub use crate::fat::{FatArch, FatArchive, FatEntry};
pub use crate::loader::{Arch32, Arch64, ImageSummary, LinkEditSegment, MachArch, MachHeader, MachImage, UniversalFile};
