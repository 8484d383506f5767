use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use byteorder::ByteOrder;

use crate::codec::{ByteSpan, SpanReader};
use crate::consts::*;
use crate::errors::{MachError, Result};

/// The encoded version.
///
///  X.Y.Z is encoded in nibbles xxxx.yy.zz
///
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct VersionTag(pub u32);

impl VersionTag {
    pub fn major(self) -> u32 {
        self.0 >> 16
    }

    pub fn minor(self) -> u32 {
        (self.0 >> 8) & 0xFF
    }

    pub fn release(self) -> u32 {
        self.0 & 0xFF
    }
}

impl From<VersionTag> for u32 {
    fn from(tag: VersionTag) -> u32 {
        tag.0
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.release() == 0 {
            write!(f, "{}.{}", self.major(), self.minor())
        } else {
            write!(f, "{}.{}.{}", self.major(), self.minor(), self.release())
        }
    }
}

/// The min OS version on which this binary was built to run.
///
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BuildTarget {
    MacOsX,
    IPhoneOs,
    WatchOs,
    TvOs,
}

impl BuildTarget {
    fn from_cmd(cmd: u32) -> Option<Self> {
        match cmd {
            LC_VERSION_MIN_MACOSX => Some(BuildTarget::MacOsX),
            LC_VERSION_MIN_IPHONEOS => Some(BuildTarget::IPhoneOs),
            LC_VERSION_MIN_WATCHOS => Some(BuildTarget::WatchOs),
            LC_VERSION_MIN_TVOS => Some(BuildTarget::TvOs),
            _ => None,
        }
    }
}

impl From<BuildTarget> for u32 {
    fn from(target: BuildTarget) -> u32 {
        match target {
            BuildTarget::MacOsX => LC_VERSION_MIN_MACOSX,
            BuildTarget::IPhoneOs => LC_VERSION_MIN_IPHONEOS,
            BuildTarget::WatchOs => LC_VERSION_MIN_WATCHOS,
            BuildTarget::TvOs => LC_VERSION_MIN_TVOS,
        }
    }
}

/// A variable length string in a load command is represented by an `LcString` structure.
///
/// The strings are stored just after the load command structure and
/// the offset is from the start of the load command structure.
///
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LcString(pub usize, pub String);

impl LcString {
    pub fn offset(&self) -> usize {
        self.0
    }

    pub fn as_str(&self) -> &str {
        self.1.as_str()
    }
}

impl fmt::Display for LcString {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.1)
    }
}

impl Deref for LcString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.1.as_str()
    }
}

/// Dynamically linked shared libraries are identified by two things.
///
/// The pathname (the name of the library as found for execution), and the
/// compatibility version number.  The pathname must match and the compatibility
/// number in the user of the library must be greater than or equal to the
/// library being used.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DyLib {
    /// library's path name
    pub name: LcString,
    /// library's build time stamp
    pub timestamp: u32,
    /// library's current version number
    pub current_version: VersionTag,
    /// library's compatibility vers number
    pub compatibility_version: VersionTag,
}

/// The `LinkEditData` contains the offsets and sizes of a blob
/// of data in the __LINKEDIT segment.
///
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkEditData {
    /// file offset of data in __LINKEDIT segment
    pub off: u32,
    /// file size of data in __LINKEDIT segment
    pub size: u32,
}

/// The encrypted range of the image, from `LC_ENCRYPTION_INFO(_64)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionInfo {
    /// file offset of encrypted range
    pub cryptoff: u32,
    /// file size of encrypted range
    pub cryptsize: u32,
    /// which enryption system, 0 means not-encrypted yet
    pub cryptid: u32,
}

impl EncryptionInfo {
    pub fn is_encrypted(&self) -> bool {
        self.cryptid >= 1
    }
}

bitflags! {
    pub struct SegmentFlags: u32 {
        const HIGHVM = SG_HIGHVM;
        const FVMLIB = SG_FVMLIB;
        const NORELOC = SG_NORELOC;
        const PROTECTED_VERSION_1 = SG_PROTECTED_VERSION_1;
        const READ_ONLY = SG_READ_ONLY;
    }
}

/// A segment is made up of zero or more sections.
///
/// Only the fields needed to locate the section in the file are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// name of this section
    pub sectname: String,
    /// segment this section goes in
    pub segname: String,
    /// memory address of this section
    pub addr: u64,
    /// size in bytes of this section
    pub size: u64,
    /// file offset of this section
    pub offset: u32,
    /// section alignment (power of 2)
    pub align: u32,
    /// file offset of relocation entries
    pub reloff: u32,
    /// number of relocation entries
    pub nreloc: u32,
    // flags (section type and attributes)
    pub flags: u32,
}

impl Section {
    fn parse_section<O: ByteOrder>(r: &mut SpanReader) -> Result<Section> {
        let section = Section {
            sectname: r.read_fixed_size_string(16)?,
            segname: r.read_fixed_size_string(16)?,
            addr: u64::from(r.read_u32::<O>()?),
            size: u64::from(r.read_u32::<O>()?),
            offset: r.read_u32::<O>()?,
            align: r.read_u32::<O>()?,
            reloff: r.read_u32::<O>()?,
            nreloc: r.read_u32::<O>()?,
            flags: r.read_u32::<O>()?,
        };

        // reserved1, reserved2
        r.skip(8)?;

        Ok(section)
    }

    fn parse_section64<O: ByteOrder>(r: &mut SpanReader) -> Result<Section> {
        let section = Section {
            sectname: r.read_fixed_size_string(16)?,
            segname: r.read_fixed_size_string(16)?,
            addr: r.read_u64::<O>()?,
            size: r.read_u64::<O>()?,
            offset: r.read_u32::<O>()?,
            align: r.read_u32::<O>()?,
            reloff: r.read_u32::<O>()?,
            nreloc: r.read_u32::<O>()?,
            flags: r.read_u32::<O>()?,
        };

        // reserved1, reserved2, reserved3
        r.skip(12)?;

        Ok(section)
    }
}

/// The load commands directly follow the mach header.
///
#[derive(Debug, Clone)]
pub enum LoadCommand<'a> {
    /// The segment load command indicates that a part of this file is to be
    /// mapped into the task's address space.
    ///
    /// If the segment has sections then the section structures directly follow
    /// the segment command and their size is reflected in cmdsize.
    ///
    Segment {
        /// segment name
        segname: String,
        /// memory address of this segment
        vmaddr: u64,
        /// memory size of this segment
        vmsize: u64,
        /// file offset of this segment
        fileoff: u64,
        /// amount to map from the file
        filesize: u64,
        /// maximum VM protection
        maxprot: vm_prot_t,
        /// initial VM protection
        initprot: vm_prot_t,
        /// flags
        flags: SegmentFlags,
        /// sections
        sections: Vec<Rc<Section>>,
    },
    /// The 64-bit segment load command indicates that a part of this file is to be
    /// mapped into a 64-bit task's address space.
    ///
    Segment64 {
        /// segment name
        segname: String,
        /// memory address of this segment
        vmaddr: u64,
        /// memory size of this segment
        vmsize: u64,
        /// file offset of this segment
        fileoff: u64,
        /// amount to map from the file
        filesize: u64,
        /// maximum VM protection
        maxprot: vm_prot_t,
        /// initial VM protection
        initprot: vm_prot_t,
        /// flags
        flags: SegmentFlags,
        /// sections
        sections: Vec<Rc<Section>>,
    },
    /// local of code signature
    CodeSignature(LinkEditData),
    /// encrypted segment information
    EncryptionInfo(EncryptionInfo),
    /// 64-bit encrypted segment information
    EncryptionInfo64(EncryptionInfo),
    /// load a dynamically linked shared library
    LoadDyLib(DyLib),
    /// load a dynamically linked shared library
    /// that is allowed to be missing (all symbols are weak imported).
    LoadWeakDyLib(DyLib),
    /// add a runtime search path for shared libraries
    Rpath(LcString),
    /// The min OS version on which this binary was built to run.
    VersionMin {
        target: BuildTarget,
        version: VersionTag,
        sdk: VersionTag,
    },
    /// Any command we don't interpret, kept with its raw payload.
    Command {
        /// type of load command
        cmd: u32,
        /// the payload following the `(cmd, cmdsize)` header
        payload: ByteSpan<'a>,
    },
}

impl<'a> LoadCommand<'a> {
    /// Parse one load command.
    ///
    /// `span` must cover exactly the command, `cmdsize` bytes starting at its `cmd` field;
    /// reading any field past it fails with `OutOfBounds`.
    pub fn parse<O: ByteOrder>(span: ByteSpan<'a>) -> Result<(LoadCommand<'a>, usize)> {
        let mut r = SpanReader::new(span, "load command");
        let cmd = r.read_u32::<O>()?;
        let cmdsize = r.read_u32::<O>()? as usize;

        if cmdsize < LOAD_COMMAND_HEADER_SIZE || cmdsize > span.len() {
            return Err(MachError::OutOfBounds {
                what: "load command",
                offset: span.offset() as u64,
                size: cmdsize as u64,
                limit: span.end() as u64,
            });
        }

        let span = span.sub_span("load command", 0, cmdsize as u64)?;
        let mut r = SpanReader::new(span, LoadCommand::cmd_name(cmd));

        r.skip(LOAD_COMMAND_HEADER_SIZE)?;

        let command = match cmd {
            LC_SEGMENT => {
                let segname = r.read_fixed_size_string(16)?;
                let vmaddr = u64::from(r.read_u32::<O>()?);
                let vmsize = u64::from(r.read_u32::<O>()?);
                let fileoff = u64::from(r.read_u32::<O>()?);
                let filesize = u64::from(r.read_u32::<O>()?);
                let maxprot = r.read_i32::<O>()?;
                let initprot = r.read_i32::<O>()?;
                let nsects = r.read_u32::<O>()?;
                let flags = r.read_u32::<O>()?;
                let sections = Self::read_sections(&mut r, nsects, SECTION_SIZE, Section::parse_section::<O>)?;

                LoadCommand::Segment {
                    segname,
                    vmaddr,
                    vmsize,
                    fileoff,
                    filesize,
                    maxprot,
                    initprot,
                    flags: SegmentFlags::from_bits_truncate(flags),
                    sections,
                }
            }
            LC_SEGMENT_64 => {
                let segname = r.read_fixed_size_string(16)?;
                let vmaddr = r.read_u64::<O>()?;
                let vmsize = r.read_u64::<O>()?;
                let fileoff = r.read_u64::<O>()?;
                let filesize = r.read_u64::<O>()?;
                let maxprot = r.read_i32::<O>()?;
                let initprot = r.read_i32::<O>()?;
                let nsects = r.read_u32::<O>()?;
                let flags = r.read_u32::<O>()?;
                let sections = Self::read_sections(&mut r, nsects, SECTION_64_SIZE, Section::parse_section64::<O>)?;

                LoadCommand::Segment64 {
                    segname,
                    vmaddr,
                    vmsize,
                    fileoff,
                    filesize,
                    maxprot,
                    initprot,
                    flags: SegmentFlags::from_bits_truncate(flags),
                    sections,
                }
            }
            LC_CODE_SIGNATURE => LoadCommand::CodeSignature(Self::read_linkedit_data::<O>(&mut r)?),
            LC_ENCRYPTION_INFO => LoadCommand::EncryptionInfo(Self::read_encryption_info::<O>(&mut r)?),
            LC_ENCRYPTION_INFO_64 => LoadCommand::EncryptionInfo64(Self::read_encryption_info::<O>(&mut r)?),
            LC_LOAD_DYLIB => LoadCommand::LoadDyLib(Self::read_dylib::<O>(&mut r)?),
            LC_LOAD_WEAK_DYLIB => LoadCommand::LoadWeakDyLib(Self::read_dylib::<O>(&mut r)?),
            LC_RPATH => LoadCommand::Rpath(Self::read_lc_string::<O>(&mut r, "rpath")?),
            LC_VERSION_MIN_MACOSX | LC_VERSION_MIN_IPHONEOS | LC_VERSION_MIN_WATCHOS | LC_VERSION_MIN_TVOS => {
                LoadCommand::VersionMin {
                    target: BuildTarget::from_cmd(cmd).unwrap_or(BuildTarget::MacOsX),
                    version: VersionTag(r.read_u32::<O>()?),
                    sdk: VersionTag(r.read_u32::<O>()?),
                }
            }
            _ => {
                let payload = span.tail("load command payload", LOAD_COMMAND_HEADER_SIZE as u64)?;

                debug!(
                    "load unsupported {} command (0x{:x}) with {} bytes payload",
                    LoadCommand::cmd_name(cmd),
                    cmd,
                    payload.len()
                );

                LoadCommand::Command { cmd, payload }
            }
        };

        trace!(
            "parsed {} command at 0x{:x} with {} bytes: {:?}",
            command.name(),
            span.offset(),
            cmdsize,
            command
        );

        Ok((command, cmdsize))
    }

    fn read_sections<F>(r: &mut SpanReader, nsects: u32, size: usize, parse: F) -> Result<Vec<Rc<Section>>>
    where
        F: Fn(&mut SpanReader) -> Result<Section>,
    {
        let total = u64::from(nsects) * size as u64;

        if total > r.remaining() as u64 {
            return Err(MachError::OutOfBounds {
                what: "sections",
                offset: (r.span().offset() + r.position()) as u64,
                size: total,
                limit: r.span().end() as u64,
            });
        }

        let mut sections = Vec::with_capacity(nsects as usize);

        for _ in 0..nsects {
            sections.push(Rc::new(parse(r)?));
        }

        Ok(sections)
    }

    fn read_lc_string<O: ByteOrder>(r: &mut SpanReader<'a>, what: &'static str) -> Result<LcString> {
        let off = r.read_u32::<O>()? as usize;

        if off < r.position() {
            return Err(MachError::OutOfBounds {
                what,
                offset: (r.span().offset() + off) as u64,
                size: 1,
                limit: r.span().end() as u64,
            });
        }

        Ok(LcString(off, r.span().read_cstr(what, off as u64)?.to_owned()))
    }

    fn read_dylib<O: ByteOrder>(r: &mut SpanReader<'a>) -> Result<DyLib> {
        let off = r.read_u32::<O>()? as usize;
        let timestamp = r.read_u32::<O>()?;
        let current_version = r.read_u32::<O>()?;
        let compatibility_version = r.read_u32::<O>()?;

        if off < r.position() {
            return Err(MachError::OutOfBounds {
                what: "dylib name",
                offset: (r.span().offset() + off) as u64,
                size: 1,
                limit: r.span().end() as u64,
            });
        }

        Ok(DyLib {
            name: LcString(off, r.span().read_cstr("dylib name", off as u64)?.to_owned()),
            timestamp,
            current_version: VersionTag(current_version),
            compatibility_version: VersionTag(compatibility_version),
        })
    }

    fn read_linkedit_data<O: ByteOrder>(r: &mut SpanReader) -> Result<LinkEditData> {
        Ok(LinkEditData {
            off: r.read_u32::<O>()?,
            size: r.read_u32::<O>()?,
        })
    }

    fn read_encryption_info<O: ByteOrder>(r: &mut SpanReader) -> Result<EncryptionInfo> {
        Ok(EncryptionInfo {
            cryptoff: r.read_u32::<O>()?,
            cryptsize: r.read_u32::<O>()?,
            cryptid: r.read_u32::<O>()?,
        })
    }

    pub fn cmd(&self) -> u32 {
        match *self {
            LoadCommand::Segment { .. } => LC_SEGMENT,
            LoadCommand::Segment64 { .. } => LC_SEGMENT_64,
            LoadCommand::CodeSignature(_) => LC_CODE_SIGNATURE,
            LoadCommand::EncryptionInfo(_) => LC_ENCRYPTION_INFO,
            LoadCommand::EncryptionInfo64(_) => LC_ENCRYPTION_INFO_64,
            LoadCommand::LoadDyLib(_) => LC_LOAD_DYLIB,
            LoadCommand::LoadWeakDyLib(_) => LC_LOAD_WEAK_DYLIB,
            LoadCommand::Rpath(_) => LC_RPATH,
            LoadCommand::VersionMin { target, .. } => target.into(),
            LoadCommand::Command { cmd, .. } => cmd,
        }
    }

    pub fn name(&self) -> &'static str {
        Self::cmd_name(self.cmd())
    }

    pub fn cmd_name(cmd: u32) -> &'static str {
        match cmd {
            LC_SEGMENT => "LC_SEGMENT",
            LC_SYMTAB => "LC_SYMTAB",
            LC_UNIXTHREAD => "LC_UNIXTHREAD",
            LC_DYSYMTAB => "LC_DYSYMTAB",
            LC_LOAD_DYLIB => "LC_LOAD_DYLIB",
            LC_ID_DYLIB => "LC_ID_DYLIB",
            LC_LOAD_DYLINKER => "LC_LOAD_DYLINKER",
            LC_LOAD_WEAK_DYLIB => "LC_LOAD_WEAK_DYLIB",
            LC_SEGMENT_64 => "LC_SEGMENT_64",
            LC_UUID => "LC_UUID",
            LC_RPATH => "LC_RPATH",
            LC_CODE_SIGNATURE => "LC_CODE_SIGNATURE",
            LC_SEGMENT_SPLIT_INFO => "LC_SEGMENT_SPLIT_INFO",
            LC_REEXPORT_DYLIB => "LC_REEXPORT_DYLIB",
            LC_ENCRYPTION_INFO => "LC_ENCRYPTION_INFO",
            LC_DYLD_INFO => "LC_DYLD_INFO",
            LC_DYLD_INFO_ONLY => "LC_DYLD_INFO_ONLY",
            LC_VERSION_MIN_MACOSX => "LC_VERSION_MIN_MACOSX",
            LC_VERSION_MIN_IPHONEOS => "LC_VERSION_MIN_IPHONEOS",
            LC_FUNCTION_STARTS => "LC_FUNCTION_STARTS",
            LC_MAIN => "LC_MAIN",
            LC_DATA_IN_CODE => "LC_DATA_IN_CODE",
            LC_SOURCE_VERSION => "LC_SOURCE_VERSION",
            LC_DYLIB_CODE_SIGN_DRS => "LC_DYLIB_CODE_SIGN_DRS",
            LC_ENCRYPTION_INFO_64 => "LC_ENCRYPTION_INFO_64",
            LC_VERSION_MIN_TVOS => "LC_VERSION_MIN_TVOS",
            LC_VERSION_MIN_WATCHOS => "LC_VERSION_MIN_WATCHOS",
            LC_BUILD_VERSION => "LC_BUILD_VERSION",
            _ => "LC_COMMAND",
        }
    }
}

/// A parsed load command with its declared `cmdsize`.
#[derive(Debug, Clone)]
pub struct MachCommand<'a>(pub LoadCommand<'a>, pub usize);

impl<'a> MachCommand<'a> {
    pub fn command(&self) -> &LoadCommand<'a> {
        &self.0
    }

    pub fn cmd(&self) -> u32 {
        self.0.cmd()
    }

    pub fn cmdsize(&self) -> usize {
        self.1
    }
}
