use std::borrow::Cow;
use std::rc::Rc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::codec::{ByteSpan, SpanReader};
use crate::codesign::EmbeddedSignature;
use crate::commands::{
    BuildTarget, DyLib, EncryptionInfo, LinkEditData, LoadCommand, MachCommand, Section, VersionTag,
};
use crate::consts::*;
use crate::errors::{MachError, Result};
use crate::fat::{FatArch, FatArchive, FatEntry};

pub trait MachArch {
    const HEADER_SIZE: usize;

    const IS_64BIT: bool;

    fn parse_mach_header<O: ByteOrder>(r: &mut SpanReader) -> Result<MachHeader>;
}

pub enum Arch32 {}
pub enum Arch64 {}

impl MachArch for Arch32 {
    const HEADER_SIZE: usize = MACH_HEADER_SIZE;

    const IS_64BIT: bool = false;

    fn parse_mach_header<O: ByteOrder>(r: &mut SpanReader) -> Result<MachHeader> {
        let header = MachHeader {
            magic: r.read_u32::<O>()?,
            cputype: r.read_i32::<O>()?,
            cpusubtype: r.read_i32::<O>()?,
            filetype: r.read_u32::<O>()?,
            ncmds: r.read_u32::<O>()?,
            sizeofcmds: r.read_u32::<O>()?,
            flags: r.read_u32::<O>()?,
        };

        Ok(header)
    }
}

impl MachArch for Arch64 {
    const HEADER_SIZE: usize = MACH_HEADER_64_SIZE;

    const IS_64BIT: bool = true;

    fn parse_mach_header<O: ByteOrder>(r: &mut SpanReader) -> Result<MachHeader> {
        let header = Arch32::parse_mach_header::<O>(r)?;

        // reserved
        r.skip(4)?;

        Ok(header)
    }
}

/// The mach header appears at the very beginning of the object file.
///
/// `magic` is read in the image's own byte order, so it is always
/// `MH_MAGIC` or `MH_MAGIC_64` for a decoded image.
#[derive(Debug, Default, Clone)]
pub struct MachHeader {
    /// mach magic number identifier
    pub magic: u32,
    /// cpu specifier
    pub cputype: cpu_type_t,
    /// machine specifier
    pub cpusubtype: cpu_subtype_t,
    /// type of file
    pub filetype: u32,
    /// number of load commands
    pub ncmds: u32,
    /// the size of all the load commands
    pub sizeofcmds: u32,
    /// flags
    pub flags: u32,
}

impl MachHeader {
    pub fn is_64bit(&self) -> bool {
        self.magic == MH_MAGIC_64
    }
}

/// The file range of the `__LINKEDIT` segment, as declared by its load command.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkEditSegment {
    pub fileoff: u64,
    pub filesize: u64,
}

/// A decoded thin Mach-O image.
///
/// Everything borrows from the input buffer; the image is read-only once built.
#[derive(Debug, Clone)]
pub struct MachImage<'a> {
    /// the bytes of this image, inside the whole input
    pub span: ByteSpan<'a>,
    pub header: MachHeader,
    pub is_big_endian: bool,
    /// load commands in file order, up to the first malformed one
    pub commands: Vec<MachCommand<'a>>,
    /// every section of every segment, in file order
    pub sections: Vec<Rc<Section>>,
    /// `__LINKEDIT` file range
    pub link_edit: Option<LinkEditSegment>,
    /// the code signature bytes located by `LC_CODE_SIGNATURE`
    pub code_signature: Option<ByteSpan<'a>>,
    pub encryption: Option<EncryptionInfo>,
    /// `__TEXT,__info_plist` bytes
    pub info_plist: Option<ByteSpan<'a>>,
    /// padding between the end of the load commands and the first byte of `__text`
    pub load_commands_free_space: u64,
    /// the error that stopped the load command walk, if any
    pub walk_error: Option<MachError>,
    /// file ranges named by well-formed commands that fall outside the image
    pub range_errors: Vec<MachError>,
}

impl<'a> MachImage<'a> {
    /// Decode the thin image in `span`.
    ///
    /// Only a bad magic, a truncated header or a load command area past the
    /// end of the image fail the whole image. A malformed load command stops
    /// the walk and is kept in `walk_error` with the commands decoded so far.
    /// A well-formed command whose file range lies outside the image keeps its
    /// `OutOfBounds` in `range_errors` and the walk goes on.
    pub fn parse(span: ByteSpan<'a>) -> Result<MachImage<'a>> {
        let magic = span.read_u32::<LittleEndian>("magic", 0)?;

        match magic {
            MH_MAGIC => Self::parse_image::<Arch32, LittleEndian>(span, false),
            MH_CIGAM => Self::parse_image::<Arch32, BigEndian>(span, true),
            MH_MAGIC_64 => Self::parse_image::<Arch64, LittleEndian>(span, false),
            MH_CIGAM_64 => Self::parse_image::<Arch64, BigEndian>(span, true),
            _ => Err(MachError::UnsupportedMagic {
                magic,
                offset: span.offset(),
            }),
        }
    }

    fn parse_image<A: MachArch, O: ByteOrder>(span: ByteSpan<'a>, is_big_endian: bool) -> Result<MachImage<'a>> {
        let mut r = SpanReader::new(span, "mach header");
        let header = A::parse_mach_header::<O>(&mut r)?;

        debug!("parsed mach-o header at 0x{:x}: {:?}", span.offset(), header);

        let commands = span.sub_span("load commands", A::HEADER_SIZE as u64, u64::from(header.sizeofcmds))?;

        let mut image = MachImage {
            span,
            header,
            is_big_endian,
            commands: Vec::new(),
            sections: Vec::new(),
            link_edit: None,
            code_signature: None,
            encryption: None,
            info_plist: None,
            load_commands_free_space: 0,
            walk_error: None,
            range_errors: Vec::new(),
        };

        if let Err(err) = image.walk_commands::<O>(commands) {
            warn!(
                "stop walking load commands after {} of {} commands, {}",
                image.commands.len(),
                image.header.ncmds,
                err
            );

            image.walk_error = Some(err);
        }

        debug!("parsed {} load commands", image.commands.len());

        Ok(image)
    }

    fn walk_commands<O: ByteOrder>(&mut self, area: ByteSpan<'a>) -> Result<()> {
        let mut offset = 0usize;

        for index in 0..self.header.ncmds {
            let remaining = area.len() - offset;
            let malformed = |cmd: u32, reason: String| MachError::MalformedLoadCommand {
                index,
                cmd,
                offset: area.offset() + offset,
                reason,
            };

            if remaining < LOAD_COMMAND_HEADER_SIZE {
                return Err(malformed(
                    0,
                    format!("{} bytes left for the command header", remaining),
                ));
            }

            let cmd = area.read_u32::<O>("load command", offset as u64)?;
            let cmdsize = area.read_u32::<O>("load command", offset as u64 + 4)? as usize;

            if cmdsize < LOAD_COMMAND_HEADER_SIZE {
                return Err(malformed(cmd, format!("cmdsize {} is smaller than the header", cmdsize)));
            }
            if cmdsize > remaining {
                return Err(malformed(
                    cmd,
                    format!("cmdsize {} exceeds the {} bytes left in sizeofcmds", cmdsize, remaining),
                ));
            }

            let span = area.sub_span("load command", offset as u64, cmdsize as u64)?;
            let (command, cmdsize) =
                LoadCommand::parse::<O>(span).map_err(|err| malformed(cmd, err.to_string()))?;

            self.record(&command);
            self.commands.push(MachCommand(command, cmdsize));

            offset += cmdsize;
        }

        if offset != area.len() {
            return Err(MachError::MalformedLoadCommand {
                index: self.header.ncmds,
                cmd: 0,
                offset: area.offset() + offset,
                reason: format!("load commands use {} of {} bytes in sizeofcmds", offset, area.len()),
            });
        }

        Ok(())
    }

    /// Index what the queries need out of one command.
    fn record(&mut self, command: &LoadCommand<'a>) {
        match *command {
            LoadCommand::Segment {
                ref segname,
                fileoff,
                filesize,
                ref sections,
                ..
            }
            | LoadCommand::Segment64 {
                ref segname,
                fileoff,
                filesize,
                ref sections,
                ..
            } => {
                if segname == SEG_LINKEDIT {
                    self.link_edit = Some(LinkEditSegment { fileoff, filesize });
                }

                for section in sections {
                    self.record_section(section);
                    self.sections.push(section.clone());
                }
            }
            LoadCommand::CodeSignature(data) => match self.code_signature_span(data) {
                Ok(span) => {
                    debug!("found code signature at {:?}", span);

                    self.code_signature = Some(span);
                }
                Err(err) => self.range_error(err),
            },
            LoadCommand::EncryptionInfo(info) | LoadCommand::EncryptionInfo64(info) => {
                self.encryption = Some(info);
            }
            _ => {}
        }
    }

    fn range_error(&mut self, err: MachError) {
        warn!("skip out of range data, {}", err);

        self.range_errors.push(err);
    }

    fn code_signature_span(&self, data: LinkEditData) -> Result<ByteSpan<'a>> {
        self.span
            .sub_span("code signature", u64::from(data.off), u64::from(data.size))
    }

    fn record_section(&mut self, section: &Section) {
        if section.segname == SEG_TEXT && section.sectname == SECT_TEXT {
            let commands_end = self.header_size() as u64 + u64::from(self.header.sizeofcmds);

            self.load_commands_free_space = u64::from(section.offset).saturating_sub(commands_end);
        } else if section.sectname == SECT_INFO_PLIST && self.info_plist.is_none() {
            match self
                .span
                .sub_span("info plist", u64::from(section.offset), section.size)
            {
                Ok(span) => self.info_plist = Some(span),
                Err(err) => self.range_error(err),
            }
        }
    }

    pub fn is_64bit(&self) -> bool {
        self.header.is_64bit()
    }

    pub fn header_size(&self) -> usize {
        if self.is_64bit() {
            MACH_HEADER_64_SIZE
        } else {
            MACH_HEADER_SIZE
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.map_or(false, |info| info.is_encrypted())
    }

    pub fn section(&self, segname: &str, sectname: &str) -> Option<&Rc<Section>> {
        self.sections
            .iter()
            .find(|section| section.segname == segname && section.sectname == sectname)
    }

    pub fn dylibs(&self) -> impl Iterator<Item = &DyLib> {
        self.commands.iter().filter_map(|cmd| match cmd.0 {
            LoadCommand::LoadDyLib(ref dylib) => Some(dylib),
            _ => None,
        })
    }

    pub fn weak_dylibs(&self) -> impl Iterator<Item = &DyLib> {
        self.commands.iter().filter_map(|cmd| match cmd.0 {
            LoadCommand::LoadWeakDyLib(ref dylib) => Some(dylib),
            _ => None,
        })
    }

    pub fn rpaths(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|cmd| match cmd.0 {
            LoadCommand::Rpath(ref path) => Some(path.as_str()),
            _ => None,
        })
    }

    /// The minimum iOS version from `LC_VERSION_MIN_IPHONEOS`.
    pub fn min_iphoneos_version(&self) -> Option<VersionTag> {
        self.commands.iter().find_map(|cmd| match cmd.0 {
            LoadCommand::VersionMin {
                target: BuildTarget::IPhoneOs,
                version,
                ..
            } => Some(version),
            _ => None,
        })
    }

    /// The embedded `Info.plist` text, decoded lossily.
    pub fn embedded_info_plist(&self) -> Option<Cow<'a, str>> {
        self.info_plist.map(|span| String::from_utf8_lossy(span.as_bytes()))
    }

    fn code_signature_command(&self) -> Option<LinkEditData> {
        self.commands.iter().find_map(|cmd| match cmd.0 {
            LoadCommand::CodeSignature(data) => Some(data),
            _ => None,
        })
    }

    /// Decode the code signature, if the image has one.
    ///
    /// An `LC_CODE_SIGNATURE` range outside the image gives `OutOfBounds`.
    pub fn signature(&self) -> Option<Result<EmbeddedSignature<'a>>> {
        let data = self.code_signature_command()?;

        Some(self.code_signature_span(data).and_then(EmbeddedSignature::parse))
    }

    /// Collect the facts a `codesign`-like report prints about this image.
    pub fn summary(&self) -> ImageSummary {
        let signature = self.signature().and_then(|res| {
            res.map_err(|err| warn!("fail to decode code signature, {}", err)).ok()
        });
        let code_length = self.code_signature_command().map(|data| data.off);
        let signature_length = signature.as_ref().map(|sig| sig.length);
        let spare_length = match (code_length, signature_length) {
            (Some(code), Some(sig)) => Some(
                (self.span.len() as u64)
                    .saturating_sub(u64::from(code))
                    .saturating_sub(u64::from(sig)),
            ),
            _ => None,
        };

        ImageSummary {
            filetype: self.header.filetype,
            total_size: self.span.len(),
            is_64bit: self.is_64bit(),
            cputype: self.header.cputype,
            cpusubtype: self.header.cpusubtype,
            is_big_endian: self.is_big_endian,
            is_encrypted: self.is_encrypted(),
            ncmds: self.header.ncmds,
            load_commands_free_space: self.load_commands_free_space,
            code_length,
            signature_length,
            spare_length,
            min_iphoneos_version: self.min_iphoneos_version(),
            rpaths: self.rpaths().map(String::from).collect(),
            dylibs: self.dylibs().map(|dylib| dylib.name.to_string()).collect(),
            weak_dylibs: self.weak_dylibs().map(|dylib| dylib.name.to_string()).collect(),
            info_plist: self.embedded_info_plist().map(Cow::into_owned),
        }
    }
}

/// A report of one image, detached from the input buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSummary {
    pub filetype: u32,
    pub total_size: usize,
    pub is_64bit: bool,
    pub cputype: cpu_type_t,
    pub cpusubtype: cpu_subtype_t,
    pub is_big_endian: bool,
    pub is_encrypted: bool,
    pub ncmds: u32,
    pub load_commands_free_space: u64,
    /// bytes before the code signature, its `dataoff`
    pub code_length: Option<u32>,
    /// the SuperBlob length
    pub signature_length: Option<u32>,
    /// bytes after the SuperBlob up to the end of the image
    pub spare_length: Option<u64>,
    pub min_iphoneos_version: Option<VersionTag>,
    pub rpaths: Vec<String>,
    pub dylibs: Vec<String>,
    pub weak_dylibs: Vec<String>,
    pub info_plist: Option<String>,
}

/// A universal or thin file, split and decoded per architecture.
#[derive(Debug)]
pub struct UniversalFile<'a> {
    pub archive: FatArchive<'a>,
    /// one result per archive entry, in archive order
    pub images: Vec<Result<MachImage<'a>>>,
}

impl<'a> UniversalFile<'a> {
    /// Decode every architecture in `buf`.
    ///
    /// Fails only when the container can't be split; a slice that isn't a
    /// valid image keeps its error next to the other images.
    pub fn parse(buf: &'a [u8]) -> Result<UniversalFile<'a>> {
        let archive = FatArchive::split(buf)?;
        let images = archive
            .entries
            .iter()
            .map(|entry| {
                debug!("parsing mach-o image at {:?}, arch={:?}", entry.span, entry.arch);

                MachImage::parse(entry.span)
            })
            .collect();

        Ok(UniversalFile { archive, images })
    }

    pub fn is_fat(&self) -> bool {
        self.archive.is_fat()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FatEntry<'a>, &Result<MachImage<'a>>)> {
        self.archive.entries.iter().zip(self.images.iter())
    }

    /// The decoded image for the first slice of `cputype`.
    pub fn image(&self, cputype: cpu_type_t) -> Option<&Result<MachImage<'a>>> {
        self.iter()
            .find(|(entry, _)| entry.arch.cputype == cputype)
            .map(|(_, image)| image)
    }

    pub fn archs(&self) -> impl Iterator<Item = &FatArch> {
        self.archive.entries.iter().map(|entry| &entry.arch)
    }
}
