use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::codec::ByteSpan;
use crate::consts::*;
use crate::errors::{MachError, Result};

/// One `fat_arch` record, always stored big-endian.
///
/// `offset` and `size` are widened so a thin file larger than 4GB can be
/// described by the implicit entry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FatArch {
    /// cpu specifier (int)
    pub cputype: cpu_type_t,
    /// machine specifier (int)
    pub cpusubtype: cpu_subtype_t,
    /// file offset to this object file
    pub offset: u64,
    /// size of this object file
    pub size: u64,
    /// alignment as a power of 2
    pub align: u32,
}

impl FatArch {
    pub fn arch_name(&self) -> Option<&'static str> {
        get_arch_name(self.cputype)
    }
}

/// A slice of the input holding one thin image.
#[derive(Debug, Clone, Copy)]
pub struct FatEntry<'a> {
    pub arch: FatArch,
    pub span: ByteSpan<'a>,
}

/// The images packed in a universal file, or the single image of a thin file.
#[derive(Debug, Clone)]
pub struct FatArchive<'a> {
    /// the magic as read big-endian, a thin magic for a plain image
    pub magic: u32,
    pub entries: Vec<FatEntry<'a>>,
}

impl<'a> FatArchive<'a> {
    /// Split `buf` into per-architecture slices.
    ///
    /// A thin image yields one entry covering the whole buffer.
    pub fn split(buf: &'a [u8]) -> Result<FatArchive<'a>> {
        let span = ByteSpan::whole(buf);
        let magic = span.read_u32::<BigEndian>("magic", 0)?;

        match magic {
            FAT_MAGIC | FAT_CIGAM => Self::split_fat(span, magic),
            MH_MAGIC | MH_CIGAM | MH_MAGIC_64 | MH_CIGAM_64 => Self::thin(span, magic),
            _ => Err(MachError::UnsupportedMagic { magic, offset: 0 }),
        }
    }

    pub fn is_fat(&self) -> bool {
        self.magic == FAT_MAGIC || self.magic == FAT_CIGAM
    }

    pub fn find(&self, cputype: cpu_type_t) -> Option<&FatEntry<'a>> {
        self.entries.iter().find(|entry| entry.arch.cputype == cputype)
    }

    fn thin(span: ByteSpan<'a>, magic: u32) -> Result<FatArchive<'a>> {
        // a thin magic read big-endian as MH_MAGIC* means a big-endian image
        let (cputype, cpusubtype) = if magic == MH_MAGIC || magic == MH_MAGIC_64 {
            Self::read_cpu::<BigEndian>(span)?
        } else {
            Self::read_cpu::<LittleEndian>(span)?
        };

        let arch = FatArch {
            cputype,
            cpusubtype,
            offset: 0,
            size: span.len() as u64,
            align: 0,
        };

        debug!("thin image with {} bytes, arch={:?}", span.len(), arch);

        Ok(FatArchive {
            magic,
            entries: vec![FatEntry { arch, span }],
        })
    }

    fn read_cpu<O: ByteOrder>(span: ByteSpan) -> Result<(cpu_type_t, cpu_subtype_t)> {
        Ok((
            span.read_u32::<O>("mach header", 4)? as cpu_type_t,
            span.read_u32::<O>("mach header", 8)? as cpu_subtype_t,
        ))
    }

    fn split_fat(span: ByteSpan<'a>, magic: u32) -> Result<FatArchive<'a>> {
        let nfat_arch = span.read_u32::<BigEndian>("fat header", 4)?;
        let table = span.sub_span(
            "fat arch table",
            FAT_HEADER_SIZE as u64,
            u64::from(nfat_arch) * FAT_ARCH_SIZE as u64,
        )?;

        debug!("fat header with {} archs, magic=0x{:08x}", nfat_arch, magic);

        let mut entries: Vec<FatEntry<'a>> = Vec::with_capacity(nfat_arch as usize);

        for i in 0..u64::from(nfat_arch) {
            let base = i * FAT_ARCH_SIZE as u64;
            let arch = FatArch {
                cputype: table.read_u32::<BigEndian>("fat arch", base)? as cpu_type_t,
                cpusubtype: table.read_u32::<BigEndian>("fat arch", base + 4)? as cpu_subtype_t,
                offset: u64::from(table.read_u32::<BigEndian>("fat arch", base + 8)?),
                size: u64::from(table.read_u32::<BigEndian>("fat arch", base + 12)?),
                align: table.read_u32::<BigEndian>("fat arch", base + 16)?,
            };

            if arch.size < 4 {
                return Err(MachError::MalformedArchiveHeader(format!(
                    "arch #{} has {} bytes, too small for a magic",
                    i, arch.size
                )));
            }

            let slice = span.sub_span("fat arch slice", arch.offset, arch.size)?;

            if let Some(other) = entries
                .iter()
                .find(|e| slice.offset() < e.span.end() && e.span.offset() < slice.end())
            {
                return Err(MachError::MalformedArchiveHeader(format!(
                    "arch #{} at {:?} overlaps {:?}",
                    i, slice, other.span
                )));
            }

            debug!("found fat arch #{} at {:?}, arch={:?}", i, slice, arch);

            entries.push(FatEntry { arch, span: slice });
        }

        Ok(FatArchive { magic, entries })
    }
}
