//! Synthetic fixtures for the unit tests.
//!
//! Load commands and images are assembled field by field in either byte
//! order, code signing blobs are always big-endian.

use crate::consts::*;

pub const LC_CODE_SIGNATURE_DATA: [u8; 16] = [
    0x1d, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0xf0, 0x01, 0x00, 0x00, 0x30, 0x01, 0x00, 0x00,
];

pub const LC_ENCRYPTION_INFO_64_DATA: [u8; 24] = [
    0x2c, 0x00, 0x00, 0x00, 0x18, 0x00, 0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x01, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// min iOS 9.0, sdk 12.1.2
pub const LC_VERSION_MIN_IPHONEOS_DATA: [u8; 16] = [
    0x25, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x09, 0x00, 0x02, 0x01, 0x0c, 0x00,
];

pub const LC_UUID_DATA: [u8; 24] = [
    0x1b, 0x00, 0x00, 0x00, 0x18, 0x00, 0x00, 0x00, 0x92, 0xe3, 0xcf, 0x1f, 0x20, 0xc3, 0x34, 0x6d, 0x91, 0x6e,
    0x8a, 0x2e, 0x3e, 0x0b, 0x30, 0xca,
];

pub struct Writer {
    pub buf: Vec<u8>,
    big_endian: bool,
}

impl Writer {
    pub fn new(big_endian: bool) -> Writer {
        Writer {
            buf: Vec::new(),
            big_endian,
        }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        if self.big_endian {
            self.buf.extend_from_slice(&v.to_be_bytes());
        } else {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        if self.big_endian {
            self.buf.extend_from_slice(&v.to_be_bytes());
        } else {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    pub fn fixed_str(&mut self, s: &str, len: usize) -> &mut Self {
        let mut field = vec![0u8; len];

        field[..s.len()].copy_from_slice(s.as_bytes());

        self.bytes(&field)
    }

    pub fn cstr(&mut self, s: &str) -> &mut Self {
        self.bytes(s.as_bytes()).u8(0)
    }

    pub fn align(&mut self, n: usize) -> &mut Self {
        while self.buf.len() % n != 0 {
            self.buf.push(0);
        }
        self
    }

    pub fn pad_to(&mut self, len: usize) -> &mut Self {
        if self.buf.len() < len {
            self.buf.resize(len, 0);
        }
        self
    }

    /// Patch a u32 at `offset` in the writer's byte order.
    pub fn patch_u32(&mut self, offset: usize, v: u32) -> &mut Self {
        let bytes = if self.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        };

        self.buf[offset..offset + 4].copy_from_slice(&bytes);
        self
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// `(segname, sectname, offset, size)`
pub type SectionSpec<'a> = (&'a str, &'a str, u32, u64);

pub fn segment_64(big_endian: bool, segname: &str, fileoff: u64, filesize: u64, sections: &[SectionSpec]) -> Vec<u8> {
    let mut w = Writer::new(big_endian);

    w.u32(LC_SEGMENT_64)
        .u32((SEGMENT_COMMAND_64_SIZE + sections.len() * SECTION_64_SIZE) as u32)
        .fixed_str(segname, 16)
        .u64(fileoff)
        .u64(filesize)
        .u64(fileoff)
        .u64(filesize)
        .u32(7)
        .u32(5)
        .u32(sections.len() as u32)
        .u32(0);

    for &(seg, sect, offset, size) in sections {
        w.fixed_str(sect, 16)
            .fixed_str(seg, 16)
            .u64(u64::from(offset))
            .u64(size)
            .u32(offset)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0);
    }

    w.into_vec()
}

pub fn segment_32(big_endian: bool, segname: &str, fileoff: u32, filesize: u32, sections: &[SectionSpec]) -> Vec<u8> {
    let mut w = Writer::new(big_endian);

    w.u32(LC_SEGMENT)
        .u32((SEGMENT_COMMAND_SIZE + sections.len() * SECTION_SIZE) as u32)
        .fixed_str(segname, 16)
        .u32(fileoff)
        .u32(filesize)
        .u32(fileoff)
        .u32(filesize)
        .u32(7)
        .u32(5)
        .u32(sections.len() as u32)
        .u32(0);

    for &(seg, sect, offset, size) in sections {
        w.fixed_str(sect, 16)
            .fixed_str(seg, 16)
            .u32(offset)
            .u32(size as u32)
            .u32(offset)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0);
    }

    w.into_vec()
}

pub fn linkedit_data(big_endian: bool, cmd: u32, off: u32, size: u32) -> Vec<u8> {
    let mut w = Writer::new(big_endian);

    w.u32(cmd).u32(16).u32(off).u32(size);
    w.into_vec()
}

pub fn encryption_info(big_endian: bool, is_64bit: bool, off: u32, size: u32, id: u32) -> Vec<u8> {
    let mut w = Writer::new(big_endian);

    if is_64bit {
        w.u32(LC_ENCRYPTION_INFO_64).u32(24).u32(off).u32(size).u32(id).u32(0);
    } else {
        w.u32(LC_ENCRYPTION_INFO).u32(20).u32(off).u32(size).u32(id);
    }

    w.into_vec()
}

pub fn dylib(big_endian: bool, cmd: u32, name: &str) -> Vec<u8> {
    let mut w = Writer::new(big_endian);

    w.u32(cmd)
        .u32(0)
        .u32(24)
        .u32(2)
        .u32(0x04ca_0a01)
        .u32(0x0001_0000)
        .cstr(name)
        .align(8);

    let cmdsize = w.buf.len() as u32;

    w.patch_u32(4, cmdsize);
    w.into_vec()
}

pub fn rpath(big_endian: bool, path: &str) -> Vec<u8> {
    let mut w = Writer::new(big_endian);

    w.u32(LC_RPATH).u32(0).u32(12).cstr(path).align(8);

    let cmdsize = w.buf.len() as u32;

    w.patch_u32(4, cmdsize);
    w.into_vec()
}

pub fn version_min(big_endian: bool, cmd: u32, version: u32, sdk: u32) -> Vec<u8> {
    let mut w = Writer::new(big_endian);

    w.u32(cmd).u32(16).u32(version).u32(sdk);
    w.into_vec()
}

/// Assemble a thin image from a header, the load commands and the file content
/// placed at fixed offsets.
pub fn mach_image(big_endian: bool, is_64bit: bool, cmds: &[Vec<u8>], content: &[(usize, &[u8])]) -> Vec<u8> {
    let mut w = Writer::new(big_endian);
    let sizeofcmds: usize = cmds.iter().map(|cmd| cmd.len()).sum();

    if is_64bit {
        w.u32(MH_MAGIC_64).u32(CPU_TYPE_ARM64 as u32).u32(0);
    } else {
        w.u32(MH_MAGIC).u32(CPU_TYPE_ARM as u32).u32(9);
    }

    w.u32(MH_EXECUTE).u32(cmds.len() as u32).u32(sizeofcmds as u32).u32(0x0020_0085);

    if is_64bit {
        w.u32(0);
    }

    for cmd in cmds {
        w.bytes(cmd);
    }

    for &(offset, data) in content {
        w.pad_to(offset + data.len());
        w.buf[offset..offset + data.len()].copy_from_slice(data);
    }

    w.into_vec()
}

/// A 0x2000 byte executable with `__TEXT,__text` at 0x400 and the signature
/// bytes at 0x1000, while `LC_CODE_SIGNATURE` claims `dataoff`.
pub fn signed_image(big_endian: bool, is_64bit: bool, signature: &[u8], dataoff: u32) -> Vec<u8> {
    let sections = [(SEG_TEXT, SECT_TEXT, 0x400, 0x100)];
    let (text, linkedit) = if is_64bit {
        (
            segment_64(big_endian, SEG_TEXT, 0, 0x1000, &sections),
            segment_64(big_endian, SEG_LINKEDIT, 0x1000, 0x1000, &[]),
        )
    } else {
        (
            segment_32(big_endian, SEG_TEXT, 0, 0x1000, &sections),
            segment_32(big_endian, SEG_LINKEDIT, 0x1000, 0x1000, &[]),
        )
    };

    mach_image(
        big_endian,
        is_64bit,
        &[
            text,
            linkedit,
            dylib(big_endian, LC_LOAD_DYLIB, "/usr/lib/libSystem.B.dylib"),
            linkedit_data(big_endian, LC_CODE_SIGNATURE, dataoff, signature.len() as u32),
        ],
        &[(0x1000, signature), (0x1fff, &[0u8][..])],
    )
}

/// Pack thin images into a fat file, each slice aligned to 0x4000.
pub fn fat_file(images: &[(cpu_type_t, &[u8])]) -> Vec<u8> {
    let mut w = Writer::new(true);
    let aligned = |len: usize| (len + 0x3fff) & !0x3fff;
    let mut offset = 0x4000;

    w.u32(FAT_MAGIC).u32(images.len() as u32);

    for &(cputype, image) in images {
        w.u32(cputype as u32).u32(0).u32(offset as u32).u32(image.len() as u32).u32(14);
        offset += aligned(image.len());
    }

    let mut offset = 0x4000;

    for &(_, image) in images {
        w.pad_to(offset).bytes(image);
        offset += aligned(image.len());
    }

    w.into_vec()
}

pub fn blob(magic: u32, payload: &[u8]) -> Vec<u8> {
    let mut w = Writer::new(true);

    w.u32(magic).u32((BLOB_HEADER_SIZE + payload.len()) as u32).bytes(payload);
    w.into_vec()
}

pub fn super_blob(magic: u32, blobs: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut w = Writer::new(true);
    let index_end = SUPERBLOB_HEADER_SIZE + blobs.len() * BLOB_INDEX_SIZE;
    let length = index_end + blobs.iter().map(|(_, b)| b.len()).sum::<usize>();

    w.u32(magic).u32(length as u32).u32(blobs.len() as u32);

    let mut offset = index_end;

    for (slot, b) in blobs {
        w.u32(*slot).u32(offset as u32);
        offset += b.len();
    }

    for (_, b) in blobs {
        w.bytes(b);
    }

    w.into_vec()
}

/// Knobs for a synthetic CodeDirectory.
///
/// Special slot `i` is filled with `0xa0 + i` unless listed in `empty_special_slots`,
/// code slot `i` is filled with `i + 1`.
#[derive(Debug, Clone)]
pub struct CodeDirectorySpec {
    pub version: u32,
    pub flags: u32,
    pub hash_type: u8,
    pub hash_size: u8,
    pub page_size: u8,
    pub platform: u8,
    pub n_special_slots: u32,
    pub n_code_slots: u32,
    pub code_limit: u32,
    pub code_limit_64: u64,
    pub exec_seg: (u64, u64, u64),
    pub identifier: &'static str,
    pub team_id: Option<&'static str>,
    pub empty_special_slots: Vec<u32>,
}

impl Default for CodeDirectorySpec {
    fn default() -> Self {
        CodeDirectorySpec {
            version: CS_SUPPORTSEXECSEG,
            flags: CS_ADHOC,
            hash_type: CS_HASHTYPE_SHA256,
            hash_size: CS_SHA256_LEN as u8,
            page_size: 12,
            platform: 0,
            n_special_slots: 2,
            n_code_slots: 3,
            code_limit: 0x3000,
            code_limit_64: 0,
            exec_seg: (0, 0x4000, CS_EXECSEG_MAIN_BINARY),
            identifier: "com.example.hello",
            team_id: Some("ABCDE12345"),
            empty_special_slots: vec![],
        }
    }
}

impl CodeDirectorySpec {
    pub fn header_size(&self) -> usize {
        if self.version >= CS_SUPPORTSEXECSEG {
            CODEDIRECTORY_EXECSEG_SIZE
        } else if self.version >= CS_SUPPORTSCODELIMIT64 {
            CODEDIRECTORY_CODELIMIT64_SIZE
        } else if self.version >= CS_SUPPORTSTEAMID {
            CODEDIRECTORY_TEAMID_SIZE
        } else if self.version >= CS_SUPPORTSSCATTER {
            CODEDIRECTORY_SCATTER_SIZE
        } else {
            CODEDIRECTORY_BASE_SIZE
        }
    }

    /// Offset of the identifier, right after the versioned header.
    pub fn ident_offset(&self) -> usize {
        self.header_size()
    }

    pub fn team_offset(&self) -> usize {
        self.ident_offset() + self.identifier.len() + 1
    }

    pub fn hash_offset(&self) -> usize {
        let strings_end = match self.team_id {
            Some(team) if self.version >= CS_SUPPORTSTEAMID => self.team_offset() + team.len() + 1,
            _ => self.team_offset(),
        };

        strings_end + self.n_special_slots as usize * self.hash_size as usize
    }

    pub fn build(&self) -> Vec<u8> {
        let hash_size = self.hash_size as usize;
        let length = self.hash_offset() + self.n_code_slots as usize * hash_size;
        let mut w = Writer::new(true);

        w.u32(CSMAGIC_CODEDIRECTORY)
            .u32(length as u32)
            .u32(self.version)
            .u32(self.flags)
            .u32(self.hash_offset() as u32)
            .u32(self.ident_offset() as u32)
            .u32(self.n_special_slots)
            .u32(self.n_code_slots)
            .u32(self.code_limit)
            .u8(self.hash_size)
            .u8(self.hash_type)
            .u8(self.platform)
            .u8(self.page_size)
            .u32(0);

        if self.version >= CS_SUPPORTSSCATTER {
            w.u32(0);
        }
        if self.version >= CS_SUPPORTSTEAMID {
            w.u32(if self.team_id.is_some() { self.team_offset() as u32 } else { 0 });
        }
        if self.version >= CS_SUPPORTSCODELIMIT64 {
            w.u32(0).u64(self.code_limit_64);
        }
        if self.version >= CS_SUPPORTSEXECSEG {
            w.u64(self.exec_seg.0).u64(self.exec_seg.1).u64(self.exec_seg.2);
        }

        w.cstr(self.identifier);

        if let Some(team) = self.team_id {
            if self.version >= CS_SUPPORTSTEAMID {
                w.cstr(team);
            }
        }

        // special slots are stored in reverse, the last one first
        for slot in (1..=self.n_special_slots).rev() {
            let fill = if self.empty_special_slots.contains(&slot) {
                0
            } else {
                0xa0 + slot as u8
            };

            w.bytes(&vec![fill; hash_size]);
        }

        for slot in 0..self.n_code_slots {
            w.bytes(&vec![slot as u8 + 1; hash_size]);
        }

        w.into_vec()
    }
}

pub const ENTITLEMENTS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0"><dict><key>get-task-allow</key><true/></dict></plist>
"#;

/// An embedded signature with a CodeDirectory, requirements, entitlements and a CMS wrapper.
pub fn embedded_signature(cd: &CodeDirectorySpec) -> Vec<u8> {
    super_blob(
        CSMAGIC_EMBEDDED_SIGNATURE,
        &[
            (CSSLOT_CODEDIRECTORY, cd.build()),
            (CSSLOT_REQUIREMENTS, blob(CSMAGIC_REQUIREMENTS, &[0, 0, 0, 0])),
            (CSSLOT_ENTITLEMENTS, blob(CSMAGIC_EMBEDDED_ENTITLEMENTS, ENTITLEMENTS_XML.as_bytes())),
            (CSSLOT_SIGNATURESLOT, blob(CSMAGIC_BLOBWRAPPER, &[])),
        ],
    )
}
