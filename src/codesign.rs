//! Code signing data stored in the `__LINKEDIT` segment.
//!
//! Everything here is big-endian regardless of the image byte order.
//! A SuperBlob holds an index of `(slot, offset)` pairs, each pointing to a
//! blob that starts with its own `(magic, length)` header.
use std::fmt;

use byteorder::BigEndian;

use crate::codec::{ByteSpan, SpanReader};
use crate::consts::*;
use crate::errors::{MachError, Result};

bitflags! {
    /// Code signing flags carried by a CodeDirectory.
    pub struct CodeSigningFlags: u32 {
        const ADHOC = CS_ADHOC;
        const HARD = CS_HARD;
        const KILL = CS_KILL;
        const RESTRICT = CS_RESTRICT;
        const ENFORCEMENT = CS_ENFORCEMENT;
        const REQUIRE_LV = CS_REQUIRE_LV;
        const RUNTIME = CS_RUNTIME;
        const LINKER_SIGNED = CS_LINKER_SIGNED;
    }
}

bitflags! {
    /// Executable segment flags.
    pub struct ExecSegmentFlags: u64 {
        const MAIN_BINARY = CS_EXECSEG_MAIN_BINARY;
        const ALLOW_UNSIGNED = CS_EXECSEG_ALLOW_UNSIGNED;
        const DEBUGGER = CS_EXECSEG_DEBUGGER;
        const JIT = CS_EXECSEG_JIT;
        const SKIP_LV = CS_EXECSEG_SKIP_LV;
        const CAN_LOAD_CDHASH = CS_EXECSEG_CAN_LOAD_CDHASH;
        const CAN_EXEC_CDHASH = CS_EXECSEG_CAN_EXEC_CDHASH;
    }
}

/// The digest algorithm of the CodeDirectory hash slots.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HashType {
    None,
    Sha1,
    Sha256,
    Sha256Truncated,
    Sha384,
    Unknown(u8),
}

impl From<u8> for HashType {
    fn from(v: u8) -> Self {
        match v {
            0 => HashType::None,
            CS_HASHTYPE_SHA1 => HashType::Sha1,
            CS_HASHTYPE_SHA256 => HashType::Sha256,
            CS_HASHTYPE_SHA256_TRUNCATED => HashType::Sha256Truncated,
            CS_HASHTYPE_SHA384 => HashType::Sha384,
            _ => HashType::Unknown(v),
        }
    }
}

impl From<HashType> for u8 {
    fn from(hash_type: HashType) -> u8 {
        match hash_type {
            HashType::None => 0,
            HashType::Sha1 => CS_HASHTYPE_SHA1,
            HashType::Sha256 => CS_HASHTYPE_SHA256,
            HashType::Sha256Truncated => CS_HASHTYPE_SHA256_TRUNCATED,
            HashType::Sha384 => CS_HASHTYPE_SHA384,
            HashType::Unknown(v) => v,
        }
    }
}

impl HashType {
    /// The digest length in bytes for a known algorithm.
    pub fn digest_size(self) -> Option<usize> {
        match self {
            HashType::Sha1 => Some(CS_SHA1_LEN),
            HashType::Sha256 => Some(CS_SHA256_LEN),
            HashType::Sha256Truncated => Some(CS_SHA256_TRUNCATED_LEN),
            HashType::Sha384 => Some(CS_SHA384_LEN),
            HashType::None | HashType::Unknown(_) => None,
        }
    }
}

impl fmt::Display for HashType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HashType::None => write!(f, "none"),
            HashType::Sha1 => write!(f, "sha1"),
            HashType::Sha256 => write!(f, "sha256"),
            HashType::Sha256Truncated => write!(f, "sha256-truncated"),
            HashType::Sha384 => write!(f, "sha384"),
            HashType::Unknown(v) => write!(f, "unknown({})", v),
        }
    }
}

/// The well-known SuperBlob slot name, as printed by `codesign -d`.
pub fn slot_name(slot: u32) -> &'static str {
    match slot {
        CSSLOT_CODEDIRECTORY => "CodeDirectory",
        CSSLOT_INFOSLOT => "Info.plist",
        CSSLOT_REQUIREMENTS => "Requirements",
        CSSLOT_RESOURCEDIR => "Resources",
        CSSLOT_APPLICATION => "Application",
        CSSLOT_ENTITLEMENTS => "Entitlements",
        CSSLOT_DER_ENTITLEMENTS => "DER Entitlements",
        CSSLOT_SIGNATURESLOT => "CMS Signature",
        CSSLOT_IDENTIFICATIONSLOT => "Identification",
        CSSLOT_TICKETSLOT => "Ticket",
        slot if slot >= CSSLOT_ALTERNATE_CODEDIRECTORIES && slot < CSSLOT_ALTERNATE_CODEDIRECTORY_LIMIT => {
            "Alternate CodeDirectory"
        }
        _ => "Unknown",
    }
}

fn is_code_directory_slot(slot: u32) -> bool {
    slot == CSSLOT_CODEDIRECTORY
        || (slot >= CSSLOT_ALTERNATE_CODEDIRECTORIES && slot < CSSLOT_ALTERNATE_CODEDIRECTORY_LIMIT)
}

/// The flavour of a SuperBlob.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SuperBlobKind {
    Embedded,
    EmbeddedOld,
    Detached,
}

impl SuperBlobKind {
    fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            CSMAGIC_EMBEDDED_SIGNATURE => Some(SuperBlobKind::Embedded),
            CSMAGIC_EMBEDDED_SIGNATURE_OLD => Some(SuperBlobKind::EmbeddedOld),
            CSMAGIC_DETACHED_SIGNATURE => Some(SuperBlobKind::Detached),
            _ => None,
        }
    }
}

/// A decoded blob, dispatched on its magic.
///
/// Payloads exclude the 8 bytes `(magic, length)` header.
#[derive(Debug, Clone)]
pub enum Blob<'a> {
    CodeDirectory(CodeDirectory<'a>),
    /// opaque requirement set
    Requirements(ByteSpan<'a>),
    /// a single opaque requirement
    Requirement(ByteSpan<'a>),
    /// entitlements plist text
    Entitlements(ByteSpan<'a>),
    /// DER encoded entitlements
    DerEntitlements(ByteSpan<'a>),
    /// usually a CMS signature
    BlobWrapper(ByteSpan<'a>),
    Unknown { magic: u32, data: ByteSpan<'a> },
}

impl<'a> Blob<'a> {
    pub fn magic(&self) -> u32 {
        match *self {
            Blob::CodeDirectory(_) => CSMAGIC_CODEDIRECTORY,
            Blob::Requirements(_) => CSMAGIC_REQUIREMENTS,
            Blob::Requirement(_) => CSMAGIC_REQUIREMENT,
            Blob::Entitlements(_) => CSMAGIC_EMBEDDED_ENTITLEMENTS,
            Blob::DerEntitlements(_) => CSMAGIC_EMBEDDED_DER_ENTITLEMENTS,
            Blob::BlobWrapper(_) => CSMAGIC_BLOBWRAPPER,
            Blob::Unknown { magic, .. } => magic,
        }
    }

    /// The payload bytes following the blob header.
    pub fn payload(&self) -> &'a [u8] {
        match *self {
            Blob::CodeDirectory(ref cd) => &cd.as_bytes()[BLOB_HEADER_SIZE..],
            Blob::Requirements(data)
            | Blob::Requirement(data)
            | Blob::Entitlements(data)
            | Blob::DerEntitlements(data)
            | Blob::BlobWrapper(data)
            | Blob::Unknown { data, .. } => data.as_bytes(),
        }
    }
}

/// One SuperBlob index entry with the blob it points to.
#[derive(Debug, Clone)]
pub struct BlobIndex<'a> {
    /// slot type
    pub slot: u32,
    /// offset of the blob from the start of the SuperBlob
    pub offset: u32,
    /// the whole blob, header included
    pub span: ByteSpan<'a>,
    pub blob: Blob<'a>,
}

/// A decoded SuperBlob.
#[derive(Debug, Clone)]
pub struct EmbeddedSignature<'a> {
    pub kind: SuperBlobKind,
    pub magic: u32,
    /// total length of the SuperBlob
    pub length: u32,
    /// the SuperBlob bytes, `length` long
    pub span: ByteSpan<'a>,
    /// blobs in index order
    pub blobs: Vec<BlobIndex<'a>>,
    /// index entries whose blob could not be decoded, the other blobs stay valid
    pub blob_errors: Vec<MachError>,
}

impl<'a> EmbeddedSignature<'a> {
    /// Decode the SuperBlob at the start of `span`.
    ///
    /// A bad SuperBlob header or index table fails the whole signature. A
    /// malformed blob is kept in `blob_errors` and the remaining entries are
    /// still decoded.
    pub fn parse(span: ByteSpan<'a>) -> Result<EmbeddedSignature<'a>> {
        let magic = span.read_u32::<BigEndian>("SuperBlob", 0)?;
        let kind = SuperBlobKind::from_magic(magic).ok_or(MachError::InvalidSuperBlobMagic {
            magic,
            offset: span.offset(),
        })?;
        let length = span.read_u32::<BigEndian>("SuperBlob", 4)?;
        let count = span.read_u32::<BigEndian>("SuperBlob", 8)?;

        if (length as usize) < SUPERBLOB_HEADER_SIZE {
            return Err(MachError::OutOfBounds {
                what: "SuperBlob",
                offset: span.offset() as u64,
                size: SUPERBLOB_HEADER_SIZE as u64,
                limit: span.offset() as u64 + u64::from(length),
            });
        }

        let span = span.sub_span("SuperBlob", 0, u64::from(length))?;
        let index = span.sub_span(
            "SuperBlob index",
            SUPERBLOB_HEADER_SIZE as u64,
            u64::from(count) * BLOB_INDEX_SIZE as u64,
        )?;

        debug!("found {:?} SuperBlob at {:?} with {} blobs", kind, span, count);

        let mut blobs = Vec::with_capacity(count as usize);
        let mut blob_errors = Vec::new();

        for i in 0..u64::from(count) {
            let slot = index.read_u32::<BigEndian>("blob index", i * BLOB_INDEX_SIZE as u64)?;
            let offset = index.read_u32::<BigEndian>("blob index", i * BLOB_INDEX_SIZE as u64 + 4)?;

            match Self::parse_blob(span, slot, offset) {
                Ok(blob) => blobs.push(blob),
                Err(err) => {
                    warn!("skip blob #{} in slot 0x{:x}, {}", i, slot, err);

                    blob_errors.push(err);
                }
            }
        }

        Ok(EmbeddedSignature {
            kind,
            magic,
            length,
            span,
            blobs,
            blob_errors,
        })
    }

    fn parse_blob(superblob: ByteSpan<'a>, slot: u32, offset: u32) -> Result<BlobIndex<'a>> {
        let magic = superblob.read_u32::<BigEndian>("blob header", u64::from(offset))?;
        let length = superblob.read_u32::<BigEndian>("blob header", u64::from(offset) + 4)?;

        if (length as usize) < BLOB_HEADER_SIZE {
            return Err(MachError::OutOfBounds {
                what: "blob",
                offset: (superblob.offset() as u64) + u64::from(offset),
                size: u64::from(length),
                limit: superblob.end() as u64,
            });
        }

        let span = superblob.sub_span("blob", u64::from(offset), u64::from(length))?;
        let payload = span.tail("blob payload", BLOB_HEADER_SIZE as u64)?;

        let blob = match magic {
            CSMAGIC_CODEDIRECTORY => Blob::CodeDirectory(CodeDirectory::parse(span)?),
            CSMAGIC_REQUIREMENTS => Blob::Requirements(payload),
            CSMAGIC_REQUIREMENT => Blob::Requirement(payload),
            CSMAGIC_EMBEDDED_ENTITLEMENTS => Blob::Entitlements(payload),
            CSMAGIC_EMBEDDED_DER_ENTITLEMENTS => Blob::DerEntitlements(payload),
            CSMAGIC_BLOBWRAPPER => Blob::BlobWrapper(payload),
            _ => Blob::Unknown { magic, data: payload },
        };

        trace!(
            "parsed {} blob in slot 0x{:x} at {:?}, magic=0x{:08x}",
            slot_name(slot),
            slot,
            span,
            magic
        );

        Ok(BlobIndex {
            slot,
            offset,
            span,
            blob,
        })
    }

    /// The first blob stored in `slot`.
    pub fn find(&self, slot: u32) -> Option<&BlobIndex<'a>> {
        self.blobs.iter().find(|index| index.slot == slot)
    }

    /// The primary CodeDirectory.
    pub fn code_directory(&self) -> Option<&CodeDirectory<'a>> {
        self.find(CSSLOT_CODEDIRECTORY).and_then(|index| match index.blob {
            Blob::CodeDirectory(ref cd) => Some(cd),
            _ => None,
        })
    }

    /// The primary and alternate CodeDirectories, in index order.
    pub fn code_directories(&self) -> impl Iterator<Item = &CodeDirectory<'a>> {
        self.blobs.iter().filter_map(|index| match index.blob {
            Blob::CodeDirectory(ref cd) if is_code_directory_slot(index.slot) => Some(cd),
            _ => None,
        })
    }

    /// The entitlements plist, handed over undecoded.
    pub fn entitlements(&self) -> Option<&'a [u8]> {
        self.blobs.iter().find_map(|index| match index.blob {
            Blob::Entitlements(data) => Some(data.as_bytes()),
            _ => None,
        })
    }

    pub fn der_entitlements(&self) -> Option<&'a [u8]> {
        self.blobs.iter().find_map(|index| match index.blob {
            Blob::DerEntitlements(data) => Some(data.as_bytes()),
            _ => None,
        })
    }

    /// The requirement set, header included, as hashed into special slot 2.
    pub fn requirements(&self) -> Option<&'a [u8]> {
        self.blobs.iter().find_map(|index| match index.blob {
            Blob::Requirements(_) => Some(index.span.as_bytes()),
            _ => None,
        })
    }

    /// The CMS signature bytes from the signature slot.
    ///
    /// `None` for ad-hoc signatures, whose wrapper is empty.
    pub fn cms_signature(&self) -> Option<&'a [u8]> {
        self.find(CSSLOT_SIGNATURESLOT)
            .and_then(|index| match index.blob {
                Blob::BlobWrapper(data) => Some(data.as_bytes()),
                _ => None,
            })
            .filter(|data| !data.is_empty())
    }
}

/// The `base, limit, flags` of the executable segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecSegment {
    pub base: u64,
    pub limit: u64,
    pub flags: u64,
}

impl ExecSegment {
    pub fn flags(&self) -> ExecSegmentFlags {
        ExecSegmentFlags::from_bits_truncate(self.flags)
    }
}

/// A decoded CodeDirectory blob.
///
/// The header grows with the version, fields of a later version are `None`
/// when the blob is older.
#[derive(Debug, Clone)]
pub struct CodeDirectory<'a> {
    span: ByteSpan<'a>,
    /// hashes of the special slots followed by the code slots
    hashes: ByteSpan<'a>,
    pub magic: u32,
    pub length: u32,
    pub version: u32,
    pub flags: u32,
    pub hash_offset: u32,
    pub ident_offset: u32,
    pub n_special_slots: u32,
    pub n_code_slots: u32,
    pub code_limit: u32,
    pub hash_size: u8,
    pub hash_type: HashType,
    pub platform: u8,
    /// log2 of the page size, 0 means unpaged, always below 64
    pub page_size_log2: u8,
    pub scatter_offset: Option<u32>,
    pub team_offset: Option<u32>,
    pub code_limit_64: Option<u64>,
    pub exec_seg: Option<ExecSegment>,
    pub identifier: String,
    pub team_id: Option<String>,
}

fn required_size(version: u32) -> usize {
    if version >= CS_SUPPORTSEXECSEG {
        CODEDIRECTORY_EXECSEG_SIZE
    } else if version >= CS_SUPPORTSCODELIMIT64 {
        CODEDIRECTORY_CODELIMIT64_SIZE
    } else if version >= CS_SUPPORTSTEAMID {
        CODEDIRECTORY_TEAMID_SIZE
    } else if version >= CS_SUPPORTSSCATTER {
        CODEDIRECTORY_SCATTER_SIZE
    } else {
        CODEDIRECTORY_BASE_SIZE
    }
}

impl<'a> CodeDirectory<'a> {
    /// Decode a CodeDirectory blob starting at the beginning of `span`.
    ///
    /// Fields are only read when the version carries them and the declared
    /// length covers that version's header.
    pub fn parse(span: ByteSpan<'a>) -> Result<CodeDirectory<'a>> {
        let magic = span.read_u32::<BigEndian>("CodeDirectory", 0)?;

        if magic != CSMAGIC_CODEDIRECTORY {
            return Err(MachError::UnsupportedMagic {
                magic,
                offset: span.offset(),
            });
        }

        let length = span.read_u32::<BigEndian>("CodeDirectory", 4)?;
        let version = span.read_u32::<BigEndian>("CodeDirectory", 8)?;
        let required = required_size(version);

        if (length as usize) < required {
            return Err(MachError::TruncatedCodeDirectory {
                version,
                offset: span.offset(),
                length,
                required: required as u32,
            });
        }

        let span = span.sub_span("CodeDirectory", 0, u64::from(length))?;
        let mut r = SpanReader::new(span, "CodeDirectory");

        // magic, length, version
        r.skip(12)?;

        let flags = r.read_u32::<BigEndian>()?;
        let hash_offset = r.read_u32::<BigEndian>()?;
        let ident_offset = r.read_u32::<BigEndian>()?;
        let n_special_slots = r.read_u32::<BigEndian>()?;
        let n_code_slots = r.read_u32::<BigEndian>()?;
        let code_limit = r.read_u32::<BigEndian>()?;
        let hash_size = r.read_u8()?;
        let hash_type = HashType::from(r.read_u8()?);
        let platform = r.read_u8()?;
        let page_size_log2 = r.read_u8()?;

        // spare2
        r.skip(4)?;

        let scatter_offset = if version >= CS_SUPPORTSSCATTER {
            Some(r.read_u32::<BigEndian>()?)
        } else {
            None
        };
        let team_offset = if version >= CS_SUPPORTSTEAMID {
            Some(r.read_u32::<BigEndian>()?)
        } else {
            None
        };
        let code_limit_64 = if version >= CS_SUPPORTSCODELIMIT64 {
            // spare3
            r.skip(4)?;

            Some(r.read_u64::<BigEndian>()?)
        } else {
            None
        };
        let exec_seg = if version >= CS_SUPPORTSEXECSEG {
            Some(ExecSegment {
                base: r.read_u64::<BigEndian>()?,
                limit: r.read_u64::<BigEndian>()?,
                flags: r.read_u64::<BigEndian>()?,
            })
        } else {
            None
        };

        let identifier = span.read_cstr("CodeDirectory identifier", u64::from(ident_offset))?.to_owned();
        let team_id = match team_offset {
            Some(off) if off != 0 => Some(span.read_cstr("CodeDirectory team id", u64::from(off))?.to_owned()),
            _ => None,
        };

        if let Some(digest_size) = hash_type.digest_size() {
            if usize::from(hash_size) != digest_size {
                return Err(MachError::MalformedCodeDirectory(format!(
                    "hash size {} doesn't match the {} digest size {}",
                    hash_size, hash_type, digest_size
                )));
            }
        }
        if page_size_log2 >= 64 {
            return Err(MachError::MalformedCodeDirectory(format!(
                "page size 2^{} overflows",
                page_size_log2
            )));
        }
        if hash_size == 0 && (n_special_slots != 0 || n_code_slots != 0) {
            return Err(MachError::MalformedCodeDirectory(format!(
                "{} special and {} code slots with a zero hash size",
                n_special_slots, n_code_slots
            )));
        }

        let special_len = u64::from(n_special_slots) * u64::from(hash_size);
        let code_len = u64::from(n_code_slots) * u64::from(hash_size);
        let start = u64::from(hash_offset)
            .checked_sub(special_len)
            .ok_or_else(|| MachError::OutOfBounds {
                what: "CodeDirectory special slots",
                offset: span.offset() as u64,
                size: special_len,
                limit: span.offset() as u64 + u64::from(hash_offset),
            })?;
        let hashes = span.sub_span("CodeDirectory hash slots", start, special_len + code_len)?;

        let cd = CodeDirectory {
            span,
            hashes,
            magic,
            length,
            version,
            flags,
            hash_offset,
            ident_offset,
            n_special_slots,
            n_code_slots,
            code_limit,
            hash_size,
            hash_type,
            platform,
            page_size_log2,
            scatter_offset,
            team_offset,
            code_limit_64,
            exec_seg,
            identifier,
            team_id,
        };

        debug!(
            "parsed CodeDirectory v0x{:x} at {:?}, identifier={}, {} special slots, {} code slots",
            version, span, cd.identifier, n_special_slots, n_code_slots
        );

        Ok(cd)
    }

    /// The raw CodeDirectory bytes, as hashed to compute the CDHash.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.span.as_bytes()
    }

    pub fn code_signing_flags(&self) -> CodeSigningFlags {
        CodeSigningFlags::from_bits_truncate(self.flags)
    }

    /// The page size in bytes, `None` when the code is hashed as a whole.
    pub fn page_size(&self) -> Option<u64> {
        match self.page_size_log2 {
            0 => None,
            n => Some(1u64 << n),
        }
    }

    /// The effective code limit, preferring the 64-bit field when set.
    pub fn code_limit(&self) -> u64 {
        match self.code_limit_64 {
            Some(limit) if limit != 0 => limit,
            _ => u64::from(self.code_limit),
        }
    }

    pub fn hash_slot_count(&self) -> u64 {
        u64::from(self.n_special_slots) + u64::from(self.n_code_slots)
    }

    /// The hash stored in special slot `slot`, counting from 1.
    ///
    /// `None` when the slot is out of range or zero-filled, which marks an absent entry.
    pub fn special_slot_hash(&self, slot: u32) -> Option<&'a [u8]> {
        if slot == 0 || slot > self.n_special_slots {
            return None;
        }

        let hash_size = usize::from(self.hash_size);
        let offset = (self.n_special_slots - slot) as usize * hash_size;
        let hash = &self.hashes.as_bytes()[offset..offset + hash_size];

        if hash.iter().all(|&b| b == 0) {
            None
        } else {
            Some(hash)
        }
    }

    /// The hash of code page `index`.
    pub fn code_slot_hash(&self, index: u32) -> Option<&'a [u8]> {
        if index >= self.n_code_slots {
            return None;
        }

        let hash_size = usize::from(self.hash_size);
        let offset = (self.n_special_slots as usize + index as usize) * hash_size;

        Some(&self.hashes.as_bytes()[offset..offset + hash_size])
    }

    /// Every hash slot in storage order, special slots as negative indexes.
    pub fn slots(&self) -> impl Iterator<Item = (i64, &'a [u8])> {
        let first = -i64::from(self.n_special_slots);

        self.hashes
            .as_bytes()
            .chunks(usize::from(self.hash_size).max(1))
            .enumerate()
            .map(move |(i, hash)| (first + i as i64, hash))
    }
}
