use std::fmt;

use time::macros::format_description;
use time::OffsetDateTime;

use crate::codesign::{slot_name, Blob, CodeDirectory, CodeSigningFlags, EmbeddedSignature};
use crate::commands::{LoadCommand, MachCommand};
use crate::consts::*;
use crate::fat::FatArchive;
use crate::loader::{ImageSummary, MachHeader};

impl fmt::Display for MachHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Mach header\n")?;
        write!(
            f,
            "      magic cputype cpusubtype  caps    filetype ncmds sizeofcmds      \
             flags\n"
        )?;
        write!(
            f,
            " 0x{:08x} {:7} {:10}  0x{:02x}  {:10} {:5} {:10} 0x{:08x}\n",
            self.magic,
            self.cputype,
            get_cpu_subtype_type(self.cpusubtype),
            get_cpu_subtype_feature(self.cpusubtype),
            self.filetype,
            self.ncmds,
            self.sizeofcmds,
            self.flags
        )
    }
}

impl<'a> fmt::Display for FatArchive<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Fat headers\n")?;
        write!(f, "fat_magic 0x{:08x}\n", self.magic)?;
        write!(f, "nfat_arch {}\n", self.entries.len())?;

        for (i, entry) in self.entries.iter().enumerate() {
            let arch = &entry.arch;

            write!(f, "architecture {}\n", i)?;
            write!(f, "    cputype {}\n", arch.cputype)?;
            write!(f, "    cpusubtype {}\n", get_cpu_subtype_type(arch.cpusubtype))?;
            write!(f, "    capabilities 0x{:x}\n", get_cpu_subtype_feature(arch.cpusubtype))?;
            write!(f, "    offset {}\n", arch.offset)?;
            write!(f, "    size {}\n", arch.size)?;
            write!(
                f,
                "    align 2^{} ({})\n",
                arch.align,
                1u64.checked_shl(arch.align).unwrap_or(0)
            )?;
        }

        Ok(())
    }
}

fn format_timestamp(timestamp: u32) -> Result<String, fmt::Error> {
    let ts = OffsetDateTime::from_unix_timestamp(i64::from(timestamp)).map_err(|_| fmt::Error)?;

    ts.format(format_description!(
        "[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] [year] UTC"
    ))
    .map_err(|_| fmt::Error)
}

impl<'a> MachCommand<'a> {
    fn print_segment_command(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let MachCommand(ref cmd, cmdsize) = *self;

        match *cmd {
            LoadCommand::Segment {
                ref segname,
                vmaddr,
                vmsize,
                fileoff,
                filesize,
                maxprot,
                initprot,
                flags,
                ref sections,
            }
            | LoadCommand::Segment64 {
                ref segname,
                vmaddr,
                vmsize,
                fileoff,
                filesize,
                maxprot,
                initprot,
                flags,
                ref sections,
            } => {
                let is_64bit = cmd.cmd() == LC_SEGMENT_64;

                write!(f, "      cmd {}\n", cmd.name())?;
                write!(f, "  cmdsize {}\n", cmdsize)?;
                write!(f, "  segname {}\n", segname)?;
                if is_64bit {
                    write!(f, "   vmaddr 0x{:016x}\n", vmaddr)?;
                    write!(f, "   vmsize 0x{:016x}\n", vmsize)?;
                } else {
                    write!(f, "   vmaddr 0x{:08x}\n", vmaddr)?;
                    write!(f, "   vmsize 0x{:08x}\n", vmsize)?;
                }
                write!(f, "  fileoff {}\n", fileoff)?;
                write!(f, " filesize {}\n", filesize)?;
                write!(f, "  maxprot 0x{:08x}\n", maxprot)?;
                write!(f, " initprot 0x{:08x}\n", initprot)?;
                write!(f, "   nsects {}\n", sections.len())?;
                write!(f, "    flags 0x{:x}\n", flags.bits())?;

                for section in sections {
                    write!(f, "Section\n")?;
                    write!(f, "  sectname {}\n", section.sectname)?;
                    write!(
                        f,
                        "   segname {}{}",
                        section.segname,
                        if *segname != section.segname {
                            " (does not match segment)\n"
                        } else {
                            "\n"
                        }
                    )?;
                    if is_64bit {
                        write!(f, "      addr 0x{:016x}\n", section.addr)?;
                        write!(f, "      size 0x{:016x}\n", section.size)?;
                    } else {
                        write!(f, "      addr 0x{:08x}\n", section.addr)?;
                        write!(f, "      size 0x{:08x}\n", section.size)?;
                    }
                    write!(f, "    offset {}\n", section.offset)?;
                    write!(
                        f,
                        "     align 2^{} ({})\n",
                        section.align,
                        1u64.checked_shl(section.align).unwrap_or(0)
                    )?;
                    write!(f, "    reloff {}\n", section.reloff)?;
                    write!(f, "    nreloc {}\n", section.nreloc)?;
                    write!(f, "     flags 0x{:08x}\n", section.flags)?;
                }

                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn print_dylib_command(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let MachCommand(ref cmd, cmdsize) = *self;

        match *cmd {
            LoadCommand::LoadDyLib(ref dylib) | LoadCommand::LoadWeakDyLib(ref dylib) => {
                write!(f, "          cmd {}\n", cmd.name())?;
                write!(f, "      cmdsize {}\n", cmdsize)?;
                write!(f, "         name {} (offset {})\n", dylib.name, dylib.name.offset())?;
                write!(
                    f,
                    "   time stamp {} {}\n",
                    dylib.timestamp,
                    format_timestamp(dylib.timestamp)?
                )?;
                write!(
                    f,
                    "      current version {}.{}.{}\n",
                    dylib.current_version.major(),
                    dylib.current_version.minor(),
                    dylib.current_version.release()
                )?;
                write!(
                    f,
                    "compatibility version {}.{}.{}\n",
                    dylib.compatibility_version.major(),
                    dylib.compatibility_version.minor(),
                    dylib.compatibility_version.release()
                )?;

                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn print_rpath_command(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let MachCommand(ref cmd, cmdsize) = *self;

        if let LoadCommand::Rpath(ref path) = *cmd {
            write!(f, "          cmd {}\n", cmd.name())?;
            write!(f, "      cmdsize {}\n", cmdsize)?;
            write!(f, "         path {} (offset {})\n", path, path.offset())?;
        }

        Ok(())
    }

    fn print_version_min_command(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let MachCommand(ref cmd, cmdsize) = *self;

        if let LoadCommand::VersionMin { version, sdk, .. } = *cmd {
            write!(f, "      cmd {}\n", cmd.name())?;
            write!(f, "  cmdsize {}\n", cmdsize)?;
            write!(f, "  version {}\n", version)?;
            write!(f, "      sdk {}\n", sdk)?;
        }

        Ok(())
    }

    fn print_encryption_info_command(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let MachCommand(ref cmd, cmdsize) = *self;

        match *cmd {
            LoadCommand::EncryptionInfo(info) | LoadCommand::EncryptionInfo64(info) => {
                write!(f, "          cmd {}\n", cmd.name())?;
                write!(f, "      cmdsize {}\n", cmdsize)?;
                write!(f, "     cryptoff {}\n", info.cryptoff)?;
                write!(f, "    cryptsize {}\n", info.cryptsize)?;
                write!(f, "      cryptid {}\n", info.cryptid)?;

                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn print_linkedit_data_command(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let MachCommand(ref cmd, cmdsize) = *self;

        if let LoadCommand::CodeSignature(data) = *cmd {
            write!(f, "      cmd {}\n", cmd.name())?;
            write!(f, "  cmdsize {}\n", cmdsize)?;
            write!(f, "  dataoff {}\n", data.off)?;
            write!(f, " datasize {}\n", data.size)?;
        }

        Ok(())
    }

    fn print_unknown_command(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let MachCommand(ref cmd, cmdsize) = *self;

        write!(f, "      cmd {} (0x{:x})\n", cmd.name(), cmd.cmd())?;
        write!(f, "  cmdsize {}\n", cmdsize)
    }
}

impl<'a> fmt::Display for MachCommand<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            LoadCommand::Segment { .. } | LoadCommand::Segment64 { .. } => self.print_segment_command(f),
            LoadCommand::LoadDyLib(_) | LoadCommand::LoadWeakDyLib(_) => self.print_dylib_command(f),
            LoadCommand::Rpath(_) => self.print_rpath_command(f),
            LoadCommand::VersionMin { .. } => self.print_version_min_command(f),
            LoadCommand::EncryptionInfo(_) | LoadCommand::EncryptionInfo64(_) => {
                self.print_encryption_info_command(f)
            }
            LoadCommand::CodeSignature(_) => self.print_linkedit_data_command(f),
            LoadCommand::Command { .. } => self.print_unknown_command(f),
        }
    }
}

fn code_signing_flag_names(flags: CodeSigningFlags) -> String {
    let names = [
        (CodeSigningFlags::ADHOC, "adhoc"),
        (CodeSigningFlags::HARD, "hard"),
        (CodeSigningFlags::KILL, "kill"),
        (CodeSigningFlags::RESTRICT, "restrict"),
        (CodeSigningFlags::ENFORCEMENT, "enforcement"),
        (CodeSigningFlags::REQUIRE_LV, "library-validation"),
        (CodeSigningFlags::RUNTIME, "runtime"),
        (CodeSigningFlags::LINKER_SIGNED, "linker-signed"),
    ]
    .iter()
    .filter(|(flag, _)| flags.contains(*flag))
    .map(|(_, name)| *name)
    .collect::<Vec<_>>();

    if names.is_empty() {
        "none".to_owned()
    } else {
        names.join(",")
    }
}

impl<'a> fmt::Display for CodeDirectory<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "CodeDirectory v={:x} size={} flags=0x{:x}({}) hashes={}+{}\n",
            self.version,
            self.length,
            self.flags,
            code_signing_flag_names(self.code_signing_flags()),
            self.n_code_slots,
            self.n_special_slots
        )?;
        write!(f, "Identifier={}\n", self.identifier)?;
        write!(
            f,
            "TeamIdentifier={}\n",
            self.team_id.as_ref().map_or("not set", String::as_str)
        )?;
        write!(f, "Hash type={} size={}\n", self.hash_type, self.hash_size)?;
        match self.page_size() {
            Some(size) => write!(f, "Page size={}\n", size)?,
            None => write!(f, "Page size=none\n")?,
        }
        write!(f, "Code limit={}\n", self.code_limit())?;
        if let Some(exec_seg) = self.exec_seg {
            write!(f, "Executable Segment base={}\n", exec_seg.base)?;
            write!(f, "Executable Segment limit={}\n", exec_seg.limit)?;
            write!(f, "Executable Segment flags=0x{:x}\n", exec_seg.flags)?;
        }

        Ok(())
    }
}

impl<'a> fmt::Display for EmbeddedSignature<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SuperBlob magic=0x{:08x} length={} count={}\n",
            self.magic,
            self.length,
            self.blobs.len()
        )?;

        for index in &self.blobs {
            write!(
                f,
                "  slot 0x{:x} {} offset={} length={} magic=0x{:08x}\n",
                index.slot,
                slot_name(index.slot),
                index.offset,
                index.span.len(),
                index.blob.magic()
            )?;
        }

        for index in &self.blobs {
            if let Blob::CodeDirectory(ref cd) = index.blob {
                write!(f, "{}", cd)?;
            }
        }

        Ok(())
    }
}

impl fmt::Display for ImageSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "File type: {}\n", get_filetype_name(self.filetype))?;
        write!(
            f,
            "Total size: {} ({:.2} MB)\n",
            self.total_size,
            self.total_size as f64 / 1024.0 / 1024.0
        )?;
        write!(f, "Platform: {}\n", if self.is_64bit { "64-bit" } else { "32-bit" })?;
        write!(f, "CPU arch: {}\n", get_arch_name(self.cputype).unwrap_or("unknown"))?;
        write!(f, "CPU type: {:08x}\n", self.cputype)?;
        write!(f, "Sub CPU type: {:08x}\n", self.cpusubtype)?;
        write!(
            f,
            "Byte order: {}\n",
            if self.is_big_endian { "big-endian" } else { "little-endian" }
        )?;
        write!(f, "Encrypted: {}\n", self.is_encrypted)?;
        write!(f, "Commands count: {}\n", self.ncmds)?;
        write!(f, "Commands free space: {}\n", self.load_commands_free_space)?;
        if let Some(len) = self.code_length {
            write!(f, "Code length: {}\n", len)?;
        }
        if let Some(len) = self.signature_length {
            write!(f, "Sign length: {}\n", len)?;
        }
        if let Some(len) = self.spare_length {
            write!(f, "Spare length: {}\n", len)?;
        }
        if let Some(version) = self.min_iphoneos_version {
            write!(f, "Minimum iPhone version: {}\n", version)?;
        }
        for rpath in &self.rpaths {
            write!(f, "LC_RPATH: {}\n", rpath)?;
        }
        if !self.dylibs.is_empty() {
            write!(f, "LC_LOAD_DYLIB:\n")?;

            for dylib in &self.dylibs {
                write!(f, "    {}\n", dylib)?;
            }
        }
        if !self.weak_dylibs.is_empty() {
            write!(f, "LC_LOAD_WEAK_DYLIB:\n")?;

            for dylib in &self.weak_dylibs {
                write!(f, "    {} (weak)\n", dylib)?;
            }
        }
        if let Some(ref plist) = self.info_plist {
            write!(f, "Embedded info plist:\n{}\n", plist)?;
        }

        Ok(())
    }
}
