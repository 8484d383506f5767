#[macro_use]
extern crate log;

use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use hexplay::HexViewBuilder;
use memmap::Mmap;
use structopt::StructOpt;

use mach_codesign::*;

#[derive(Debug, StructOpt)]
#[structopt(name = "codesign_info", about = "Display the code signature of Mach-O files")]
struct Opt {
    /// Enable debug logging
    #[structopt(short, long)]
    debug: bool,

    /// Print the fat headers
    #[structopt(short = "f")]
    print_fat_headers: bool,

    /// Print the mach header
    #[structopt(short = "H")]
    print_mach_header: bool,

    /// Print the load commands
    #[structopt(short = "l")]
    print_load_commands: bool,

    /// Print the code signature blobs
    #[structopt(short = "s")]
    print_signature: bool,

    /// Dump the payload of unknown blobs
    #[structopt(short = "x")]
    dump_unknown_blobs: bool,

    /// Specifies the architecture
    #[structopt(long = "arch")]
    arch: Option<String>,

    /// Mach-O or universal files
    #[structopt(parse(from_os_str), required = true)]
    files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    let mut builder = pretty_env_logger::formatted_builder();

    if let Ok(filters) = env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    } else if opt.debug {
        builder.filter_level(log::LevelFilter::Debug);
    }

    builder.init();

    let cpu_type = match opt.arch {
        Some(ref name) => {
            get_arch_from_flag(name).ok_or_else(|| anyhow!("unknown architecture specification flag: arch {}", name))?
        }
        None => CPU_TYPE_ANY,
    };

    let processor = FileProcessor {
        cpu_type,
        print_fat_headers: opt.print_fat_headers,
        print_mach_header: opt.print_mach_header,
        print_load_commands: opt.print_load_commands,
        print_signature: opt.print_signature,
        dump_unknown_blobs: opt.dump_unknown_blobs,
    };

    for path in &opt.files {
        processor
            .process(path)
            .with_context(|| format!("fail to process file {:?}", path))?;
    }

    Ok(())
}

struct FileProcessor {
    cpu_type: cpu_type_t,
    print_fat_headers: bool,
    print_mach_header: bool,
    print_load_commands: bool,
    print_signature: bool,
    dump_unknown_blobs: bool,
}

impl FileProcessor {
    fn process(&self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file) }?;
        let file = UniversalFile::parse(&mmap)?;

        debug!("loaded {:?} with {} images", path, file.images.len());

        if self.print_fat_headers && file.is_fat() {
            print!("{}", file.archive);
        }

        for (entry, image) in file.iter() {
            if self.cpu_type != CPU_TYPE_ANY && entry.arch.cputype != self.cpu_type {
                continue;
            }

            let arch = entry.arch.arch_name().unwrap_or("unknown");

            match image {
                Ok(image) => {
                    println!("{} (architecture {}):", path.display(), arch);

                    self.print_image(image);
                }
                Err(err) => warn!("skip {} image at {:?}, {}", arch, entry.span, err),
            }
        }

        Ok(())
    }

    fn print_image(&self, image: &MachImage) {
        if self.print_mach_header {
            print!("{}", image.header);
        }

        if self.print_load_commands {
            for (i, cmd) in image.commands.iter().enumerate() {
                println!("Load command {}", i);
                print!("{}", cmd);
            }
        }

        if let Some(ref err) = image.walk_error {
            warn!("load commands are incomplete, {}", err);
        }
        for err in &image.range_errors {
            warn!("ignore out of range data, {}", err);
        }

        print!("{}", image.summary());

        match image.signature() {
            Some(Ok(signature)) => {
                for err in &signature.blob_errors {
                    warn!("skip malformed blob, {}", err);
                }

                if self.print_signature {
                    print!("{}", signature);
                } else if let Some(cd) = signature.code_directory() {
                    println!("Identifier: {}", cd.identifier);
                }

                if self.dump_unknown_blobs {
                    for index in &signature.blobs {
                        if let Blob::Unknown { magic, data } = index.blob {
                            println!("blob 0x{:08x} in slot 0x{:x}:", magic, index.slot);
                            println!("{}", HexViewBuilder::new(data.as_bytes()).finish());
                        }
                    }
                }
            }
            Some(Err(err)) => warn!("fail to decode code signature, {}", err),
            None => println!("code object is not signed at all"),
        }
    }
}
