//! `metagen` - write and inspect Objective-C metadata containers.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use serde::Serialize;

use objc_metadata::binary::{Header, MetaFile, MetaFileReader};
use objc_metadata::meta::Forest;
use objc_metadata::FormatConfig;

#[derive(Parser, Debug)]
#[command(name = "metagen", version, about = "Objective-C metadata container tool")]
struct Cli {
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serialize a JSON declaration forest into a container.
    Write {
        /// Forest in JSON form.
        #[arg(short, long)]
        input: PathBuf,

        /// Container to write.
        #[arg(short, long)]
        output: PathBuf,

        /// Width of a heap offset in bytes.
        #[arg(long, default_value_t = 4)]
        pointer_size: u8,

        /// Width of an array count in bytes.
        #[arg(long, default_value_t = 4)]
        array_count_size: u8,
    },
    /// Print the contents of a container as JSON.
    Dump {
        /// Container to read.
        file: PathBuf,

        /// Only print the declaration registered under this name.
        #[arg(long)]
        lookup: Option<String>,

        /// Fail if any referenced struct, union or interface is missing.
        #[arg(long)]
        verify: bool,
    },
}

#[derive(Serialize)]
struct Dump<'a, T: Serialize> {
    header: &'a Header,
    modules: &'a [&'a str],
    global_table_capacity: usize,
    declarations: T,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .format(|buf, record| writeln!(buf, "{}:\n{}", record.level(), record.args()))
        .filter_level(cli.verbose.log_level_filter())
        .target(env_logger::fmt::Target::Stderr)
        .init();

    match cli.command {
        Command::Write {
            input,
            output,
            pointer_size,
            array_count_size,
        } => {
            let config = FormatConfig::builder()
                .pointer_size(pointer_size)
                .array_count_size(array_count_size)
                .build();
            config.validate()?;

            let json = fs::read_to_string(&input)
                .with_context(|| format!("Could not read forest {}", input.display()))?;
            let forest: Forest = serde_json::from_str(&json)
                .with_context(|| format!("Could not parse forest {}", input.display()))?;
            log::debug!(
                "read {} declarations in {} modules from {}",
                forest.declaration_count(),
                forest.modules.len(),
                input.display()
            );

            MetaFile::new(&forest, config)
                .save_to_path(&output)
                .with_context(|| format!("Could not write {}", output.display()))?;
            Ok(())
        }
        Command::Dump { file, lookup, verify } => {
            let bytes = fs::read(&file).with_context(|| format!("Could not read {}", file.display()))?;
            let reader = MetaFileReader::parse(&bytes)
                .with_context(|| format!("{} is not a metadata container", file.display()))?;
            if verify {
                reader.verify_references()?;
            }

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            match lookup {
                Some(name) => {
                    let decl = reader
                        .find(&name)?
                        .with_context(|| format!("`{}` is not registered in {}", name, file.display()))?;
                    serde_json::to_writer_pretty(&mut out, &decl)?;
                }
                None => {
                    let declarations = reader
                        .declaration_offsets()?
                        .into_iter()
                        .map(|offset| reader.declaration(offset))
                        .collect::<Result<Vec<_>, _>>()?;
                    let dump = Dump {
                        header: reader.header(),
                        modules: reader.module_names(),
                        global_table_capacity: reader.global_table_capacity(),
                        declarations,
                    };
                    serde_json::to_writer_pretty(&mut out, &dump)?;
                }
            }
            writeln!(out)?;
            Ok(())
        }
    }
}
