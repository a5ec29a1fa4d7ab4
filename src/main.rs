//! Unsplit CLI - Command-line tool for reassembling split CryEngine textures.
//!
//! This is the main entry point for the Unsplit command-line application.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use unsplit_dds::header::{DX10_HEADER_SIZE, HEADER_SIZE};
use unsplit_dds::layout::minimum_combined_size;
use unsplit_dds::{
    classify, combine_dds, decode, resolve, split_base_name, CombineOptions, CombineOutcome,
    ContainerHeader, ExtendedFormatHeader, FileSystem, FragmentRole, FragmentSet,
    LocalFileSystem, MipPlan, COMBINED_IDENTIFIER,
};

/// Unsplit - reassemble split DDS textures
#[derive(Parser)]
#[command(name = "unsplit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Combine split textures into complete DDS files
    Combine {
        /// Texture files, fragments or directories to scan
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Write `<name>.<identifier>.dds` instead of replacing `<name>.dds`
        #[arg(short, long, env = "UNSPLIT_SAFE_NAME")]
        safe_name: bool,

        /// Name segment used with --safe-name
        #[arg(short, long, env = "UNSPLIT_IDENTIFIER", default_value = COMBINED_IDENTIFIER)]
        identifier: String,

        /// Only combine textures whose name matches this glob pattern
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Show how a split texture would be combined, without writing anything
    Inspect {
        /// Texture file or fragment
        input: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Combine {
            inputs,
            safe_name,
            identifier,
            filter,
        } => {
            let options = CombineOptions {
                safe_name,
                identifier,
            };
            cmd_combine(&inputs, &options, filter.as_deref())?;
        }
        Commands::Inspect { input, json } => {
            cmd_inspect(&input, json)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_combine(inputs: &[PathBuf], options: &CombineOptions, filter: Option<&str>) -> Result<()> {
    let filter = filter
        .map(glob::Pattern::new)
        .transpose()
        .context("Invalid filter pattern")?;

    let mut textures = BTreeSet::new();
    for input in inputs {
        collect_textures(input, options, &mut textures)?;
    }
    if let Some(pattern) = &filter {
        textures.retain(|(_, base_name)| pattern.matches(base_name));
    }
    info!(
        textures = textures.len(),
        safe_name = options.safe_name,
        "collected textures"
    );

    println!("Combining {} textures...", textures.len());

    let pb = ProgressBar::new(textures.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let combined = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let errors = AtomicUsize::new(0);

    textures.par_iter().for_each(|(directory, base_name)| {
        match combine_dds(directory.join(base_name), options) {
            Ok(CombineOutcome::AlreadyCombined(_)) => {
                skipped.fetch_add(1, Ordering::Relaxed);
            }
            Ok(CombineOutcome::Combined { alternate, .. }) => {
                combined.fetch_add(1, Ordering::Relaxed);
                if let Some(Err(e)) = alternate {
                    pb.println(format!(
                        "Error combining alternate of {}: {}",
                        directory.join(base_name).display(),
                        e
                    ));
                    errors.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                pb.println(format!(
                    "Error combining {}: {}",
                    directory.join(base_name).display(),
                    e
                ));
                errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        pb.inc(1);
    });

    pb.finish_with_message("Done");

    let errors = errors.into_inner();
    println!(
        "Combined {} textures in {:?} ({} already complete, {} errors)",
        combined.into_inner(),
        start.elapsed(),
        skipped.into_inner(),
        errors
    );

    if errors > 0 {
        anyhow::bail!("{} textures could not be combined", errors);
    }

    Ok(())
}

/// Add the `(directory, base name)` of every texture `input` refers to.
fn collect_textures(
    input: &Path,
    options: &CombineOptions,
    textures: &mut BTreeSet<(PathBuf, String)>,
) -> Result<()> {
    if !input.is_dir() {
        let (directory, base_name) = split_base_name(input)?;
        debug!(directory = %directory.display(), base_name = %base_name, "texture from input");
        textures.insert((directory, base_name));
        return Ok(());
    }

    let marker = format!(".{}.", options.identifier.to_ascii_lowercase());
    for entry in WalkDir::new(input) {
        let entry = entry.with_context(|| format!("Failed to walk {}", input.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        if file_name.to_ascii_lowercase().contains(&marker) {
            debug!(path = %entry.path().display(), "skipping combined output");
            continue;
        }

        let (directory, base_name) = split_base_name(entry.path())?;
        if classify(file_name, &base_name).is_some() {
            debug!(directory = %directory.display(), base_name = %base_name, "found texture");
            textures.insert((directory, base_name));
        }
    }

    Ok(())
}

/// Everything `inspect` reports about a texture.
#[derive(Serialize)]
struct Inspection {
    fragments: FragmentSet,
    files: Vec<(FragmentRole, PathBuf)>,
    header: ContainerHeader,
    extended: Option<ExtendedFormatHeader>,
    plan: MipPlan,
    minimum_combined_size: u64,
}

fn cmd_inspect(input: &Path, json: bool) -> Result<()> {
    let fs = LocalFileSystem;
    let (directory, base_name) = split_base_name(input)?;
    let fragments = resolve(&fs, &directory, &base_name)
        .with_context(|| format!("Failed to resolve fragments of {}", input.display()))?;

    let header_file = fragments.header_file().to_path_buf();
    let prefix = fs
        .read_prefix(&header_file, HEADER_SIZE + DX10_HEADER_SIZE)
        .with_context(|| format!("Failed to read {}", header_file.display()))?;
    let decoded = decode(&prefix).context("Failed to decode DDS header")?;
    let plan = MipPlan::for_decoded(&decoded).context("Failed to compute mip layout")?;
    let minimum_combined_size = minimum_combined_size(&decoded)?;

    let mut files = vec![(role_of(&fragments, &header_file), header_file.clone())];
    for chain in std::iter::once(&fragments.main).chain(fragments.alternate.as_ref()) {
        if chain.header != header_file {
            files.push((FragmentRole::AlternateHeader, chain.header.clone()));
        }
        for mip in &chain.mips {
            files.push((chain.mip_role(mip.index), mip.path.clone()));
        }
    }

    let inspection = Inspection {
        files,
        header: decoded.header,
        extended: decoded.extended,
        plan,
        minimum_combined_size,
        fragments,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
        return Ok(());
    }

    let header = &inspection.header;
    println!("Texture: {}", directory.join(&base_name).display());
    println!(
        "Size: {}x{}, {} mip levels, {} face(s)",
        header.width,
        header.height,
        header.mip_levels(),
        inspection.plan.faces
    );
    match &inspection.extended {
        Some(extended) => println!("Format: DXGI {}", extended.dxgi_format),
        None if header.pixel_format.has_four_cc() => {
            println!("Format: {}", header.pixel_format.four_cc)
        }
        None => println!("Format: {} bpp uncompressed", header.pixel_format.rgb_bit_count),
    }

    println!("\nFiles:");
    for (role, path) in &inspection.files {
        println!("  {:<18} {}", format!("{role:?}"), path.display());
    }

    println!("\nMip levels:");
    for level in &inspection.plan.levels {
        println!(
            "  {:>2} {:>5}x{:<5} {:>10} bytes",
            level.level, level.width, level.height, level.byte_size
        );
    }

    println!(
        "\nCombined size: at least {} bytes",
        inspection.minimum_combined_size
    );
    if inspection.fragments.already_combined {
        println!("Status: already combined");
    } else {
        println!("Status: split across {} files", inspection.files.len());
    }

    Ok(())
}

fn role_of(fragments: &FragmentSet, path: &Path) -> FragmentRole {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| classify(name, &fragments.base_name))
        .unwrap_or(FragmentRole::Base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_collect_textures_from_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let sub = dir.path().join("objects");
        fs::create_dir(&sub).unwrap();
        for name in [
            "rock.dds",
            "rock.dds.1",
            "rock.dds.2",
            "rock.dds.a",
            "rock.combined.dds",
            "hull_ddna.dds.0",
            "hull_ddna.dds.3",
            "notes.txt",
        ] {
            fs::write(sub.join(name), b"x").unwrap();
        }

        let mut textures = BTreeSet::new();
        collect_textures(dir.path(), &CombineOptions::default(), &mut textures).unwrap();

        let found: Vec<_> = textures.into_iter().collect();
        assert_eq!(
            found,
            vec![
                (sub.clone(), "hull_ddna".to_string()),
                (sub.clone(), "rock".to_string()),
            ]
        );
    }

    #[test]
    fn test_collect_textures_from_fragment_path() {
        let mut textures = BTreeSet::new();
        collect_textures(
            Path::new("data/textures/rock.dds.4"),
            &CombineOptions::default(),
            &mut textures,
        )
        .unwrap();

        assert_eq!(
            textures.into_iter().collect::<Vec<_>>(),
            vec![(PathBuf::from("data/textures"), "rock".to_string())]
        );
    }
}
