use std::fs::File;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use eyre::{Result, WrapErr, eyre};
use itertools::Itertools;
use memmap2::{Mmap, MmapOptions};
use rayon::prelude::*;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use ue3mesh::anim::{AnimSetInput, decode_anim_set};
use ue3mesh::data::{ByteCursor, GameTag, Platform, VersionContext};
use ue3mesh::diagnostics::Diagnostic;
use ue3mesh::models::skeletal::{SkeletalLodParams, decode_skeletal_lods};
use ue3mesh::models::static_mesh::decode_static_mesh;
use ue3mesh::reconstruct::{reconstruct_skeletal_mesh, reconstruct_static_mesh};

/// Decode Unreal Engine 3 mesh and animation records
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log every debug event. `RUST_LOG` takes precedence when set.
    #[clap(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a skeletal LOD array and weld it into points, wedges and faces
    Skeletal {
        #[command(flatten)]
        decode: DecodeArgs,

        /// The owning mesh has `bHasVertexColors` set
        #[clap(long)]
        has_vertex_colors: bool,
    },
    /// Decode the native part of a static mesh object
    Static {
        #[command(flatten)]
        decode: DecodeArgs,
    },
    /// Decompress an animation set described as JSON
    Anim {
        #[command(flatten)]
        decode: DecodeArgs,
    },
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Package format version
    #[clap(short = 'f', long)]
    format_version: i32,

    /// Licensee version
    #[clap(short, long, default_value_t = 0)]
    licensee_version: i32,

    /// Title the package comes from
    #[clap(short, long, default_value = "unreal3", value_parser = parse_game)]
    game: GameTag,

    /// Cook platform. Console platforms are read big-endian.
    #[clap(short, long, default_value = "pc", value_parser = parse_platform)]
    platform: Platform,

    /// Byte offset of the record in each input file
    #[clap(short, long, default_value_t = 0)]
    offset: usize,

    /// Print the decoded model as JSON instead of a summary
    #[clap(long)]
    json: bool,

    /// Record dumps to decode
    #[clap(required = true)]
    inputs: Vec<PathBuf>,
}

impl DecodeArgs {
    fn context(&self) -> VersionContext {
        VersionContext::builder()
            .format_version(self.format_version)
            .licensee_version(self.licensee_version)
            .game(self.game)
            .platform(self.platform)
            .build()
    }
}

fn parse_game(name: &str) -> Result<GameTag, String> {
    GameTag::from_name(name).ok_or_else(|| format!("unknown game `{name}`"))
}

fn parse_platform(name: &str) -> Result<Platform, String> {
    Platform::from_name(name).ok_or_else(|| format!("unknown platform `{name}`"))
}

fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path).wrap_err_with(|| format!("failed to open {}", path.display()))?;
    let mmap = unsafe { MmapOptions::new().map(&file)? };
    Ok(mmap)
}

fn cursor_at<'a>(
    data: &'a [u8],
    args: &DecodeArgs,
    ctx: &VersionContext,
) -> Result<ByteCursor<'a>> {
    let mut cursor = ByteCursor::for_context(data, ctx);
    cursor.seek(args.offset)?;
    Ok(cursor)
}

fn render<T: serde::Serialize>(
    path: &Path,
    json: bool,
    model: &T,
    summary: String,
    diagnostics: &[Diagnostic],
) -> Result<String> {
    if json {
        let value = serde_json::json!({
            "path": path,
            "model": model,
            "diagnostics": diagnostics,
        });
        return Ok(serde_json::to_string_pretty(&value)?);
    }
    let counts = diagnostics
        .iter()
        .counts_by(Diagnostic::kind)
        .into_iter()
        .sorted()
        .map(|(kind, count)| format!("{kind}: {count}"))
        .join(", ");
    if counts.is_empty() {
        Ok(format!("{}: {summary}", path.display()))
    } else {
        Ok(format!("{}: {summary} [{counts}]", path.display()))
    }
}

fn decode_file(path: &Path, command: &Command) -> Result<String> {
    let mmap = map_file(path)?;
    let mut diagnostics: Vec<Diagnostic> = Vec::new();

    match command {
        Command::Skeletal {
            decode,
            has_vertex_colors,
        } => {
            let ctx = decode.context();
            let mut cursor = cursor_at(&mmap, decode, &ctx)?;
            let params = SkeletalLodParams {
                has_vertex_colors: *has_vertex_colors,
            };
            let lods = decode_skeletal_lods(&mut cursor, &ctx, params, &mut diagnostics)?;
            let meshes = reconstruct_skeletal_mesh(&lods, &[], &mut diagnostics);
            let summary = meshes
                .iter()
                .map(|lod| {
                    format!(
                        "{} points, {} wedges, {} faces",
                        lod.points.len(),
                        lod.wedges.len(),
                        lod.faces.len()
                    )
                })
                .join("; ");
            let summary = format!("{} LODs ({summary})", meshes.len());
            render(path, decode.json, &meshes, summary, &diagnostics)
        }
        Command::Static { decode } => {
            let ctx = decode.context();
            let mut cursor = cursor_at(&mmap, decode, &ctx)?;
            let mesh = decode_static_mesh(&mut cursor, &ctx, &mut diagnostics)?;
            let model = reconstruct_static_mesh(&mesh, &mut diagnostics);
            let summary = model
                .lods
                .iter()
                .map(|lod| format!("{} vertices, {} faces", lod.vertices.len(), lod.faces.len()))
                .join("; ");
            let summary = format!("{} LODs ({summary})", model.lods.len());
            render(path, decode.json, &model, summary, &diagnostics)
        }
        Command::Anim { decode } => {
            let ctx = decode.context();
            let data = mmap
                .get(decode.offset..)
                .ok_or_else(|| eyre!("offset {} is past the end of the file", decode.offset))?;
            let input: AnimSetInput =
                serde_json::from_slice(data).wrap_err("animation set is not valid JSON")?;
            let set = decode_anim_set(&input, &ctx, &mut diagnostics)?;
            let summary = format!("{} bones, {} sequences", set.bones.len(), set.sequences.len());
            render(path, decode.json, &set, summary, &diagnostics)
        }
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let inputs = match &args.command {
        Command::Skeletal { decode, .. }
        | Command::Static { decode }
        | Command::Anim { decode } => &decode.inputs,
    };
    debug!(files = inputs.len(), "decoding");

    let results: Vec<(&PathBuf, Result<String>)> = inputs
        .par_iter()
        .map(|path| (path, decode_file(path, &args.command)))
        .collect();

    let mut failed = 0usize;
    for (path, result) in results {
        match result {
            Ok(output) => println!("{output}"),
            Err(e) => {
                error!(path = %path.display(), "{e:?}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(eyre!("{failed} of {} inputs failed to decode", inputs.len()));
    }
    Ok(())
}
