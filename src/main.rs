use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use strata_blocks::{MaterialId, MaterialProperties, MaterialTable};
use strata_chunk::generate_chunk;
use strata_io::SaveRoot;
use strata_runtime::{HeadlessSink, SchedulerSettings, WorldContext, WorldScheduler};
use strata_world::{CHUNK_WIDTH, ChunkCoord, WorldGenConfig, load_config_from_path};

#[derive(Parser)]
#[command(name = "strata", about = "Headless driver for procedural planet worlds")]
struct Cli {
    /// World seed
    #[arg(long, default_value_t = 0, allow_hyphen_values = true, global = true)]
    seed: i32,
    /// Planet number (1-based)
    #[arg(
        long,
        default_value_t = 3,
        value_parser = clap::value_parser!(u32).range(1..),
        global = true
    )]
    planet: u32,
    /// Root directory for saves; nothing is persisted without it
    #[arg(long, global = true)]
    save_dir: Option<PathBuf>,
    /// Worldgen TOML overriding the built-in defaults
    #[arg(long, global = true)]
    worldgen: Option<PathBuf>,
    /// Material table TOML replacing the built-in table
    #[arg(long, global = true)]
    materials: Option<PathBuf>,
    /// Default the log level to debug
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load and mesh every chunk around the origin, then save
    Generate {
        /// Load radius in chunks
        #[arg(long, default_value_t = 2)]
        radius: i32,
        /// Frame limit before giving up on reaching idle
        #[arg(long, default_value_t = 10_000)]
        frames: usize,
        /// Generate on the main thread instead of the worker
        #[arg(long)]
        cooperative: bool,
        /// Scheduler settings TOML; `--radius` still sets the distances
        #[arg(long)]
        scheduler: Option<PathBuf>,
    },
    /// Print column heights and surface materials for one chunk
    Inspect {
        #[arg(long, allow_hyphen_values = true)]
        cx: i32,
        #[arg(long, allow_hyphen_values = true)]
        cz: i32,
    },
    /// Set one voxel in the chunk that owns it, then save
    Edit {
        #[arg(long, allow_hyphen_values = true)]
        x: i32,
        #[arg(long)]
        y: i32,
        #[arg(long, allow_hyphen_values = true)]
        z: i32,
        /// Material id to write
        #[arg(long)]
        material: u8,
    },
    /// Write the join payload for every persisted chunk to stdout
    Payload,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn build_context(cli: &Cli) -> Result<Arc<WorldContext>, Box<dyn Error>> {
    let cfg = match &cli.worldgen {
        Some(path) => load_config_from_path(path)?,
        None => WorldGenConfig::default(),
    };
    let materials: Arc<dyn MaterialProperties> = match &cli.materials {
        Some(path) => Arc::new(MaterialTable::from_path(path)?),
        None => Arc::new(MaterialTable::builtin()),
    };
    let save = cli
        .save_dir
        .as_ref()
        .map(|root| SaveRoot::new(root, cli.seed, cli.planet));
    Ok(Arc::new(WorldContext::new(
        cli.seed, cli.planet, &cfg, materials, save, false,
    )?))
}

fn generate(
    ctx: Arc<WorldContext>,
    radius: i32,
    frames: usize,
    cooperative: bool,
    scheduler: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let mut settings = match scheduler {
        Some(path) => SchedulerSettings::from_path(path)?,
        None => SchedulerSettings::default(),
    };
    settings.draw_distance = radius;
    settings.load_distance = radius;
    settings.undraw_distance = radius + 1;
    settings.cooperative |= cooperative;

    let mut world = WorldScheduler::new(ctx, settings, HeadlessSink::new())?;
    let idle = world.run_until_idle(&[(0.0, 0.0)], frames);
    if !idle {
        log::warn!("still busy after {frames} frames");
    }
    let stats = world.stats();
    log::info!(
        "{} chunks resident ({} generated, {} restored), {} meshes live, {} stale drops",
        world.resident().len(),
        stats.generated,
        stats.restored,
        world.sink().live_count(),
        stats.stale_meshes
    );
    let tris: usize = world.sink().live().map(|m| m.triangles).sum();
    println!(
        "resident={} meshes={} triangles={tris}",
        world.resident().len(),
        world.sink().live_count()
    );
    if world.context().save.is_some() {
        let report = world.save_blocking();
        log::info!(
            "saved metadata and {} chunks ({} failed)",
            report.written.len(),
            report.failed.len()
        );
    }
    Ok(())
}

fn edit(ctx: Arc<WorldContext>, pos: (i32, i32, i32), material: u8) -> Result<(), Box<dyn Error>> {
    let (x, y, z) = pos;
    let settings = SchedulerSettings {
        draw_distance: 0,
        load_distance: 0,
        undraw_distance: 1,
        cooperative: true,
        ..SchedulerSettings::default()
    };
    let mut world = WorldScheduler::new(ctx, settings, HeadlessSink::new())?;
    let viewer = (x as f32 + 0.5, z as f32 + 0.5);
    if !world.run_until_idle(&[viewer], 1_000) {
        return Err(format!("chunk owning {pos:?} did not load").into());
    }
    let outcome = world.edit_voxel(x, y, z, MaterialId(material));
    println!("{pos:?} -> {material}: {outcome:?}");
    if world.context().save.is_some() {
        let report = world.save_blocking();
        if !report.is_ok() {
            return Err(format!("{} chunks failed to save", report.failed.len()).into());
        }
    } else {
        log::warn!("no --save-dir given; the edit is not persisted");
    }
    Ok(())
}

fn inspect(ctx: &WorldContext, coord: ChunkCoord) {
    let sampler = &ctx.sampler;
    if !sampler.chunk_in_bounds(coord) {
        println!("{coord:?} lies outside the world");
        return;
    }
    let generated = generate_chunk(sampler, coord);
    let heights = sampler.column_heights(coord);
    let biome = sampler.biome_at(coord.base_x());
    println!(
        "chunk {},{} biome={} habitable={} structure_jobs={}",
        coord.cx,
        coord.cz,
        biome.name,
        ctx.params().profile.habitable,
        generated.structure_jobs.len()
    );
    println!("heights (rows are z, columns are x):");
    for row in heights.chunks(CHUNK_WIDTH) {
        let line: Vec<String> = row.iter().map(|h| format!("{h:3}")).collect();
        println!("{}", line.join(""));
    }
    println!("surface materials:");
    let (sx, sy, sz) = generated.grid.dims();
    for z in 0..sz {
        let line: Vec<String> = (0..sx)
            .map(|x| {
                let top = (0..sy)
                    .rev()
                    .map(|y| generated.grid.get_local(x, y, z).material)
                    .find(|m| !m.is_air() && m.0 != ctx.params().clouds.material.0);
                format!("{:3}", top.map_or(0, |m| m.0))
            })
            .collect();
        println!("{}", line.join(""));
    }
    let c = &generated.counters;
    println!(
        "voxels={} air_short_circuits={} spline_evals={} carve_tests={} lode_tests={}",
        c.voxels, c.air_short_circuits, c.spline_evals, c.carve_tests, c.lode_tests
    );
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let ctx = build_context(&cli)?;

    match cli.command {
        Command::Generate {
            radius,
            frames,
            cooperative,
            scheduler,
        } => generate(ctx, radius, frames, cooperative, scheduler)?,
        Command::Inspect { cx, cz } => inspect(&ctx, ChunkCoord::new(cx, cz)),
        Command::Edit { x, y, z, material } => edit(ctx, (x, y, z), material)?,
        Command::Payload => {
            let Some(save) = &ctx.save else {
                return Err("payload needs --save-dir".into());
            };
            println!("{}", save.join_payload()?);
        }
    }
    Ok(())
}
