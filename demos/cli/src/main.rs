use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{debug, info, warn};
use nalgebra::Vector3;

use tessera::{MeshTree, RefineReport, lod, shapes};

/// Angular speed of the orbiting focus point, in radians per second
const ORBIT_SPEED: f32 = 6.0;

/// Simple test program
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    cmd: Command,

    /// Base solid to refine
    #[clap(short, long, value_enum, default_value_t = Base::Icosahedron)]
    base: Base,
}

#[derive(Subcommand)]
enum Command {
    /// Refine every triangle to the same depth
    Uniform {
        #[clap(flatten)]
        settings: RefineSettings,
    },

    /// Refine towards a single point of interest
    Focus {
        #[clap(flatten)]
        settings: RefineSettings,

        /// Direction of the point of interest
        #[clap(
            long,
            num_args = 3,
            value_names = ["X", "Y", "Z"],
            allow_negative_numbers = true,
            default_values_t = [0.0, 1.0, 0.0]
        )]
        dir: Vec<f32>,
    },

    /// Re-refine once per frame as the point of interest orbits the equator
    Orbit {
        #[clap(flatten)]
        settings: RefineSettings,

        /// Number of frames to simulate
        #[clap(short, long, default_value_t = 60)]
        frames: usize,

        /// Time step between frames, in seconds
        #[clap(long, default_value_t = 1.0 / 30.0)]
        dt: f32,
    },
}

#[derive(ValueEnum, Copy, Clone)]
enum Base {
    Icosahedron,
    Octahedron,
}

#[derive(Parser)]
struct RefineSettings {
    /// Requested subdivision depth (maximum depth for focused refinement)
    #[clap(short, long)]
    depth: u32,

    /// Name of a `.stl` or `.obj` file to write
    #[clap(short, long)]
    out: Option<PathBuf>,

    /// Drop unused vertices before exporting
    #[clap(long)]
    minify: bool,

    /// Check tree invariants and look for cracks after refinement
    #[clap(long)]
    check: bool,

    /// Number of times to refine (for benchmarking)
    #[clap(short = 'N', default_value_t = 1)]
    n: usize,
}

////////////////////////////////////////////////////////////////////////////////

fn build(base: Base) -> Result<MeshTree> {
    let solid = match base {
        Base::Icosahedron => shapes::icosahedron(),
        Base::Octahedron => shapes::octahedron(),
    };
    Ok(MeshTree::new(&solid.vertices, &solid.triangles)?)
}

fn log_report(r: &RefineReport) {
    debug!(
        "{} coarsen / {} refine / {} cleanup passes",
        r.coarsen_passes, r.refine_passes, r.cleanup_passes
    );
}

fn run_orbit(tree: &mut MeshTree, depth: u32, frames: usize, dt: f32) {
    let mut diverged = 0;
    let mut leaves = 0;
    for frame in 0..frames {
        let angle = frame as f32 * dt * ORBIT_SPEED;
        let focus =
            lod::Focus::new(Vector3::new(angle.cos(), 0.0, angle.sin()), depth);
        let r = tree.refine(|t, v| focus.depth(t, v));
        log_report(&r);
        if !r.converged() {
            diverged += 1;
        }
        leaves += tree.leaf_count();
    }
    if frames > 0 {
        info!(
            "Orbit: {:.1} leaves/frame on average",
            leaves as f64 / frames as f64
        );
    }
    if diverged > 0 {
        warn!("{diverged} of {frames} frames did not converge");
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .init();

    let args = Args::parse();
    let settings = match &args.cmd {
        Command::Uniform { settings }
        | Command::Focus { settings, .. }
        | Command::Orbit { settings, .. } => settings,
    };

    // Each repetition refines a fresh tree; construction isn't timed
    let mut tree = build(args.base)?;
    let mut elapsed = Duration::ZERO;
    for i in 0..settings.n {
        if i > 0 {
            tree = build(args.base)?;
        }
        let start = Instant::now();
        match &args.cmd {
            Command::Uniform { settings } => {
                let policy = lod::Uniform(settings.depth);
                log_report(&tree.refine(|t, v| policy.depth(t, v)));
            }
            Command::Focus { settings, dir } => {
                let [x, y, z] = dir[..] else {
                    bail!("expected 3 components for --dir, got {}", dir.len());
                };
                let direction = Vector3::new(x, y, z)
                    .try_normalize(0.0)
                    .ok_or_else(|| anyhow!("focus direction must be nonzero"))?;
                let policy = lod::Focus::new(direction, settings.depth);
                log_report(&tree.refine(|t, v| policy.depth(t, v)));
            }
            Command::Orbit {
                settings,
                frames,
                dt,
            } => run_orbit(&mut tree, settings.depth, *frames, *dt),
        }
        elapsed += start.elapsed();
    }
    let frames = match &args.cmd {
        Command::Orbit { frames, .. } => (*frames).max(1),
        _ => 1,
    };
    info!(
        "Refined {}x at {:?} ms/frame",
        settings.n,
        elapsed.as_micros() as f64
            / 1000.0
            / (settings.n * frames).max(1) as f64
    );
    info!(
        "Tree has {} leaves, {} nodes, {} vertices (max depth {})",
        tree.leaf_count(),
        tree.node_count(),
        tree.vertices().len(),
        tree.max_depth()
    );

    if settings.check {
        tree.check()?;
        let cracks = tree.t_junctions();
        if !cracks.is_empty() {
            bail!("found {} T-junctions", cracks.len());
        }
        info!("Tree is valid and crack-free");
    }

    if settings.minify {
        let n = tree.minify_vertices();
        info!("Minified to {n} vertices");
    }

    if let Some(out) = &settings.out {
        let mesh = tree.mesh();
        match out.extension().and_then(|e| e.to_str()) {
            Some("stl") => {
                info!("Writing STL to {out:?}");
                mesh.write_stl(&mut std::fs::File::create(out)?)?;
            }
            Some("obj") => {
                info!("Writing OBJ to {out:?}");
                mesh.write_obj(&mut std::fs::File::create(out)?)?;
            }
            _ => bail!("unknown output format for {out:?}; use .stl or .obj"),
        }
    }

    Ok(())
}
