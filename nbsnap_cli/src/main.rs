use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use serde::Deserialize;

use nbsnap_core::{
    ByteOrder, CreateOptions, FieldMask, FrameSource, FrameStatus, Manipulator, OpenOptions,
    SnapFileReader, SnapshotOut, TagSource,
};
use nbsnap_manips::{manip_by_name, stack_frames, Periodic};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "nbsnap",
    about = "Inspect, recentre, stack and convert NBSNAP1 N-body snapshot files",
    version
)]
struct Cli {
    /// Byte order the input files were written in: native | little | big
    #[arg(long, global = true)]
    byte_order: Option<String>,
    /// Skip body checksum verification
    #[arg(long, global = true)]
    no_verify: bool,
    /// JSON file with `read` / `write` option blocks
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a summary of every frame in a snapshot file
    Inspect {
        file: PathBuf,
        /// Print one line per frame
        #[arg(long)]
        frames: bool,
    },
    /// Move every frame to its centre-of-mass frame
    Recenter {
        input: PathBuf,
        output: PathBuf,
        /// Only recentre frames at least this much simulation time apart
        #[arg(long)]
        every: Option<f64>,
    },
    /// Stack two systems on top of each other (first frame of each)
    Stack {
        in1: PathBuf,
        in2: PathBuf,
        output: PathBuf,
        /// Position offset of the second system, "x,y,z"
        #[arg(long, default_value = "0,0,0", allow_hyphen_values = true)]
        deltar: String,
        /// Velocity offset of the second system, "vx,vy,vz"
        #[arg(long, default_value = "0,0,0", allow_hyphen_values = true)]
        deltav: String,
        /// Keep the combined centre of mass where it falls
        #[arg(long)]
        no_zero_com: bool,
    },
    /// Rewrite a snapshot file in another byte order
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Target byte order: native | little | big
        #[arg(long)]
        to: String,
    },
    /// Run a bundled manipulator over every frame
    Apply {
        input: PathBuf,
        output: PathBuf,
        /// Manipulator name: com_shift | shift
        #[arg(short, long)]
        manip: String,
        /// Numeric parameters, comma separated
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        params: Vec<f64>,
        #[arg(long)]
        every: Option<f64>,
    },
}

/// Contents of `--config`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ToolConfig {
    read: OpenOptions,
    write: CreateOptions,
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn parse_order(s: &str) -> anyhow::Result<ByteOrder> {
    ByteOrder::parse(s)
        .with_context(|| format!("unknown byte order '{s}'. Valid options: native, little, big"))
}

/// Parse "x,y,z" (comma or space separated). Missing components are 0.
fn parse_vec3(s: &str) -> anyhow::Result<[f32; 3]> {
    let parts: Vec<&str> = s
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() > 3 {
        anyhow::bail!("expected at most 3 components, got '{s}'");
    }
    let mut v = [0.0f32; 3];
    for (dst, part) in v.iter_mut().zip(parts) {
        *dst = part
            .parse()
            .with_context(|| format!("'{part}' is not a number"))?;
    }
    Ok(v)
}

fn load_config(cli: &Cli) -> anyhow::Result<ToolConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {:?}", path))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config file {:?}", path))?
        }
        None => ToolConfig::default(),
    };
    if let Some(order) = &cli.byte_order {
        config.read.byte_order = parse_order(order)?;
    }
    if cli.no_verify {
        config.read.verify_checksum = false;
    }
    Ok(config)
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn open_source(
    path: &Path,
    options: &OpenOptions,
) -> anyhow::Result<FrameSource<SnapFileReader<std::io::BufReader<std::fs::File>>>> {
    FrameSource::open(path, options).with_context(|| format!("opening snapshot {:?}", path))
}

/// Pull every frame of `input`, run `manip` on it and write it to `output`.
fn pipe_frames(
    input: &Path,
    output: &Path,
    config: &ToolConfig,
    manip: &mut dyn Manipulator,
) -> anyhow::Result<(u64, u64)> {
    let mut src = open_source(input, &config.read)?;
    let mut out = SnapshotOut::create(output, &config.write)
        .with_context(|| format!("creating output file {:?}", output))?;
    let (mut frames, mut touched) = (0u64, 0u64);
    loop {
        let status = src
            .next_frame_all()
            .with_context(|| format!("reading frame {} of {:?}", frames, input))?;
        if !status.is_ready() {
            break;
        }
        if manip
            .manipulate(src.frame_mut())
            .with_context(|| format!("{} on frame {}", manip.name(), frames))?
        {
            touched += 1;
        }
        out.write_frame(src.frame())?;
        frames += 1;
    }
    out.close()?;
    Ok((frames, touched))
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_inspect(file: PathBuf, show_frames: bool, config: &ToolConfig) -> anyhow::Result<()> {
    let mut reader = SnapFileReader::open(&file, &config.read)
        .with_context(|| format!("opening snapshot {:?}", file))?;
    let file_size = std::fs::metadata(&file)?.len();

    let mut rows = Vec::new();
    while reader
        .next_set()
        .with_context(|| format!("reading frame {} of {:?}", rows.len(), file))?
    {
        if let Some(h) = reader.header() {
            rows.push(*h);
        }
    }

    println!("=== NBSNAP1 File: {:?} ===", file);
    println!();
    println!("  byte order     : {:?}", config.read.byte_order);
    println!("  file on disk   : {}", human_bytes(file_size));
    println!("  frames         : {}", rows.len());
    if let (Some(first), Some(last)) = (rows.first(), rows.last()) {
        let nmin = rows.iter().map(|h| h.nbody).min().unwrap_or(0);
        let nmax = rows.iter().map(|h| h.nbody).max().unwrap_or(0);
        let fields = rows
            .iter()
            .fold(FieldMask::empty(), |acc, h| FieldMask::from_bits(acc.bits() | h.mask.bits()));
        println!("  particles      : {} .. {}", nmin, nmax);
        println!("  time           : {} .. {}", first.time, last.time);
        println!("  fields seen    : {}", fields);
    }

    if show_frames {
        println!();
        println!(
            "  {:>6}  {:>12}  {:>10}  {:>12}  {:>16}  fields",
            "frame", "time", "nbody", "body", "checksum"
        );
        println!("  {}", "-".repeat(72));
        for (i, h) in rows.iter().enumerate() {
            let time = if h.mask.has(FieldMask::TIME) {
                format!("{}", h.time)
            } else {
                "-".to_string()
            };
            println!(
                "  {:>6}  {:>12}  {:>10}  {:>12}  {:016x}  {}",
                i,
                time,
                h.nbody,
                human_bytes(h.body_len),
                h.checksum,
                h.mask
            );
        }
    }
    Ok(())
}

fn run_recenter(
    input: PathBuf,
    output: PathBuf,
    every: Option<f64>,
    config: &ToolConfig,
) -> anyhow::Result<()> {
    run_apply(input, output, "com_shift", &[], every, config)
}

fn run_apply(
    input: PathBuf,
    output: PathBuf,
    name: &str,
    params: &[f64],
    every: Option<f64>,
    config: &ToolConfig,
) -> anyhow::Result<()> {
    let manip = manip_by_name(name, params)?;
    let mut manip: Box<dyn Manipulator> = match every {
        Some(step) => Box::new(Periodic::new(manip, step)),
        None => manip,
    };
    info!("{}", manip.describe());

    let t0 = Instant::now();
    let (frames, touched) = pipe_frames(&input, &output, config, manip.as_mut())?;
    eprintln!("  manipulator : {}", manip.describe());
    eprintln!("  frames      : {}", frames);
    eprintln!("  modified    : {}", touched);
    eprintln!("  elapsed     : {:.3}s", t0.elapsed().as_secs_f64());
    Ok(())
}

fn run_stack(
    in1: PathBuf,
    in2: PathBuf,
    output: PathBuf,
    deltar: &str,
    deltav: &str,
    zero_com: bool,
    config: &ToolConfig,
) -> anyhow::Result<()> {
    let deltar = parse_vec3(deltar).context("--deltar")?;
    let deltav = parse_vec3(deltav).context("--deltav")?;

    let mut a = open_source(&in1, &config.read)?;
    let mut b = open_source(&in2, &config.read)?;
    for (src, path) in [(&mut a, &in1), (&mut b, &in2)] {
        let status = src
            .next_frame_all()
            .with_context(|| format!("reading {:?}", path))?;
        if status == FrameStatus::EndOfStream || status == FrameStatus::NoParticles {
            anyhow::bail!("{:?} holds no particle data", path);
        }
    }

    let stacked = stack_frames(a.frame(), b.frame(), deltar, deltav, zero_com)?;
    let mut out = SnapshotOut::create(&output, &config.write)
        .with_context(|| format!("creating output file {:?}", output))?;
    out.write_frame(&stacked)?;
    out.close()?;

    eprintln!("  nbody       : {} + {} = {}", a.frame().nbody(), b.frame().nbody(), stacked.nbody());
    eprintln!("  fields      : {}", stacked.mask());
    eprintln!("  time        : {}", stacked.time());
    Ok(())
}

fn run_convert(
    input: PathBuf,
    output: PathBuf,
    to: &str,
    config: &ToolConfig,
) -> anyhow::Result<()> {
    let write = config.write.byte_order(parse_order(to)?);

    let mut src = open_source(&input, &config.read)?;
    let mut out = SnapshotOut::create(&output, &write)
        .with_context(|| format!("creating output file {:?}", output))?;
    let mut frames = 0u64;
    while src
        .next_frame_all()
        .with_context(|| format!("reading frame {} of {:?}", frames, input))?
        .is_ready()
    {
        out.write_frame(src.frame())?;
        frames += 1;
    }
    out.close()?;

    eprintln!("  frames      : {}", frames);
    eprintln!(
        "  byte order  : {:?} -> {:?}",
        config.read.byte_order, write.byte_order
    );
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    match cli.command {
        Commands::Inspect { file, frames } => run_inspect(file, frames, &config),
        Commands::Recenter {
            input,
            output,
            every,
        } => run_recenter(input, output, every, &config),
        Commands::Stack {
            in1,
            in2,
            output,
            deltar,
            deltav,
            no_zero_com,
        } => run_stack(in1, in2, output, &deltar, &deltav, !no_zero_com, &config),
        Commands::Convert { input, output, to } => run_convert(input, output, &to, &config),
        Commands::Apply {
            input,
            output,
            manip,
            params,
            every,
        } => run_apply(input, output, &manip, &params, every, &config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbsnap_core::Field;

    fn write_sample(path: &Path) {
        let mut out = SnapshotOut::create(path, &CreateOptions::default()).unwrap();
        for t in [0.0, 1.0] {
            out.set_time(t);
            out.set_real_copy(Field::Pos, &[0.0, 0.0, 0.0, 4.0, 0.0, 0.0]).unwrap();
            out.set_real_copy(Field::Mass, &[1.0, 1.0]).unwrap();
            out.save().unwrap();
        }
        out.close().unwrap();
    }

    #[test]
    fn test_parse_vec3() {
        assert_eq!(parse_vec3("1,2,3").unwrap(), [1.0, 2.0, 3.0]);
        assert_eq!(parse_vec3("1.5").unwrap(), [1.5, 0.0, 0.0]);
        assert_eq!(parse_vec3("-1 0 2").unwrap(), [-1.0, 0.0, 2.0]);
        assert!(parse_vec3("1,2,3,4").is_err());
        assert!(parse_vec3("a,b").is_err());
    }

    #[test]
    fn test_config_json() {
        let config: ToolConfig =
            serde_json::from_str(r#"{"read": {"byte_order": "big"}, "write": {"byte_order": "little"}}"#)
                .unwrap();
        assert_eq!(config.read.byte_order, ByteOrder::Big);
        assert!(config.read.verify_checksum);
        assert_eq!(config.write.byte_order, ByteOrder::Little);

        let empty: ToolConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.read, OpenOptions::default());
    }

    #[test]
    fn test_convert_then_recenter() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.nbs");
        let foreign = dir.path().join("foreign.nbs");
        let centred = dir.path().join("centred.nbs");
        write_sample(&input);

        let to = if cfg!(target_endian = "little") { "big" } else { "little" };
        run_convert(input.clone(), foreign.clone(), to, &ToolConfig::default()).unwrap();

        let read_foreign = ToolConfig {
            read: OpenOptions::default().byte_order(parse_order(to).unwrap()),
            write: CreateOptions::default(),
        };
        run_recenter(foreign, centred.clone(), Some(1.0), &read_foreign).unwrap();

        let mut src = FrameSource::open(&centred, &OpenOptions::default()).unwrap();
        for t in [0.0, 1.0] {
            assert!(src.next_frame_all().unwrap().is_ready());
            assert_eq!(src.frame().time(), t);
            assert_eq!(
                src.frame().pos(),
                Some(&[-2.0, 0.0, 0.0, 2.0, 0.0, 0.0][..])
            );
        }
    }

    #[test]
    fn test_stack_command() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.nbs");
        let output = dir.path().join("stacked.nbs");
        write_sample(&input);

        run_stack(
            input.clone(),
            input,
            output.clone(),
            "10,0,0",
            "0",
            false,
            &ToolConfig::default(),
        )
        .unwrap();

        let mut src = FrameSource::open(&output, &OpenOptions::default()).unwrap();
        assert_eq!(src.full_nbody(), 4);
        src.next_frame_all().unwrap();
        assert_eq!(
            src.frame().pos(),
            Some(&[0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 10.0, 0.0, 0.0, 14.0, 0.0, 0.0][..])
        );
        assert_eq!(src.frame().mass().map(<[f32]>::len), Some(4));
    }

    #[test]
    fn test_unknown_manipulator() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.nbs");
        write_sample(&input);
        let err = run_apply(
            input,
            dir.path().join("out.nbs"),
            "density",
            &[],
            None,
            &ToolConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown manipulator"));
    }
}
