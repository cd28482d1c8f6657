use crate::stack::StackQuantity;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "disp-velocity")]
#[command(about = "Velocity, statistics and stacks from stereo-correlation disparity maps")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Number of threads (default: all available)
    #[arg(short, long, global = true, value_name = "N")]
    pub threads: Option<usize>,

    /// GeoTIFF compression for written rasters (DEFLATE, LZW, ZSTD, NONE)
    #[arg(long, global = true, default_value = "DEFLATE")]
    pub compress: String,

    /// GeoTIFF tile size, a multiple of 16
    #[arg(long, global = true, default_value_t = 256)]
    pub tile_size: usize,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert one disparity map to velocity and direction
    Pair(PairArgs),
    /// Convert the disparity maps of every pair in a match table
    Velocity(VelocityArgs),
    /// Extract per-pair statistics in an AOI or around a pixel
    Stats(StatsArgs),
    /// Average one derived quantity over all pairs
    Stack(StackArgs),
}

#[derive(ClapArgs, Debug)]
pub struct PairArgs {
    /// Disparity GeoTIFF (band 1 dx, band 2 dy, optional band 3 validity)
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Days between reference and secondary acquisition (negative if secondary is older)
    #[arg(long, value_name = "DAYS", allow_hyphen_values = true)]
    pub dt: i64,

    /// Ground resolution override (default: read from geotransform)
    #[arg(long, value_name = "UNITS")]
    pub resolution: Option<f64>,

    /// Subtract the median offset of each band
    #[arg(long)]
    pub median_shift: bool,

    /// Output GeoTIFF (default: <input stem>_velocity.tif)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct VelocityArgs {
    /// Match table CSV with `ref` and `sec` columns
    #[arg(short, long, value_name = "FILE")]
    pub matches: PathBuf,

    /// Extension appended to disparity file prefixes
    #[arg(long, default_value = "")]
    pub prefix_ext: String,

    /// Recompute existing velocity rasters
    #[arg(long)]
    pub overwrite: bool,

    /// Keep the per-band median offset
    #[arg(long)]
    pub no_median_shift: bool,
}

#[derive(ClapArgs, Debug)]
pub struct StatsArgs {
    /// Match table CSV with `ref` and `sec` columns
    #[arg(short, long, value_name = "FILE")]
    pub matches: PathBuf,

    /// Vector AOI (e.g. GeoJSON) in the rasters' CRS
    #[arg(long, value_name = "FILE", conflicts_with_all = ["x", "y"], required_unless_present_all = ["x", "y"])]
    pub aoi: Option<PathBuf>,

    /// Sample outside the AOI instead of inside
    #[arg(long, requires = "aoi")]
    pub invert: bool,

    /// Pixel column
    #[arg(short, long, requires = "y")]
    pub x: Option<usize>,

    /// Pixel row
    #[arg(short, long, requires = "x")]
    pub y: Option<usize>,

    /// Pixels added on each side of the sampled pixel
    #[arg(long, default_value_t = 0)]
    pub pad: usize,

    /// Extension appended to disparity file prefixes
    #[arg(long, default_value = "")]
    pub prefix_ext: String,

    /// Skip pairs with a longer baseline (days)
    #[arg(long, value_name = "DAYS")]
    pub max_dt: Option<i64>,

    /// Use raw dx/dy displacement instead of velocity rasters
    #[arg(long)]
    pub raw: bool,
}

#[derive(ClapArgs, Debug)]
pub struct StackArgs {
    /// Match table CSV with `ref` and `sec` columns
    #[arg(short, long, value_name = "FILE")]
    pub matches: PathBuf,

    /// Quantity to stack: dx, dy, velocity or direction
    #[arg(short, long, default_value = "velocity")]
    pub what: StackQuantity,

    /// Extension appended to disparity file prefixes
    #[arg(long, default_value = "")]
    pub prefix_ext: String,

    /// Subtract each raster's median offset (dx/dy only)
    #[arg(long)]
    pub median_shift: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stack() {
        let args = Args::parse_from(["disp-velocity", "stack", "-m", "m.csv", "-w", "direction"]);
        match args.command {
            Command::Stack(stack) => assert_eq!(stack.what, StackQuantity::Direction),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_stats_needs_region() {
        assert!(Args::try_parse_from(["disp-velocity", "stats", "-m", "m.csv"]).is_err());
        assert!(Args::try_parse_from(["disp-velocity", "stats", "-m", "m.csv", "-x", "3"]).is_err());
        assert!(
            Args::try_parse_from(["disp-velocity", "stats", "-m", "m.csv", "-x", "3", "-y", "4"])
                .is_ok()
        );
    }

    #[test]
    fn test_negative_baseline() {
        let args =
            Args::try_parse_from(["disp-velocity", "pair", "-i", "d.tif", "--dt", "-30"]).unwrap();
        match args.command {
            Command::Pair(pair) => assert_eq!(pair.dt, -30),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
