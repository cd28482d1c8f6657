use clap::Parser;
use disparity_velocity::cli::{Args, Command};
use disparity_velocity::error::Result;
use disparity_velocity::io::WriteOptions;
use disparity_velocity::matches::MatchTable;
use disparity_velocity::timeseries::{extract_time_series, Region, TimeSeriesOptions};
use disparity_velocity::units::TemporalBaseline;
use disparity_velocity::velocity::{self, VelocityOptions};
use disparity_velocity::{stack, VelocityError};
use env_logger::Env;
use log::{info, warn};

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Set thread pool size if specified
    if let Some(n_threads) = args.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()
        {
            warn!("Could not configure thread pool: {}", e);
        } else {
            info!("Using {} threads", n_threads);
        }
    } else {
        info!("Using all available threads");
    }

    let write_options = WriteOptions::new(&args.compress, args.tile_size)?;

    match args.command {
        Command::Pair(pair) => {
            let dt = TemporalBaseline::from_days(pair.dt);
            let options = VelocityOptions {
                resolution: pair.resolution,
                median_shift: pair.median_shift,
            };
            info!("Reading disparity map: {}", pair.input.display());
            let (field, metadata) = velocity::velocity_from_file(&pair.input, dt, options)?;
            info!(
                "Raster size: {}x{}, resolution {:.3}",
                metadata.width,
                metadata.height,
                options.resolution.unwrap_or_else(|| metadata.resolution())
            );
            let output = pair
                .output
                .unwrap_or_else(|| velocity::default_velocity_path(&pair.input));
            velocity::write_velocity(&output, &field, &metadata, &write_options)?;
        }
        Command::Velocity(batch) => {
            let table = MatchTable::from_csv(&batch.matches)?;
            velocity::compute_velocity_batch(
                &table,
                &batch.prefix_ext,
                batch.overwrite,
                !batch.no_median_shift,
                &write_options,
            )?;
        }
        Command::Stats(stats) => {
            let table = MatchTable::from_csv(&stats.matches)?;
            let mut region = match (stats.aoi, stats.x, stats.y) {
                (Some(aoi), _, _) => Region::aoi(aoi, stats.invert),
                (None, Some(x), Some(y)) => Region::Pixel {
                    x,
                    y,
                    pad: stats.pad,
                },
                _ => {
                    return Err(VelocityError::MissingArgument(
                        "either --aoi or both --x and --y",
                    ))
                }
            };
            let options = TimeSeriesOptions {
                prefix_ext: stats.prefix_ext,
                max_dt: stats.max_dt,
                take_velocity: !stats.raw,
            };
            extract_time_series(&table, &mut region, &options)?;
        }
        Command::Stack(stack_args) => {
            let table = MatchTable::from_csv(&stack_args.matches)?;
            let out = stack::stack_rasters(
                &table,
                stack_args.what,
                &stack_args.prefix_ext,
                stack_args.median_shift,
                &write_options,
            )?;
            info!("Composite written to {}", out.display());
        }
    }

    info!("=== Done! ===");
    Ok(())
}
