// Library exports for testing and reuse

pub mod aoi;
pub mod circular;
pub mod cli;
pub mod crs;
pub mod error;
pub mod io;
pub mod matches;
pub mod stack;
pub mod stats;
pub mod timeseries;
pub mod units;
pub mod velocity;

// Re-export commonly used types
pub use error::{Result, VelocityError};
pub use io::{read_bands, write_multiband_output, RasterMetadata, WriteOptions};
pub use matches::{MatchRecord, MatchTable};
pub use stack::{reduce_stack, stack_rasters, Composite, Reduction, StackQuantity};
pub use stats::{mask_stats, pixel_stats, SampleUnits, StatSummary};
pub use timeseries::{extract_time_series, Region, StatsTable, TimeSeriesOptions};
pub use units::TemporalBaseline;
pub use velocity::{compute_velocity, compute_velocity_batch, OffsetRaster, VelocityField, VelocityOptions};
