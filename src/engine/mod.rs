pub mod aggregate;
pub mod climatology;
pub mod gap_fill;
pub mod interpolate;
pub mod metadata;
pub mod rolling;
