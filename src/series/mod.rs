pub mod climatology;
pub mod time_series;
