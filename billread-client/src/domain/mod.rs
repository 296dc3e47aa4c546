mod dataset;
mod grid_reading;

pub use dataset::CombinedDataset;
pub use grid_reading::GridReading;
