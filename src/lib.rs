pub mod analysis;
pub mod config;
pub mod error;
pub mod experiment;
pub mod export;
pub mod fetch;
pub mod history;
pub mod pipeline;
pub mod preprocess;
pub mod subsample;

pub use error::PreprocessError;
pub use preprocess::{preprocess, Dataset, Preprocessor, RawRecord, TrainingExample};
