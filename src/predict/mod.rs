pub mod engine;
pub mod status;

pub use engine::{predict, PredictError, Predictions, TripPrediction};
pub use status::{BlockStatus, TripStatus};
