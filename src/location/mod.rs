pub mod geo;
pub mod speed;

pub use speed::{LocationFix, SpeedEstimator, SpeedSource, SpeedState, SpeedUpdate};
