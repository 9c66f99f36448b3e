pub mod encoder;
pub mod features;
pub mod forest;
pub mod metrics;
pub mod predictor;
pub mod scaler;
pub mod search;
pub mod trainer;

pub use encoder::UnknownCategoryPolicy;
pub use metrics::EvaluationReport;
pub use predictor::{predict, MatchInfo, Prediction};
pub use search::ParamGrid;
pub use trainer::{train, TrainedModel, TrainingConfig};
