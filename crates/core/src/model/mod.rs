pub mod forest;
pub mod gateway;
pub mod imputer;

pub use gateway::{ClassifierGateway, ModelArtifact, ModelStatus, TrainReport, MIN_TRAINING_SAMPLES};
