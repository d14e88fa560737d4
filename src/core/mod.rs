pub mod batcher;
pub mod feedforward;
pub mod fire;
pub mod inference;
pub mod init;
pub mod layers;
pub mod model;
pub mod net_config;
pub mod nvidia;
pub mod registry;
pub mod squeezenet;
pub mod squeezenet_lstm;

pub use batcher::{DrivingBatcher, DrivingSample};
pub use inference::{InferenceEngine, Prediction};
pub use model::{DrivingInput, DrivingNet, DrivingOutput};
pub use net_config::{NetConfig, NetKind};
pub use registry::AnyNet;
