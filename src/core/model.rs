use super::net_config::NetConfig;
use burn::prelude::*;

/// Channels contributed by one time step: a stereo pair of RGB images.
pub const CHANNELS_PER_FRAME: usize = 6;
pub const FRAME_HEIGHT: usize = 94;
pub const FRAME_WIDTH: usize = 168;

pub const METADATA_CHANNELS: usize = 8;
pub const METADATA_HEIGHT: usize = 23;
pub const METADATA_WIDTH: usize = 41;

/// Steering and motor.
pub const CONTROLS_PER_STEP: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Shape mismatch for {input}: expected {expected:?}, got {actual:?}")]
    Shape {
        input: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("Missing required input: {0}")]
    MissingInput(&'static str),
}

/// Everything a network may consume for one batch.
///
/// - `camera`: `[batch, CHANNELS_PER_FRAME * n_frames, FRAME_HEIGHT, FRAME_WIDTH]`
/// - `metadata`: `[batch, METADATA_CHANNELS, METADATA_HEIGHT, METADATA_WIDTH]`
/// - `previous_controls`: `[batch, CONTROLS_PER_STEP * n_frames]`
#[derive(Clone, Debug)]
pub struct DrivingInput<B: Backend> {
    pub camera: Tensor<B, 4>,
    pub metadata: Option<Tensor<B, 4>>,
    pub previous_controls: Option<Tensor<B, 2>>,
}

impl<B: Backend> DrivingInput<B> {
    pub fn new(camera: Tensor<B, 4>) -> Self {
        Self {
            camera,
            metadata: None,
            previous_controls: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Tensor<B, 4>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_previous_controls(mut self, previous_controls: Tensor<B, 2>) -> Self {
        self.previous_controls = Some(previous_controls);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.camera.dims()[0]
    }

    /// Check every present input against the shapes a net with `n_frames` expects.
    /// Optional inputs are only required when the corresponding flag is set, but are
    /// always shape-checked when present.
    pub fn validate(
        &self,
        n_frames: usize,
        requires_metadata: bool,
        requires_controls: bool,
    ) -> Result<(), Error> {
        let batch = self.batch_size();

        check_dims(
            "camera",
            &[
                batch,
                CHANNELS_PER_FRAME * n_frames,
                FRAME_HEIGHT,
                FRAME_WIDTH,
            ],
            &self.camera.dims(),
        )?;

        match &self.metadata {
            Some(metadata) => check_dims(
                "metadata",
                &[batch, METADATA_CHANNELS, METADATA_HEIGHT, METADATA_WIDTH],
                &metadata.dims(),
            )?,
            None if requires_metadata => return Err(Error::MissingInput("metadata")),
            None => {}
        }

        match &self.previous_controls {
            Some(controls) => check_dims(
                "previous_controls",
                &[batch, CONTROLS_PER_STEP * n_frames],
                &controls.dims(),
            )?,
            None if requires_controls => return Err(Error::MissingInput("previous_controls")),
            None => {}
        }

        Ok(())
    }
}

fn check_dims(input: &'static str, expected: &[usize], actual: &[usize]) -> Result<(), Error> {
    if expected != actual {
        return Err(Error::Shape {
            input,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

/// What a network predicts.
#[derive(Clone, Debug)]
pub enum DrivingOutput<B: Backend> {
    /// Control values per future step: `[batch, n_steps, CONTROLS_PER_STEP]`.
    Trajectory(Tensor<B, 3>),
    /// Log-probabilities over discretized bins, `[batch, bins]` each.
    Discrete {
        steering: Tensor<B, 2>,
        controls: Tensor<B, 2>,
    },
}

impl<B: Backend> DrivingOutput<B> {
    /// Shape of every output head, in declaration order.
    pub fn shapes(&self) -> Vec<Vec<usize>> {
        match self {
            DrivingOutput::Trajectory(trajectory) => vec![trajectory.dims().to_vec()],
            DrivingOutput::Discrete { steering, controls } => {
                vec![steering.dims().to_vec(), controls.dims().to_vec()]
            }
        }
    }

    pub fn into_trajectory(self) -> Option<Tensor<B, 3>> {
        match self {
            DrivingOutput::Trajectory(trajectory) => Some(trajectory),
            DrivingOutput::Discrete { .. } => None,
        }
    }
}

/// Trait implemented by every driving network.
pub trait DrivingNet<B: Backend>: Module<B> + Sized {
    const NAME: &'static str;
    const REQUIRES_METADATA: bool = false;
    const REQUIRES_CONTROLS: bool = false;

    fn init(config: &NetConfig, device: &B::Device) -> Self;

    fn n_frames(&self) -> usize;

    fn n_steps(&self) -> usize;

    fn forward(&self, input: DrivingInput<B>) -> Result<DrivingOutput<B>, Error>;

    fn check(&self, input: &DrivingInput<B>) -> Result<(), Error> {
        input.validate(
            self.n_frames(),
            Self::REQUIRES_METADATA,
            Self::REQUIRES_CONTROLS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::backend::ndarray::NdArrayDevice;

    type B = NdArray;

    fn camera(batch: usize, n_frames: usize) -> Tensor<B, 4> {
        Tensor::zeros(
            [
                batch,
                CHANNELS_PER_FRAME * n_frames,
                FRAME_HEIGHT,
                FRAME_WIDTH,
            ],
            &NdArrayDevice::default(),
        )
    }

    #[test]
    fn test_camera_only_input_is_valid_without_requirements() {
        let input = DrivingInput::new(camera(2, 3));
        assert!(input.validate(3, false, false).is_ok());
        assert_eq!(input.batch_size(), 2);
    }

    #[test]
    fn test_wrong_frame_count_is_rejected() {
        let input = DrivingInput::new(camera(1, 2));
        match input.validate(3, false, false) {
            Err(Error::Shape {
                input, expected, ..
            }) => {
                assert_eq!(input, "camera");
                assert_eq!(expected, vec![1, 18, FRAME_HEIGHT, FRAME_WIDTH]);
            }
            other => panic!("expected shape error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_metadata_is_reported() {
        let input = DrivingInput::new(camera(1, 1));
        assert!(matches!(
            input.validate(1, true, false),
            Err(Error::MissingInput("metadata"))
        ));
    }

    #[test]
    fn test_missing_controls_is_reported() {
        let input = DrivingInput::new(camera(1, 1));
        assert!(matches!(
            input.validate(1, false, true),
            Err(Error::MissingInput("previous_controls"))
        ));
    }

    #[test]
    fn test_controls_batch_must_match_camera() {
        let device = NdArrayDevice::default();
        let input = DrivingInput::new(camera(2, 2))
            .with_previous_controls(Tensor::zeros([3, 4], &device));
        assert!(matches!(
            input.validate(2, false, true),
            Err(Error::Shape {
                input: "previous_controls",
                ..
            })
        ));
    }

    #[test]
    fn test_optional_metadata_is_still_shape_checked() {
        let device = NdArrayDevice::default();
        let input =
            DrivingInput::new(camera(1, 1)).with_metadata(Tensor::zeros([1, 12, 23, 41], &device));
        assert!(input.validate(1, false, false).is_err());
    }
}
