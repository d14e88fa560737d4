use super::model::{
    CHANNELS_PER_FRAME, CONTROLS_PER_STEP, DrivingInput, Error, FRAME_HEIGHT, FRAME_WIDTH,
    METADATA_CHANNELS, METADATA_HEIGHT, METADATA_WIDTH,
};
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

/// One example in flat, channel-major `f32` layout.
#[derive(Clone, Debug, Default)]
pub struct DrivingSample {
    /// `CHANNELS_PER_FRAME * n_frames * FRAME_HEIGHT * FRAME_WIDTH` values.
    pub camera: Vec<f32>,
    /// `METADATA_CHANNELS * METADATA_HEIGHT * METADATA_WIDTH` values.
    pub metadata: Option<Vec<f32>>,
    /// `CONTROLS_PER_STEP * n_frames` values.
    pub previous_controls: Option<Vec<f32>>,
}

impl DrivingSample {
    pub fn camera_len(n_frames: usize) -> usize {
        CHANNELS_PER_FRAME * n_frames * FRAME_HEIGHT * FRAME_WIDTH
    }

    pub fn metadata_len() -> usize {
        METADATA_CHANNELS * METADATA_HEIGHT * METADATA_WIDTH
    }

    pub fn controls_len(n_frames: usize) -> usize {
        CONTROLS_PER_STEP * n_frames
    }

    /// Zero-filled sample with every optional part present.
    pub fn zeros(n_frames: usize) -> Self {
        Self {
            camera: vec![0.0; Self::camera_len(n_frames)],
            metadata: Some(vec![0.0; Self::metadata_len()]),
            previous_controls: Some(vec![0.0; Self::controls_len(n_frames)]),
        }
    }

    pub fn validate(&self, n_frames: usize) -> Result<(), Error> {
        check_len("camera", Self::camera_len(n_frames), self.camera.len())?;
        if let Some(metadata) = &self.metadata {
            check_len("metadata", Self::metadata_len(), metadata.len())?;
        }
        if let Some(controls) = &self.previous_controls {
            check_len("previous_controls", Self::controls_len(n_frames), controls.len())?;
        }
        Ok(())
    }
}

fn check_len(input: &'static str, expected: usize, actual: usize) -> Result<(), Error> {
    if expected != actual {
        return Err(Error::Shape {
            input,
            expected: vec![expected],
            actual: vec![actual],
        });
    }
    Ok(())
}

/// Stacks [`DrivingSample`]s into a [`DrivingInput`].
///
/// Optional inputs are only batched when every sample carries them.
#[derive(Clone, Debug)]
pub struct DrivingBatcher<B: Backend> {
    n_frames: usize,
    _phantom: core::marker::PhantomData<B>,
}

impl<B: Backend> DrivingBatcher<B> {
    pub fn new(n_frames: usize) -> Self {
        Self {
            n_frames,
            _phantom: core::marker::PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, DrivingSample, DrivingInput<B>> for DrivingBatcher<B> {
    fn batch(&self, items: Vec<DrivingSample>, device: &B::Device) -> DrivingInput<B> {
        let batch_size = items.len();
        assert!(batch_size > 0, "Cannot create a batch from an empty Vec");

        let camera_len = DrivingSample::camera_len(self.n_frames);
        let mut camera = Vec::with_capacity(batch_size * camera_len);
        for item in items.iter() {
            camera.extend_from_slice(&item.camera);
        }
        let camera = Tensor::<B, 4>::from_data(
            TensorData::new(
                camera,
                [
                    batch_size,
                    CHANNELS_PER_FRAME * self.n_frames,
                    FRAME_HEIGHT,
                    FRAME_WIDTH,
                ],
            ),
            device,
        );
        let mut input = DrivingInput::new(camera);

        if let Some(metadata) = stack(&items, |item| item.metadata.as_deref()) {
            input = input.with_metadata(Tensor::from_data(
                TensorData::new(
                    metadata,
                    [batch_size, METADATA_CHANNELS, METADATA_HEIGHT, METADATA_WIDTH],
                ),
                device,
            ));
        }

        if let Some(controls) = stack(&items, |item| item.previous_controls.as_deref()) {
            input = input.with_previous_controls(Tensor::from_data(
                TensorData::new(
                    controls,
                    [batch_size, DrivingSample::controls_len(self.n_frames)],
                ),
                device,
            ));
        }

        input
    }
}

fn stack<'a>(
    items: &'a [DrivingSample],
    part: impl Fn(&'a DrivingSample) -> Option<&'a [f32]>,
) -> Option<Vec<f32>> {
    let mut stacked = Vec::new();
    for item in items {
        stacked.extend_from_slice(part(item)?);
    }
    Some(stacked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::backend::ndarray::NdArrayDevice;

    type B = NdArray;

    #[test]
    fn test_batch_stacks_all_parts() {
        let device = NdArrayDevice::default();
        let batcher = DrivingBatcher::<B>::new(2);

        let input = batcher.batch(vec![DrivingSample::zeros(2), DrivingSample::zeros(2)], &device);

        assert_eq!(input.camera.dims(), [2, 12, FRAME_HEIGHT, FRAME_WIDTH]);
        assert_eq!(
            input.metadata.as_ref().map(|m| m.dims()),
            Some([2, METADATA_CHANNELS, METADATA_HEIGHT, METADATA_WIDTH])
        );
        assert_eq!(
            input.previous_controls.as_ref().map(|c| c.dims()),
            Some([2, 4])
        );
        assert!(input.validate(2, true, true).is_ok());
    }

    #[test]
    fn test_batch_drops_partially_present_parts() {
        let device = NdArrayDevice::default();
        let batcher = DrivingBatcher::<B>::new(1);
        let mut partial = DrivingSample::zeros(1);
        partial.metadata = None;

        let input = batcher.batch(vec![DrivingSample::zeros(1), partial], &device);

        assert!(input.metadata.is_none());
        assert!(input.previous_controls.is_some());
    }

    #[test]
    fn test_batch_keeps_sample_order() {
        let device = NdArrayDevice::default();
        let batcher = DrivingBatcher::<B>::new(1);
        let mut first = DrivingSample::zeros(1);
        first.previous_controls = Some(vec![0.1, 0.2]);
        let mut second = DrivingSample::zeros(1);
        second.previous_controls = Some(vec![0.3, 0.4]);

        let input = batcher.batch(vec![first, second], &device);
        let controls = input
            .previous_controls
            .unwrap()
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        assert_eq!(controls, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    #[should_panic(expected = "empty")]
    fn test_batch_rejects_empty() {
        let device = NdArrayDevice::default();
        DrivingBatcher::<B>::new(1).batch(vec![], &device);
    }

    #[test]
    fn test_validate_reports_length_mismatch() {
        let sample = DrivingSample::zeros(2);
        assert!(sample.validate(2).is_ok());
        assert!(matches!(
            sample.validate(3),
            Err(Error::Shape { input: "camera", .. })
        ));

        let mut short = DrivingSample::zeros(1);
        short.previous_controls = Some(vec![0.0]);
        assert!(matches!(
            short.validate(1),
            Err(Error::Shape {
                input: "previous_controls",
                ..
            })
        ));
    }
}
