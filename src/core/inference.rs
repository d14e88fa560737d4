use super::batcher::{DrivingBatcher, DrivingSample};
use super::model::{CONTROLS_PER_STEP, DrivingOutput};
use super::net_config::NetConfig;
use super::registry::AnyNet;
use anyhow::Context;
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

/// What the engine predicts for one sample.
#[derive(Clone, Debug, PartialEq)]
pub enum Prediction {
    /// `(steering, motor)` per future step.
    Trajectory(Vec<[f32; CONTROLS_PER_STEP]>),
    /// Log-probability per bin for each head.
    Discrete {
        steering: Vec<f32>,
        controls: Vec<f32>,
    },
}

impl Prediction {
    /// Index of the most probable `(steering, controls)` bins. `None` for trajectories.
    pub fn most_likely(&self) -> Option<(usize, usize)> {
        match self {
            Prediction::Trajectory(_) => None,
            Prediction::Discrete { steering, controls } => {
                Some((argmax(steering)?, argmax(controls)?))
            }
        }
    }
}

fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(index, _)| index)
}

pub struct InferenceEngine<B: Backend> {
    pub net: AnyNet<B>,
    config: NetConfig,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    pub fn new(config: NetConfig, device: &B::Device) -> Self {
        Self {
            net: AnyNet::init(&config, device),
            config,
            device: device.clone(),
        }
    }

    /// Build from a config file written by [`NetConfig::save`].
    pub fn load(config_path: &str, device: &B::Device) -> anyhow::Result<Self> {
        let config = NetConfig::load(config_path)
            .with_context(|| format!("Failed to load net config from {}", config_path))?;
        Ok(Self::new(config, device))
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Make a single prediction.
    pub fn predict(&self, sample: DrivingSample) -> anyhow::Result<Prediction> {
        let mut predictions = self.predict_batch(vec![sample])?;
        predictions
            .pop()
            .context("Forward pass produced an empty batch")
    }

    pub fn predict_batch(&self, samples: Vec<DrivingSample>) -> anyhow::Result<Vec<Prediction>> {
        anyhow::ensure!(!samples.is_empty(), "Cannot predict on an empty batch");

        for (index, sample) in samples.iter().enumerate() {
            sample
                .validate(self.config.n_frames)
                .with_context(|| format!("Invalid sample at index {}", index))?;
        }

        let batch_size = samples.len();
        let batcher = DrivingBatcher::<B>::new(self.config.n_frames);
        let input = batcher.batch(samples, &self.device);

        let output = self
            .net
            .forward(input)
            .with_context(|| format!("{} forward pass failed", self.net.name()))?;

        match output {
            DrivingOutput::Trajectory(trajectory) => {
                let [_, steps, _] = trajectory.dims();
                let values = to_vec(trajectory)?;
                Ok(values
                    .chunks_exact(steps * CONTROLS_PER_STEP)
                    .map(|sample| {
                        Prediction::Trajectory(
                            sample
                                .chunks_exact(CONTROLS_PER_STEP)
                                .map(|step| [step[0], step[1]])
                                .collect(),
                        )
                    })
                    .collect())
            }
            DrivingOutput::Discrete { steering, controls } => {
                let bins = steering.dims()[1];
                let steering = to_vec(steering)?;
                let controls = to_vec(controls)?;
                Ok(steering
                    .chunks_exact(bins)
                    .zip(controls.chunks_exact(bins))
                    .take(batch_size)
                    .map(|(steering, controls)| Prediction::Discrete {
                        steering: steering.to_vec(),
                        controls: controls.to_vec(),
                    })
                    .collect())
            }
        }
    }
}

fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> anyhow::Result<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to convert tensor to vec: {:?}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::net_config::NetKind;
    use crate::core::squeezenet::DISCRETE_BINS;
    use approx::assert_relative_eq;
    use burn::backend::NdArray;
    use burn::backend::ndarray::NdArrayDevice;

    type B = NdArray;

    #[test]
    fn test_most_likely_picks_highest_bins() {
        let prediction = Prediction::Discrete {
            steering: vec![-3.0, -0.1, -2.0],
            controls: vec![-0.5, -4.0, -0.2],
        };
        assert_eq!(prediction.most_likely(), Some((1, 2)));
        assert_eq!(Prediction::Trajectory(vec![[0.0, 0.0]]).most_likely(), None);
    }

    #[test]
    fn test_predict_trajectory() {
        let device = NdArrayDevice::default();
        let config = NetConfig::new(NetKind::Nvidia, 1, 4).unwrap();
        let engine = InferenceEngine::<B>::new(config, &device);

        let prediction = engine.predict(DrivingSample::zeros(1)).unwrap();

        let Prediction::Trajectory(steps) = prediction else {
            panic!("expected trajectory");
        };
        assert_eq!(steps.len(), 4);
    }

    #[test]
    fn test_predict_discrete() {
        let device = NdArrayDevice::default();
        let config = NetConfig::new(NetKind::SqueezeNet, 1, 4).unwrap();
        let engine = InferenceEngine::<B>::new(config, &device);

        let predictions = engine
            .predict_batch(vec![DrivingSample::zeros(1), DrivingSample::zeros(1)])
            .unwrap();

        assert_eq!(predictions.len(), 2);
        for prediction in predictions {
            let Prediction::Discrete { steering, .. } = &prediction else {
                panic!("expected discrete prediction");
            };
            assert_eq!(steering.len(), DISCRETE_BINS);
            let total: f32 = steering.iter().map(|p| p.exp()).sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-4);
            assert!(prediction.most_likely().is_some());
        }
    }

    #[test]
    fn test_predict_rejects_malformed_sample() {
        let device = NdArrayDevice::default();
        let engine = InferenceEngine::<B>::new(NetConfig::default(), &device);

        let error = engine.predict(DrivingSample::zeros(1)).unwrap_err();
        assert!(format!("{:#}", error).contains("camera"));
    }

    #[test]
    fn test_predict_requires_controls_for_lstm() {
        let device = NdArrayDevice::default();
        let config = NetConfig::new(NetKind::SqueezeNetTimeLstm, 1, 2).unwrap();
        let engine = InferenceEngine::<B>::new(config, &device);
        let mut sample = DrivingSample::zeros(1);
        sample.previous_controls = None;

        let error = engine.predict(sample).unwrap_err();
        assert!(format!("{:#}", error).contains("previous_controls"));
    }
}
