//! SqueezeNet trunk with an LSTM encoder/decoder for end-to-end driving.
//!
//! Every input frame is encoded independently by the convolutional trunk. The
//! per-frame features, paired with the controls applied at that frame, are read
//! by the encoder LSTM. Its final state seeds a decoder LSTM that unrolls one
//! step per predicted timestep.

use super::fire::{Fire, FireConfig, fire_stage, forward_stage};
use super::init::{InitScheme, kaiming_normal, normal};
use super::layers::{Activation, CeilAvgPool2d, ConvBlock, StackedLstm, batch_norm_1d, conv_config};
use super::model::{
    CHANNELS_PER_FRAME, CONTROLS_PER_STEP, DrivingInput, DrivingNet, DrivingOutput, Error,
    FRAME_HEIGHT, FRAME_WIDTH,
};
use super::net_config::NetConfig;
use burn::nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;

/// Features the trunk emits per frame: 31 channels over a 1x2 map.
pub const FRAME_FEATURES: usize = 62;
pub const LSTM_HIDDEN: usize = 128;
pub const LSTM_LAYERS: usize = 2;

/// Width of the decoder's per-step input.
const DECODER_INPUT: usize = 1;

const ACTIVATION: Activation = Activation::Elu;

/// Per-timestep regression head mapping decoder states to controls in (0, 1).
#[derive(Module, Debug)]
pub struct TrajectoryHead<B: Backend> {
    norm1: BatchNorm<B>,
    linear1: Linear<B>,
    norm2: BatchNorm<B>,
    linear2: Linear<B>,
    norm3: BatchNorm<B>,
    linear3: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> TrajectoryHead<B> {
    pub fn new(device: &B::Device) -> Self {
        Self {
            norm1: BatchNormConfig::new(LSTM_HIDDEN).init(device),
            linear1: LinearConfig::new(LSTM_HIDDEN, 64).init(device),
            norm2: BatchNormConfig::new(64).init(device),
            linear2: LinearConfig::new(64, 32).init(device),
            norm3: BatchNormConfig::new(32).init(device),
            linear3: LinearConfig::new(32, CONTROLS_PER_STEP).init(device),
            dropout: DropoutConfig::new(0.5).init(),
        }
    }

    /// `[rows, LSTM_HIDDEN]` -> `[rows, CONTROLS_PER_STEP]`
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.dropout.forward(batch_norm_1d(&self.norm1, input));
        let x = ACTIVATION.apply(self.linear1.forward(x));
        let x = self.dropout.forward(batch_norm_1d(&self.norm2, x));
        let x = ACTIVATION.apply(self.linear2.forward(x));
        let x = batch_norm_1d(&self.norm3, x);
        sigmoid(self.linear3.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct SqueezeNetTimeLstm<B: Backend> {
    stem: Vec<ConvBlock<B>>,
    pool: CeilAvgPool2d,
    dropout: Dropout,
    fire_a: Vec<Fire<B>>,
    fire_b: Vec<Fire<B>>,
    fire_c: Vec<Fire<B>>,
    reduce1: ConvBlock<B>,
    reduce2: ConvBlock<B>,
    reduce3: ConvBlock<B>,
    encoder: StackedLstm<B>,
    decoder: StackedLstm<B>,
    head: TrajectoryHead<B>,
    n_frames: usize,
    n_steps: usize,
}

impl<B: Backend> SqueezeNetTimeLstm<B> {
    fn trunk_scheme() -> InitScheme {
        InitScheme::default()
            .with_conv_weight(kaiming_normal())
            .with_norm_scale(normal(1.0))
    }

    /// Uniform in `±1/sqrt(hidden)`, the usual LSTM default.
    fn lstm_initializer() -> Initializer {
        let bound = 1.0 / (LSTM_HIDDEN as f64).sqrt();
        Initializer::Uniform {
            min: -bound,
            max: bound,
        }
    }

    /// Run a stack of single frames `[frames, CHANNELS_PER_FRAME, H, W]` through the trunk.
    fn encode_frames(&self, frames: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.stem.iter().fold(frames, |x, block| block.forward(x));
        let x = self.dropout.forward(self.pool.forward(x));

        let x = forward_stage(&self.fire_a, x);
        let x = self.pool.forward(x);
        let x = forward_stage(&self.fire_b, x);
        let x = self.pool.forward(x);
        let x = forward_stage(&self.fire_c, x);

        let x = self.dropout.forward(self.reduce1.forward(x));
        let x = self.reduce2.forward(x);
        self.reduce3.forward(x)
    }

    /// Decoder input when nothing is fed back: zeros `[batch, n_steps, 1]`.
    pub fn decoder_input(&self, batch_size: usize, device: &B::Device) -> Tensor<B, 3> {
        Tensor::zeros([batch_size, self.n_steps, DECODER_INPUT], device)
    }

    /// Teacher-forcing sequence for `controls` `[batch, steps, width]`: every step
    /// sees the previous step's controls, the first step sees zeros.
    pub fn decoder_sequence(&self, controls: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, steps, width] = controls.dims();
        if steps == 0 {
            return controls;
        }

        let first = Tensor::zeros([batch, 1, width], &controls.device());
        if steps == 1 {
            return first;
        }

        Tensor::cat(vec![first, controls.narrow(1, 0, steps - 1)], 1)
    }
}

impl<B: Backend> DrivingNet<B> for SqueezeNetTimeLstm<B> {
    const NAME: &'static str = "SqueezeNetTimeLSTM";
    const REQUIRES_CONTROLS: bool = true;

    fn init(config: &NetConfig, device: &B::Device) -> Self {
        let scheme = Self::trunk_scheme();
        let block = |channels: [usize; 2], stride: usize, padding: usize| -> ConvBlock<B> {
            ConvBlock::new(
                scheme.conv(conv_config(channels, 3, stride, padding), device),
                ACTIVATION,
                Some(scheme.batch_norm(channels[1], device)),
            )
        };

        Self {
            stem: vec![
                block([CHANNELS_PER_FRAME, 12], 1, 1),
                block([12, 24], 1, 1),
                block([24, 32], 2, 0),
            ],
            pool: CeilAvgPool2d::new(3, 2),
            dropout: DropoutConfig::new(0.5).init(),
            fire_a: fire_stage(
                &[
                    FireConfig::with_dropout(32, 16, 16, 16),
                    FireConfig::with_dropout(32, 24, 24, 24),
                    FireConfig::with_dropout(48, 24, 24, 24),
                ],
                &scheme,
                device,
            ),
            fire_b: fire_stage(
                &[
                    FireConfig::with_dropout(48, 32, 32, 32),
                    FireConfig::with_dropout(64, 32, 32, 32),
                    FireConfig::with_dropout(64, 48, 48, 48),
                    FireConfig::with_dropout(96, 48, 48, 48),
                ],
                &scheme,
                device,
            ),
            fire_c: fire_stage(
                &[
                    FireConfig::with_dropout(96, 64, 64, 64),
                    FireConfig::with_dropout(128, 64, 64, 64),
                ],
                &scheme,
                device,
            ),
            reduce1: block([128, 64], 2, 1),
            reduce2: block([64, 32], 2, 1),
            reduce3: block([32, 31], 2, 1),
            encoder: StackedLstm::new(
                FRAME_FEATURES + CONTROLS_PER_STEP,
                LSTM_HIDDEN,
                LSTM_LAYERS,
                Self::lstm_initializer(),
                device,
            ),
            decoder: StackedLstm::new(
                DECODER_INPUT,
                LSTM_HIDDEN,
                LSTM_LAYERS,
                Self::lstm_initializer(),
                device,
            ),
            head: TrajectoryHead::new(device),
            n_frames: config.n_frames,
            n_steps: config.n_steps,
        }
    }

    fn n_frames(&self) -> usize {
        self.n_frames
    }

    fn n_steps(&self) -> usize {
        self.n_steps
    }

    fn forward(&self, input: DrivingInput<B>) -> Result<DrivingOutput<B>, Error> {
        self.check(&input)?;

        let batch = input.batch_size();
        let device = input.camera.device();
        let previous_controls = input
            .previous_controls
            .ok_or(Error::MissingInput("previous_controls"))?;

        let frames = input.camera.reshape([
            batch * self.n_frames,
            CHANNELS_PER_FRAME,
            FRAME_HEIGHT,
            FRAME_WIDTH,
        ]);
        let features = self.encode_frames(frames);
        let [_, channels, height, width] = features.dims();
        let features = features.reshape([batch, self.n_frames, channels * height * width]);

        let previous_controls =
            previous_controls.reshape([batch, self.n_frames, CONTROLS_PER_STEP]);
        let sequence = Tensor::cat(vec![features, previous_controls], 2);

        let (_, encoded) = self.encoder.forward(sequence, None);
        let (decoded, _) = self
            .decoder
            .forward(self.decoder_input(batch, &device), Some(encoded));

        let [_, steps, hidden] = decoded.dims();
        let controls = self.head.forward(decoded.reshape([batch * steps, hidden]));

        Ok(DrivingOutput::Trajectory(
            controls.reshape([batch, steps, CONTROLS_PER_STEP]),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::net_config::NetKind;
    use burn::backend::NdArray;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::tensor::Distribution;

    type B = NdArray;

    fn input(batch: usize, n_frames: usize, device: &NdArrayDevice) -> DrivingInput<B> {
        DrivingInput::new(Tensor::random(
            [batch, CHANNELS_PER_FRAME * n_frames, FRAME_HEIGHT, FRAME_WIDTH],
            Distribution::Default,
            device,
        ))
        .with_previous_controls(Tensor::random(
            [batch, CONTROLS_PER_STEP * n_frames],
            Distribution::Default,
            device,
        ))
    }

    fn values(tensor: Tensor<B, 3>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_trunk_emits_frame_features() {
        let device = NdArrayDevice::default();
        let net = SqueezeNetTimeLstm::<B>::init(&NetConfig::default(), &device);
        let frames = Tensor::zeros([3, CHANNELS_PER_FRAME, FRAME_HEIGHT, FRAME_WIDTH], &device);

        let features = net.encode_frames(frames);
        let [frames, channels, height, width] = features.dims();
        assert_eq!(frames, 3);
        assert_eq!(channels * height * width, FRAME_FEATURES);
    }

    #[test]
    fn test_forward_predicts_bounded_trajectory() {
        let device = NdArrayDevice::default();
        let config = NetConfig::new(NetKind::SqueezeNetTimeLstm, 2, 4).unwrap();
        let net = SqueezeNetTimeLstm::<B>::init(&config, &device);

        let trajectory = net
            .forward(input(2, 2, &device))
            .expect("forward should succeed")
            .into_trajectory()
            .expect("expected trajectory output");

        assert_eq!(trajectory.dims(), [2, 4, CONTROLS_PER_STEP]);
        assert!(values(trajectory).iter().all(|v| *v > 0.0 && *v < 1.0));
    }

    #[test]
    fn test_encoder_state_reaches_decoder() {
        let device = NdArrayDevice::default();
        let config = NetConfig::new(NetKind::SqueezeNetTimeLstm, 2, 3).unwrap();
        let net = SqueezeNetTimeLstm::<B>::init(&config, &device);

        let base = input(1, 2, &device);
        let with_controls = |value: f32| {
            base.clone()
                .with_previous_controls(Tensor::full([1, CONTROLS_PER_STEP * 2], value, &device))
        };

        let forward = |input: DrivingInput<B>| {
            values(net.forward(input).unwrap().into_trajectory().unwrap())
        };
        let idle = forward(with_controls(0.0));
        let full = forward(with_controls(1.0));

        // The decoder only sees zeros, so any difference comes through the encoder state
        let max_diff = idle
            .iter()
            .zip(&full)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_diff > 0.0, "trajectory ignores previous controls");
    }

    #[test]
    fn test_forward_requires_previous_controls() {
        let device = NdArrayDevice::default();
        let net = SqueezeNetTimeLstm::<B>::init(&NetConfig::default(), &device);
        let mut missing = input(1, 2, &device);
        missing.previous_controls = None;

        assert!(matches!(
            net.forward(missing),
            Err(Error::MissingInput("previous_controls"))
        ));
    }

    #[test]
    fn test_decoder_input_is_zero_sequence() {
        let device = NdArrayDevice::default();
        let config = NetConfig::default().with_n_steps(7).unwrap();
        let net = SqueezeNetTimeLstm::<B>::init(&config, &device);

        let decoder_input = net.decoder_input(3, &device);
        assert_eq!(decoder_input.dims(), [3, 7, 1]);
        assert!(values(decoder_input).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_decoder_sequence_shifts_controls_one_step() {
        let device = NdArrayDevice::default();
        let net = SqueezeNetTimeLstm::<B>::init(&NetConfig::default(), &device);
        let controls = Tensor::<B, 3>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], [1, 3, 2]),
            &device,
        );

        let shifted = net.decoder_sequence(controls);
        assert_eq!(shifted.dims(), [1, 3, 2]);
        assert_eq!(values(shifted), vec![0.0, 0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_decoder_sequence_single_step_is_zeroed() {
        let device = NdArrayDevice::default();
        let net = SqueezeNetTimeLstm::<B>::init(&NetConfig::default(), &device);
        let controls = Tensor::<B, 3>::ones([2, 1, 2], &device);

        assert_eq!(values(net.decoder_sequence(controls)), vec![0.0; 4]);
    }
}
