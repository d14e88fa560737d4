//! SqueezeNet 1.1 adapted to predict discretized steering and control.

use super::fire::{Fire, FireConfig, fire_stage, forward_stage};
use super::init::{InitScheme, kaiming_uniform, normal};
use super::layers::{Activation, CeilAvgPool2d, ChannelDropout, ConvBlock, conv_config};
use super::model::{CHANNELS_PER_FRAME, DrivingInput, DrivingNet, DrivingOutput, Error};
use super::net_config::NetConfig;
use burn::nn::BatchNorm;
use burn::nn::conv::Conv2d;
use burn::prelude::*;
use burn::tensor::activation::log_softmax;

/// Number of bins each discretized output is classified into.
pub const DISCRETE_BINS: usize = 10;

const ACTIVATION: Activation = Activation::LeakyRelu(0.2);

#[derive(Module, Debug)]
pub struct SqueezeNet<B: Backend> {
    conv1: ConvBlock<B>,
    conv2: ConvBlock<B>,
    conv3: ConvBlock<B>,
    norm3: BatchNorm<B>,
    pool: CeilAvgPool2d,
    dropout: ChannelDropout,
    fire_a: Vec<Fire<B>>,
    fire_b: Vec<Fire<B>>,
    fire_c: Vec<Fire<B>>,
    fire_d: Vec<Fire<B>>,
    head1: ConvBlock<B>,
    head2: ConvBlock<B>,
    classifier: Conv2d<B>,
    n_frames: usize,
    n_steps: usize,
}

impl<B: Backend> SqueezeNet<B> {
    fn scheme() -> InitScheme {
        InitScheme::default()
            .with_conv_weight(kaiming_uniform())
            .with_norm_scale(normal(1.0))
            .with_bias(normal(1.0))
    }
}

impl<B: Backend> DrivingNet<B> for SqueezeNet<B> {
    const NAME: &'static str = "SqueezeNet";

    fn init(config: &NetConfig, device: &B::Device) -> Self {
        let scheme = Self::scheme();
        let block = |channels: [usize; 2], stride: usize, padding: usize, norm: bool| -> ConvBlock<B> {
            ConvBlock::new(
                scheme.conv(conv_config(channels, 3, stride, padding), device),
                ACTIVATION,
                norm.then(|| scheme.batch_norm(channels[1], device)),
            )
        };

        Self {
            conv1: block([CHANNELS_PER_FRAME * config.n_frames, 12], 1, 1, true),
            conv2: block([12, 16], 1, 1, true),
            conv3: block([16, 16], 2, 0, false),
            norm3: scheme.batch_norm(16, device),
            pool: CeilAvgPool2d::new(3, 2),
            dropout: ChannelDropout::new(0.5),
            fire_a: fire_stage(
                &[
                    FireConfig::residual(16, 4, 8, 8),
                    FireConfig::residual(16, 12, 12, 12),
                    FireConfig::residual(24, 16, 16, 16),
                ],
                &scheme,
                device,
            ),
            fire_b: fire_stage(
                &[
                    FireConfig::residual(32, 16, 16, 16),
                    FireConfig::residual(32, 24, 24, 24),
                ],
                &scheme,
                device,
            ),
            fire_c: fire_stage(
                &[
                    FireConfig::residual(48, 24, 24, 24),
                    FireConfig::residual(48, 32, 32, 32),
                ],
                &scheme,
                device,
            ),
            fire_d: fire_stage(&[FireConfig::residual(64, 32, 32, 32)], &scheme, device),
            head1: block([64, 32], 2, 1, true),
            head2: block([32, 16], 2, 1, true),
            classifier: scheme.conv(conv_config([16, DISCRETE_BINS], 3, 2, 1), device),
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

        let x = self.conv1.forward(input.camera);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);
        let x = self.norm3.forward(self.pool.forward(x));
        let x = self.dropout.forward(x);

        let x = forward_stage(&self.fire_a, x);
        let x = self.pool.forward(x);
        let x = forward_stage(&self.fire_b, x);
        let x = self.dropout.forward(x);
        let x = forward_stage(&self.fire_c, x);
        let x = self.pool.forward(x);
        let x = forward_stage(&self.fire_d, x);

        let x = self.dropout.forward(self.head1.forward(x));
        let x = self.dropout.forward(self.head2.forward(x));

        // [batch, bins, 1, 2]: one column per output head
        let x = self.classifier.forward(x);
        let [batch, bins, height, width] = x.dims();
        let x = x.reshape([batch, bins, height * width]);

        let steering = x.clone().narrow(2, 0, 1).reshape([batch, bins]);
        let controls = x.narrow(2, 1, 1).reshape([batch, bins]);

        Ok(DrivingOutput::Discrete {
            steering: log_softmax(steering, 1),
            controls: log_softmax(controls, 1),
        })
    }
}
