use super::init::{InitScheme, normal};
use super::layers::{CeilMaxPool2d, conv_config};
use super::model::{CHANNELS_PER_FRAME, CONTROLS_PER_STEP, DrivingInput, DrivingNet, DrivingOutput, Error};
use super::net_config::NetConfig;
use burn::nn::conv::Conv2d;
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Standard deviation of every convolution weight.
const WEIGHT_STD: f64 = 0.5;

/// Convolutional regressor that fuses the metadata planes after the first stage.
///
/// The camera stack is reduced to the metadata resolution, concatenated with the
/// metadata channels, and reduced further to one output channel per predicted
/// step whose two remaining spatial columns are the two controls.
#[derive(Module, Debug)]
pub struct Feedforward<B: Backend> {
    pre_conv1: Conv2d<B>,
    pre_conv2: Conv2d<B>,
    post_conv1: Conv2d<B>,
    post_conv2: Conv2d<B>,
    post_conv3: Conv2d<B>,
    post_conv4: Conv2d<B>,
    post_conv5: Conv2d<B>,
    post_conv6: Conv2d<B>,
    final_conv: Conv2d<B>,
    pool: CeilMaxPool2d,
    final_pool: AvgPool2d,
    dropout: Dropout,
    n_frames: usize,
    n_steps: usize,
}

impl<B: Backend> DrivingNet<B> for Feedforward<B> {
    const NAME: &'static str = "Feedforward";
    const REQUIRES_METADATA: bool = true;

    fn init(config: &NetConfig, device: &B::Device) -> Self {
        let scheme = InitScheme::default().with_conv_weight(normal(WEIGHT_STD));
        let conv3x3 = |channels: [usize; 2]| -> Conv2d<B> {
            scheme.conv(conv_config(channels, 3, 1, 1), device)
        };

        Self {
            pre_conv1: scheme.conv(
                conv_config([CHANNELS_PER_FRAME * config.n_frames, 8], 3, 2, 0),
                device,
            ),
            pre_conv2: conv3x3([8, 8]),
            post_conv1: conv3x3([16, 12]),
            post_conv2: conv3x3([12, 12]),
            post_conv3: conv3x3([12, 16]),
            post_conv4: conv3x3([16, 16]),
            post_conv5: conv3x3([16, 24]),
            post_conv6: conv3x3([24, 24]),
            final_conv: scheme.conv(conv_config([24, config.n_steps], 1, 1, 0), device),
            pool: CeilMaxPool2d::new(3, 2),
            final_pool: AvgPool2dConfig::new([5, 5]).with_strides([5, 5]).init(),
            dropout: DropoutConfig::new(0.5).init(),
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

        let metadata = input.metadata.ok_or(Error::MissingInput("metadata"))?;

        let x = relu(self.pre_conv1.forward(input.camera));
        let x = self.pre_conv2.forward(self.pool.forward(x));
        let x = Tensor::cat(vec![x, metadata], 1);

        let x = self.post_conv1.forward(x);
        let x = self.post_conv2.forward(self.pool.forward(x));
        let x = self.post_conv3.forward(x);
        let x = self.post_conv4.forward(self.pool.forward(x));
        let x = self.post_conv5.forward(x);
        let x = self.post_conv6.forward(x);

        let x = self.final_conv.forward(self.dropout.forward(x));
        let x = self.final_pool.forward(x);

        let [batch, channels, height, width] = x.dims();
        let steps = channels * height * width / CONTROLS_PER_STEP;
        Ok(DrivingOutput::Trajectory(x.reshape([
            batch,
            steps,
            CONTROLS_PER_STEP,
        ])))
    }
}
