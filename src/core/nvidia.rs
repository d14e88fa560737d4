//! Nvidia PilotNet-style regressor: five strided convolutions, three dense layers.

use super::layers::{ChannelDropout, conv_config, conv_output_size};
use super::model::{
    CHANNELS_PER_FRAME, CONTROLS_PER_STEP, DrivingInput, DrivingNet, DrivingOutput, Error,
    FRAME_HEIGHT, FRAME_WIDTH,
};
use super::net_config::NetConfig;
use burn::nn::conv::Conv2d;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{relu, sigmoid};

/// (out_channels, kernel, stride) of each convolution.
const CONV_LAYERS: [(usize, usize, usize); 5] =
    [(24, 5, 2), (36, 5, 2), (48, 5, 2), (64, 3, 2), (64, 3, 1)];

/// Index of the convolution after which whole feature maps are dropped.
const CHANNEL_DROPOUT_AFTER: usize = 2;

/// Flattened size of the last convolution's output for a full-resolution frame.
pub fn flattened_features() -> usize {
    let (height, width) = CONV_LAYERS
        .iter()
        .fold((FRAME_HEIGHT, FRAME_WIDTH), |(h, w), (_, kernel, stride)| {
            (
                conv_output_size(h, *kernel, *stride, 0),
                conv_output_size(w, *kernel, *stride, 0),
            )
        });
    let channels = CONV_LAYERS[CONV_LAYERS.len() - 1].0;
    channels * height * width
}

#[derive(Module, Debug)]
pub struct Nvidia<B: Backend> {
    convs: Vec<Conv2d<B>>,
    channel_dropout: ChannelDropout,
    fc1: Linear<B>,
    fc2: Linear<B>,
    fc3: Linear<B>,
    dropout: Dropout,
    n_frames: usize,
    n_steps: usize,
}

impl<B: Backend> DrivingNet<B> for Nvidia<B> {
    const NAME: &'static str = "Nvidia";

    fn init(config: &NetConfig, device: &B::Device) -> Self {
        let mut in_channels = CHANNELS_PER_FRAME * config.n_frames;
        let convs = CONV_LAYERS
            .iter()
            .map(|(out_channels, kernel, stride)| {
                let conv: Conv2d<B> =
                    conv_config([in_channels, *out_channels], *kernel, *stride, 0).init(device);
                in_channels = *out_channels;
                conv
            })
            .collect();

        Self {
            convs,
            channel_dropout: ChannelDropout::new(0.5),
            fc1: LinearConfig::new(flattened_features(), 250).init(device),
            fc2: LinearConfig::new(250, 100).init(device),
            fc3: LinearConfig::new(100, CONTROLS_PER_STEP * config.n_steps).init(device),
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

        let mut x = input.camera;
        for (index, conv) in self.convs.iter().enumerate() {
            x = relu(conv.forward(x));
            if index == CHANNEL_DROPOUT_AFTER {
                x = self.channel_dropout.forward(x);
            }
        }

        let [batch, channels, height, width] = x.dims();
        let x = x.reshape([batch, channels * height * width]);

        let x = relu(self.fc1.forward(self.dropout.forward(x)));
        let x = relu(self.fc2.forward(self.dropout.forward(x)));
        let x = sigmoid(self.fc3.forward(self.dropout.forward(x)));

        Ok(DrivingOutput::Trajectory(x.reshape([
            batch,
            self.n_steps,
            CONTROLS_PER_STEP,
        ])))
    }
}
