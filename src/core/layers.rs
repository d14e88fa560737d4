//! Layer building blocks shared by the driving networks.
//!
//! Burn covers convolution, normalization and recurrence; what lives here is the
//! glue the architectures need on top of that: activation selection, feature-map
//! dropout, `ceil_mode` pooling and multi-layer LSTMs.

use burn::module::Ignored;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, Initializer, Lstm, LstmConfig, LstmState, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::Distribution;
use burn::tensor::activation::{leaky_relu, relu};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Activation {
    Relu,
    LeakyRelu(f64),
    Elu,
}

impl Activation {
    pub fn apply<B: Backend, const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::Relu => relu(input),
            Activation::LeakyRelu(negative_slope) => leaky_relu(input, *negative_slope),
            Activation::Elu => elu(input),
        }
    }
}

/// ELU with alpha = 1: `x` for positive inputs, `exp(x) - 1` otherwise.
pub fn elu<B: Backend, const D: usize>(input: Tensor<B, D>) -> Tensor<B, D> {
    let negative = input.clone().clamp_max(0.0).exp().sub_scalar(1.0);
    input.clamp_min(0.0) + negative
}

/// Spatial output size of a convolution or non-ceil pooling window.
pub fn conv_output_size(input: usize, kernel: usize, stride: usize, padding: usize) -> usize {
    (input + 2 * padding - kernel) / stride + 1
}

/// Spatial output size of a pooling window in `ceil_mode`.
///
/// The last window is dropped when it would start past the input.
pub fn ceil_output_size(input: usize, kernel: usize, stride: usize) -> usize {
    let span = input.saturating_sub(kernel);
    let mut output = span.div_ceil(stride) + 1;
    if (output - 1) * stride >= input {
        output -= 1;
    }
    output
}

/// Elements the last `ceil_mode` window overhangs the input by.
fn ceil_overhang(input: usize, kernel: usize, stride: usize) -> usize {
    let output = ceil_output_size(input, kernel, stride);
    ((output - 1) * stride + kernel).saturating_sub(input)
}

/// Convolution config with square kernel, stride and symmetric padding.
pub fn conv_config(channels: [usize; 2], kernel: usize, stride: usize, padding: usize) -> Conv2dConfig {
    let padding = if padding == 0 {
        PaddingConfig2d::Valid
    } else {
        PaddingConfig2d::Explicit(padding, padding)
    };

    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(padding)
}

/// Convolution followed by an activation and an optional batch-norm.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: Option<BatchNorm<B>>,
    activation: Ignored<Activation>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(conv: Conv2d<B>, activation: Activation, norm: Option<BatchNorm<B>>) -> Self {
        Self {
            conv,
            norm,
            activation: Ignored(activation),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.activation.0.apply(self.conv.forward(input));
        match &self.norm {
            Some(norm) => norm.forward(x),
            None => x,
        }
    }
}

/// Batch-norm over `[batch, features]` inputs.
pub fn batch_norm_1d<B: Backend>(norm: &BatchNorm<B>, input: Tensor<B, 2>) -> Tensor<B, 2> {
    let [batch, features] = input.dims();
    norm.forward(input.reshape([batch, features, 1]))
        .reshape([batch, features])
}

/// Dropout over whole feature maps.
///
/// Each channel of each sample is zeroed with probability `prob`; survivors are
/// scaled by `1 / (1 - prob)`. Only active when the backend tracks gradients.
#[derive(Module, Clone, Debug)]
pub struct ChannelDropout {
    pub prob: f64,
}

impl ChannelDropout {
    pub fn new(prob: f64) -> Self {
        assert!(
            (0.0..1.0).contains(&prob),
            "dropout probability must be in [0, 1), got {}",
            prob
        );
        Self { prob }
    }

    pub fn forward<B: Backend>(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        if !B::ad_enabled() || self.prob == 0.0 {
            return input;
        }

        let [batch, channels, _, _] = input.dims();
        let keep = 1.0 - self.prob;
        let mask = Tensor::<B, 4>::random(
            [batch, channels, 1, 1],
            Distribution::Bernoulli(keep),
            &input.device(),
        );

        input * mask.div_scalar(keep)
    }
}

/// Average pooling with `ceil_mode` output sizes.
///
/// Windows hanging off the bottom/right edge average only the elements they cover.
#[derive(Module, Clone, Debug)]
pub struct CeilAvgPool2d {
    pool: AvgPool2d,
    kernel: usize,
    stride: usize,
}

impl CeilAvgPool2d {
    pub fn new(kernel: usize, stride: usize) -> Self {
        Self {
            pool: AvgPool2dConfig::new([kernel, kernel])
                .with_strides([stride, stride])
                .with_padding(PaddingConfig2d::Valid)
                .init(),
            kernel,
            stride,
        }
    }

    pub fn forward<B: Backend>(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = input.dims();
        let pad_h = ceil_overhang(height, self.kernel, self.stride);
        let pad_w = ceil_overhang(width, self.kernel, self.stride);

        if pad_h == 0 && pad_w == 0 {
            return self.pool.forward(input);
        }

        // Pooling a zero-padded ones map gives each window's in-bounds fraction.
        let coverage = Tensor::<B, 4>::ones([1, 1, height, width], &input.device())
            .pad((0, pad_w, 0, pad_h), 0.0);
        let coverage = self.pool.forward(coverage);

        let sums = self.pool.forward(input.pad((0, pad_w, 0, pad_h), 0.0));
        sums / coverage
    }
}

/// Max pooling with `ceil_mode` output sizes.
#[derive(Module, Clone, Debug)]
pub struct CeilMaxPool2d {
    pool: MaxPool2d,
    kernel: usize,
    stride: usize,
}

impl CeilMaxPool2d {
    pub fn new(kernel: usize, stride: usize) -> Self {
        Self {
            pool: MaxPool2dConfig::new([kernel, kernel])
                .with_strides([stride, stride])
                .with_padding(PaddingConfig2d::Valid)
                .init(),
            kernel,
            stride,
        }
    }

    pub fn forward<B: Backend>(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = input.dims();
        let pad_h = ceil_overhang(height, self.kernel, self.stride);
        let pad_w = ceil_overhang(width, self.kernel, self.stride);

        if pad_h == 0 && pad_w == 0 {
            return self.pool.forward(input);
        }

        // Every window starts inside the input, so padding never wins the max.
        self.pool
            .forward(input.pad((0, pad_w, 0, pad_h), f32::MIN))
    }
}

/// LSTM layers applied in sequence, batch-first.
#[derive(Module, Debug)]
pub struct StackedLstm<B: Backend> {
    layers: Vec<Lstm<B>>,
}

impl<B: Backend> StackedLstm<B> {
    pub fn new(
        d_input: usize,
        d_hidden: usize,
        num_layers: usize,
        initializer: Initializer,
        device: &B::Device,
    ) -> Self {
        let layers = (0..num_layers)
            .map(|layer| {
                let d_input = if layer == 0 { d_input } else { d_hidden };
                LstmConfig::new(d_input, d_hidden, true)
                    .with_initializer(initializer.clone())
                    .init(device)
            })
            .collect();

        Self { layers }
    }

    /// Run `input` `[batch, seq, features]` through every layer.
    ///
    /// `states`, when given, seeds layer `i` with `states[i]`. Returns the last
    /// layer's output sequence and the final state of every layer.
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
        states: Option<Vec<LstmState<B, 2>>>,
    ) -> (Tensor<B, 3>, Vec<LstmState<B, 2>>) {
        let initial: Vec<Option<LstmState<B, 2>>> = match states {
            Some(states) => {
                assert_eq!(
                    states.len(),
                    self.layers.len(),
                    "one initial state per LSTM layer is required"
                );
                states.into_iter().map(Some).collect()
            }
            None => self.layers.iter().map(|_| None).collect(),
        };

        let mut output = input;
        let mut finals = Vec::with_capacity(self.layers.len());

        for (layer, state) in self.layers.iter().zip(initial) {
            let (sequence, last) = layer.forward(output, state);
            output = sequence;
            finals.push(last);
        }

        (output, finals)
    }
}
