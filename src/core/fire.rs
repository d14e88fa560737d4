use super::init::InitScheme;
use super::layers::{Activation, conv_config};
use burn::module::Ignored;
use burn::nn::conv::Conv2d;
use burn::nn::{BatchNorm, Dropout, DropoutConfig};
use burn::prelude::*;

/// Divisor turning a fire block's output width into its dropout probability.
const DROPOUT_WIDTH_SCALE: f64 = 384.0;

/// Configuration of a SqueezeNet fire block.
#[derive(Clone, Debug, PartialEq)]
pub struct FireConfig {
    pub inplanes: usize,
    pub squeeze_planes: usize,
    pub expand1x1_planes: usize,
    pub expand3x3_planes: usize,
    pub activation: Activation,
    /// Add the block input to its output when the channel counts match
    pub residual: bool,
    /// Dropout applied after normalization. None = disabled
    pub dropout: Option<f64>,
}

impl FireConfig {
    /// LeakyReLU block with a skip connection whenever input and output widths agree.
    pub fn residual(
        inplanes: usize,
        squeeze_planes: usize,
        expand1x1_planes: usize,
        expand3x3_planes: usize,
    ) -> Self {
        Self {
            inplanes,
            squeeze_planes,
            expand1x1_planes,
            expand3x3_planes,
            activation: Activation::LeakyRelu(0.2),
            residual: true,
            dropout: None,
        }
    }

    /// ELU block without skip connection; wider blocks drop more.
    pub fn with_dropout(
        inplanes: usize,
        squeeze_planes: usize,
        expand1x1_planes: usize,
        expand3x3_planes: usize,
    ) -> Self {
        let out_planes = expand1x1_planes + expand3x3_planes;
        Self {
            inplanes,
            squeeze_planes,
            expand1x1_planes,
            expand3x3_planes,
            activation: Activation::Elu,
            residual: false,
            dropout: Some(out_planes as f64 / DROPOUT_WIDTH_SCALE),
        }
    }

    pub fn out_planes(&self) -> usize {
        self.expand1x1_planes + self.expand3x3_planes
    }

    pub fn init<B: Backend>(&self, scheme: &InitScheme, device: &B::Device) -> Fire<B> {
        Fire {
            squeeze: scheme.conv(conv_config([self.inplanes, self.squeeze_planes], 1, 1, 0), device),
            expand1x1: scheme.conv(
                conv_config([self.squeeze_planes, self.expand1x1_planes], 1, 1, 0),
                device,
            ),
            expand3x3: scheme.conv(
                conv_config([self.squeeze_planes, self.expand3x3_planes], 3, 1, 1),
                device,
            ),
            norm: scheme.batch_norm(self.out_planes(), device),
            dropout: self.dropout.map(|prob| DropoutConfig::new(prob).init()),
            activation: Ignored(self.activation),
            residual: self.residual && self.inplanes == self.out_planes(),
        }
    }
}

/// Squeeze to a narrow 1x1 bottleneck, then expand through parallel 1x1 and 3x3
/// convolutions whose outputs are concatenated along channels.
#[derive(Module, Debug)]
pub struct Fire<B: Backend> {
    squeeze: Conv2d<B>,
    expand1x1: Conv2d<B>,
    expand3x3: Conv2d<B>,
    norm: BatchNorm<B>,
    dropout: Option<Dropout>,
    activation: Ignored<Activation>,
    residual: bool,
}

impl<B: Backend> Fire<B> {
    pub fn has_skip_connection(&self) -> bool {
        self.residual
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let activation = self.activation.0;

        let squeezed = activation.apply(self.squeeze.forward(input.clone()));
        let expanded = Tensor::cat(
            vec![
                activation.apply(self.expand1x1.forward(squeezed.clone())),
                activation.apply(self.expand3x3.forward(squeezed)),
            ],
            1,
        );

        let output = if self.residual {
            expanded + input
        } else {
            expanded
        };

        let output = self.norm.forward(output);
        match &self.dropout {
            Some(dropout) => dropout.forward(output),
            None => output,
        }
    }
}

/// Build a run of fire blocks sharing one init scheme.
pub fn fire_stage<B: Backend>(
    configs: &[FireConfig],
    scheme: &InitScheme,
    device: &B::Device,
) -> Vec<Fire<B>> {
    configs.iter().map(|config| config.init(scheme, device)).collect()
}

pub fn forward_stage<B: Backend>(stage: &[Fire<B>], input: Tensor<B, 4>) -> Tensor<B, 4> {
    stage.iter().fold(input, |x, fire| fire.forward(x))
}
