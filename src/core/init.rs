//! Weight initialization schemes.
//!
//! Burn initializes convolutions with its own default (Kaiming-uniform, gain `1/sqrt(3)`,
//! for both weights and biases). The networks override parts of that: an
//! [`InitScheme`] names which parameter groups get a different distribution.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Initializer};
use burn::prelude::*;
use std::f64::consts::SQRT_2;

/// Burn's default convolution/linear initializer.
pub fn framework_default() -> Initializer {
    Initializer::KaimingUniform {
        gain: 1.0 / 3.0f64.sqrt(),
        fan_out_only: false,
    }
}

/// He initialization for ReLU-family activations, uniform variant.
pub fn kaiming_uniform() -> Initializer {
    Initializer::KaimingUniform {
        gain: SQRT_2,
        fan_out_only: false,
    }
}

/// He initialization for ReLU-family activations, normal variant.
pub fn kaiming_normal() -> Initializer {
    Initializer::KaimingNormal {
        gain: SQRT_2,
        fan_out_only: false,
    }
}

pub fn normal(std: f64) -> Initializer {
    Initializer::Normal { mean: 0.0, std }
}

#[derive(Clone, Debug, Default)]
pub struct InitScheme {
    /// Convolution weights. `None` keeps the framework default.
    pub conv_weight: Option<Initializer>,
    /// Batch-norm scale (gamma). `None` keeps ones.
    pub norm_scale: Option<Initializer>,
    /// Every bias, convolution and batch-norm shift alike. `None` keeps the
    /// framework default for convolutions and zeros for batch-norm.
    pub bias: Option<Initializer>,
}

impl InitScheme {
    pub fn with_conv_weight(mut self, initializer: Initializer) -> Self {
        self.conv_weight = Some(initializer);
        self
    }

    pub fn with_norm_scale(mut self, initializer: Initializer) -> Self {
        self.norm_scale = Some(initializer);
        self
    }

    pub fn with_bias(mut self, initializer: Initializer) -> Self {
        self.bias = Some(initializer);
        self
    }

    pub fn conv<B: Backend>(&self, config: Conv2dConfig, device: &B::Device) -> Conv2d<B> {
        let out_channels = config.channels[1];
        let fan_in = config.channels[0] / config.groups * config.kernel_size[0] * config.kernel_size[1];
        let has_bias = config.bias;

        let mut conv = match &self.conv_weight {
            Some(initializer) => config.with_initializer(initializer.clone()).init(device),
            None => config.init(device),
        };

        if !has_bias {
            return conv;
        }

        // Burn draws the bias from the weight initializer; a weight override must not leak into it.
        match (&self.bias, &self.conv_weight) {
            (Some(initializer), _) => {
                conv.bias = Some(initializer.init_with([out_channels], Some(fan_in), None, device));
            }
            (None, Some(_)) => {
                conv.bias =
                    Some(framework_default().init_with([out_channels], Some(fan_in), None, device));
            }
            (None, None) => {}
        }

        conv
    }

    pub fn batch_norm<B: Backend>(&self, channels: usize, device: &B::Device) -> BatchNorm<B> {
        let mut norm = BatchNormConfig::new(channels).init(device);

        if let Some(initializer) = &self.norm_scale {
            norm.gamma = initializer.init([channels], device);
        }
        if let Some(initializer) = &self.bias {
            norm.beta = initializer.init([channels], device);
        }

        norm
    }
}
