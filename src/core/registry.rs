use super::feedforward::Feedforward;
use super::model::{
    CHANNELS_PER_FRAME, CONTROLS_PER_STEP, DrivingInput, DrivingNet, DrivingOutput, Error,
    FRAME_HEIGHT, FRAME_WIDTH, METADATA_CHANNELS, METADATA_HEIGHT, METADATA_WIDTH,
};
use super::net_config::{NetConfig, NetKind};
use super::nvidia::Nvidia;
use super::squeezenet::SqueezeNet;
use super::squeezenet_lstm::SqueezeNetTimeLstm;
use burn::prelude::*;
use burn::tensor::Distribution;

/// Any of the driving networks, selected at runtime from a [`NetConfig`].
#[derive(Debug)]
pub enum AnyNet<B: Backend> {
    SqueezeNet(SqueezeNet<B>),
    SqueezeNetTimeLstm(SqueezeNetTimeLstm<B>),
    Feedforward(Feedforward<B>),
    Nvidia(Nvidia<B>),
}

macro_rules! dispatch {
    ($net:expr, $inner:ident => $body:expr) => {
        match $net {
            AnyNet::SqueezeNet($inner) => $body,
            AnyNet::SqueezeNetTimeLstm($inner) => $body,
            AnyNet::Feedforward($inner) => $body,
            AnyNet::Nvidia($inner) => $body,
        }
    };
}

impl<B: Backend> AnyNet<B> {
    pub fn init(config: &NetConfig, device: &B::Device) -> Self {
        let net = match config.kind {
            NetKind::SqueezeNet => AnyNet::SqueezeNet(SqueezeNet::init(config, device)),
            NetKind::SqueezeNetTimeLstm => {
                AnyNet::SqueezeNetTimeLstm(SqueezeNetTimeLstm::init(config, device))
            }
            NetKind::Feedforward => AnyNet::Feedforward(Feedforward::init(config, device)),
            NetKind::Nvidia => AnyNet::Nvidia(Nvidia::init(config, device)),
        };

        tracing::debug!(
            net = net.name(),
            n_frames = config.n_frames,
            n_steps = config.n_steps,
            "Network initialized"
        );

        net
    }

    pub fn kind(&self) -> NetKind {
        match self {
            AnyNet::SqueezeNet(_) => NetKind::SqueezeNet,
            AnyNet::SqueezeNetTimeLstm(_) => NetKind::SqueezeNetTimeLstm,
            AnyNet::Feedforward(_) => NetKind::Feedforward,
            AnyNet::Nvidia(_) => NetKind::Nvidia,
        }
    }

    pub fn name(&self) -> &'static str {
        fn name_of<B: Backend, N: DrivingNet<B>>(_: &N) -> &'static str {
            N::NAME
        }
        dispatch!(self, net => name_of::<B, _>(net))
    }

    pub fn requires_metadata(&self) -> bool {
        fn requires<B: Backend, N: DrivingNet<B>>(_: &N) -> bool {
            N::REQUIRES_METADATA
        }
        dispatch!(self, net => requires::<B, _>(net))
    }

    pub fn requires_controls(&self) -> bool {
        fn requires<B: Backend, N: DrivingNet<B>>(_: &N) -> bool {
            N::REQUIRES_CONTROLS
        }
        dispatch!(self, net => requires::<B, _>(net))
    }

    pub fn n_frames(&self) -> usize {
        dispatch!(self, net => net.n_frames())
    }

    pub fn n_steps(&self) -> usize {
        dispatch!(self, net => net.n_steps())
    }

    /// Number of trainable scalars.
    pub fn num_params(&self) -> usize {
        dispatch!(self, net => net.num_params())
    }

    pub fn forward(&self, input: DrivingInput<B>) -> Result<DrivingOutput<B>, Error> {
        dispatch!(self, net => net.forward(input))
    }

    /// Random input of the right shape for this network, every optional part included.
    pub fn sample_input(&self, batch_size: usize, device: &B::Device) -> DrivingInput<B> {
        let n_frames = self.n_frames();

        DrivingInput::new(Tensor::random(
            [
                batch_size,
                CHANNELS_PER_FRAME * n_frames,
                FRAME_HEIGHT,
                FRAME_WIDTH,
            ],
            Distribution::Default,
            device,
        ))
        .with_metadata(Tensor::random(
            [batch_size, METADATA_CHANNELS, METADATA_HEIGHT, METADATA_WIDTH],
            Distribution::Default,
            device,
        ))
        .with_previous_controls(Tensor::random(
            [batch_size, CONTROLS_PER_STEP * n_frames],
            Distribution::Default,
            device,
        ))
    }
}
