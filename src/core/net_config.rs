use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::{fmt, fs, io};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The available network architectures.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum NetKind {
    /// SqueezeNet classifier over discretized steering/control bins
    SqueezeNet,
    /// SqueezeNet trunk with an LSTM encoder/decoder over future steps
    SqueezeNetTimeLstm,
    /// Plain convolutional regressor fusing metadata mid-network
    Feedforward,
    /// Nvidia PilotNet-style convolutional regressor
    Nvidia,
}

impl NetKind {
    pub const ALL: [NetKind; 4] = [
        NetKind::SqueezeNet,
        NetKind::SqueezeNetTimeLstm,
        NetKind::Feedforward,
        NetKind::Nvidia,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NetKind::SqueezeNet => "squeeze_net",
            NetKind::SqueezeNetTimeLstm => "squeeze_net_time_lstm",
            NetKind::Feedforward => "feedforward",
            NetKind::Nvidia => "nvidia",
        }
    }
}

impl fmt::Display for NetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NetKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown net kind \"{}\"", s)))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NetConfig {
    pub kind: NetKind,
    /// Number of stacked past frames fed to the network
    pub n_frames: usize,
    /// Number of future timesteps predicted
    pub n_steps: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            kind: NetKind::SqueezeNet,
            n_frames: 2,
            n_steps: 10,
        }
    }
}

impl NetConfig {
    pub fn new(kind: NetKind, n_frames: usize, n_steps: usize) -> Result<Self, Error> {
        Self::validate_n_frames(&n_frames)?;
        Self::validate_n_steps(&n_steps)?;

        Ok(Self {
            kind,
            n_frames,
            n_steps,
        })
    }

    /// Builder method to change the architecture
    pub fn with_kind(mut self, kind: NetKind) -> Self {
        self.kind = kind;
        self
    }

    /// Builder method to set the number of input frames
    pub fn with_n_frames(mut self, n_frames: usize) -> Result<Self, Error> {
        Self::validate_n_frames(&n_frames)?;
        self.n_frames = n_frames;
        Ok(self)
    }

    /// Builder method to set the prediction horizon
    pub fn with_n_steps(mut self, n_steps: usize) -> Result<Self, Error> {
        Self::validate_n_steps(&n_steps)?;
        self.n_steps = n_steps;
        Ok(self)
    }

    pub fn save(&self, path: &str) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &str) -> Result<Self, Error> {
        let json = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;

        Self::validate_n_frames(&config.n_frames)?;
        Self::validate_n_steps(&config.n_steps)?;

        Ok(config)
    }

    fn validate_n_frames(n_frames: &usize) -> Result<(), Error> {
        if *n_frames < 1 {
            return Err(Error::Validation(
                "n_frames must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_n_steps(n_steps: &usize) -> Result<(), Error> {
        if *n_steps < 1 {
            return Err(Error::Validation(
                "n_steps must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
