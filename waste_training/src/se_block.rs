use ndarray::{Array, Array1, Array2, Array3, ArrayView3, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;

/// Shape of EfficientNetB0's last feature map at 224x224 input.
pub const BACKBONE_FEATURES: (usize, usize, usize) = (7, 7, 1280);

#[derive(Error, Debug, PartialEq)]
pub enum SeBlockError {
    #[error("Reduction {reduction} leaves no hidden units for {channels} channels")]
    Reduction { channels: usize, reduction: usize },
    #[error("Weight shape {found:?} does not match expected {expected:?}")]
    WeightShape {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("Feature map has {found} channels, block expects {expected}")]
    Channels { expected: usize, found: usize },
    #[error("Output shape {found:?} does not match input shape {expected:?}")]
    OutputShape {
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },
    #[error("Gate range [{min}, {max}] leaves the open unit interval")]
    GateRange { min: f32, max: f32 },
}

/// Result of pushing one feature map through a freshly initialised block.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HeadCheck {
    pub feature_map: (usize, usize, usize),
    pub hidden_units: usize,
    pub gate_min: f32,
    pub gate_max: f32,
}

/// Squeeze-and-excitation channel attention over an `(H, W, C)` feature map:
/// global average pool, a reducing dense layer with ReLU, an expanding dense
/// layer with sigmoid, then a per-channel rescale of the input.
#[derive(Debug, Clone)]
pub struct SeBlock {
    squeeze: Array2<f32>,
    excite: Array2<f32>,
}

pub fn hidden_units(channels: usize, reduction: usize) -> Result<usize, SeBlockError> {
    let hidden = if reduction == 0 { 0 } else { channels / reduction };
    if hidden == 0 {
        return Err(SeBlockError::Reduction {
            channels,
            reduction,
        });
    }
    Ok(hidden)
}

impl SeBlock {
    /// `squeeze` is `(C, C / r)` and `excite` is `(C / r, C)`. Neither layer
    /// carries a bias.
    pub fn new(
        channels: usize,
        reduction: usize,
        squeeze: Array2<f32>,
        excite: Array2<f32>,
    ) -> Result<Self, SeBlockError> {
        let hidden = hidden_units(channels, reduction)?;

        if squeeze.dim() != (channels, hidden) {
            return Err(SeBlockError::WeightShape {
                expected: (channels, hidden),
                found: squeeze.dim(),
            });
        }
        if excite.dim() != (hidden, channels) {
            return Err(SeBlockError::WeightShape {
                expected: (hidden, channels),
                found: excite.dim(),
            });
        }

        Ok(Self { squeeze, excite })
    }

    /// He-uniform weights, `U(-sqrt(6 / fan_in), sqrt(6 / fan_in))`, from a
    /// seeded generator.
    pub fn he_uniform(channels: usize, reduction: usize, seed: u64) -> Result<Self, SeBlockError> {
        let hidden = hidden_units(channels, reduction)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut layer = |fan_in: usize, fan_out: usize| {
            let limit = (6.0 / fan_in as f32).sqrt();
            Array2::from_shape_fn((fan_in, fan_out), |_| rng.random_range(-limit..limit))
        };
        let squeeze = layer(channels, hidden);
        let excite = layer(hidden, channels);
        Self::new(channels, reduction, squeeze, excite)
    }

    pub fn channels(&self) -> usize {
        self.squeeze.nrows()
    }

    /// Per-channel gate, every value strictly inside (0, 1).
    pub fn gate(&self, features: ArrayView3<f32>) -> Result<Array1<f32>, SeBlockError> {
        let (_, _, channels) = features.dim();
        if channels != self.channels() {
            return Err(SeBlockError::Channels {
                expected: self.channels(),
                found: channels,
            });
        }

        let pooled = features
            .mean_axis(Axis(0))
            .and_then(|rows| rows.mean_axis(Axis(0)))
            .unwrap_or_else(|| Array1::zeros(channels));

        let hidden = pooled.dot(&self.squeeze).mapv(|v| v.max(0.0));
        Ok(hidden.dot(&self.excite).mapv(sigmoid))
    }

    pub fn forward(&self, features: ArrayView3<f32>) -> Result<Array3<f32>, SeBlockError> {
        let gate = self.gate(features)?;
        Ok(&features * &gate)
    }

    /// Runs `features` through the block and verifies the output keeps the
    /// input shape and every gate value stays strictly inside (0, 1).
    pub fn check(&self, features: ArrayView3<f32>) -> Result<HeadCheck, SeBlockError> {
        let gate = self.gate(features)?;
        let output = &features * &gate;
        if output.dim() != features.dim() {
            return Err(SeBlockError::OutputShape {
                expected: features.dim(),
                found: output.dim(),
            });
        }

        let gate_min = gate.iter().copied().fold(f32::INFINITY, f32::min);
        let gate_max = gate.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if !(gate_min > 0.0 && gate_max < 1.0) {
            return Err(SeBlockError::GateRange {
                min: gate_min,
                max: gate_max,
            });
        }

        Ok(HeadCheck {
            feature_map: features.dim(),
            hidden_units: self.squeeze.ncols(),
            gate_min,
            gate_max,
        })
    }
}

/// Builds the attention block for the backbone's feature map and checks it
/// on a deterministic input with values in [0, 1).
pub fn check_head(reduction: usize, seed: u64) -> Result<HeadCheck, SeBlockError> {
    let (height, width, channels) = BACKBONE_FEATURES;
    let block = SeBlock::he_uniform(channels, reduction, seed)?;
    let features = Array::from_shape_fn((height, width, channels), |(h, w, c)| {
        ((h * width + w) * channels + c) as f32 % 97.0 / 97.0
    });

    let check = block.check(features.view())?;
    tracing::debug!(
        hidden_units = check.hidden_units,
        gate_min = check.gate_min,
        gate_max = check.gate_max,
        "Attention head checked"
    );
    Ok(check)
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}
