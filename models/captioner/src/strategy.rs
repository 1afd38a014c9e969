use std::fmt;

use burn::{
    module::AutodiffModule,
    tensor::{backend::AutodiffBackend, Tensor},
};
use serde::{Deserialize, Serialize};

use crate::encoder::Encoder;

/// Which networks take part in optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Encoder and decoder are both updated.
    Finetune,
    /// Encoder runs in eval mode outside the autodiff graph; only the decoder
    /// receives gradients.
    Freeze,
}

impl Strategy {
    pub fn updates_encoder(&self) -> bool {
        matches!(self, Strategy::Finetune)
    }

    /// Encodes a training batch according to the strategy. A frozen encoder runs on
    /// the inner backend, so its parameters get no gradients (and are therefore left
    /// untouched by the optimizer) and its normalization statistics stay fixed.
    pub fn encode<B: AutodiffBackend>(&self, encoder: &Encoder<B>, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            Strategy::Finetune => encoder.forward(images),
            Strategy::Freeze => Tensor::from_inner(encoder.valid().forward(images.inner())),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Finetune => f.write_str("finetune"),
            Strategy::Freeze => f.write_str("freeze"),
        }
    }
}
