use burn::{
    config::Config,
    module::Module,
    tensor::{
        backend::{AutodiffBackend, Backend},
        Int, Tensor,
    },
};
use iu_xray::ReportBatch;

mod checkpoint;
mod decoder;
mod encoder;
mod generation;
mod loss;
mod scheduler;
mod strategy;
mod training;
pub use checkpoint::*;
pub use decoder::{CellType, Decoder, DecoderConfig};
pub use encoder::{Encoder, EncoderConfig};
pub use generation::*;
pub use loss::caption_cross_entropy;
pub use scheduler::StepScheduler;
pub use strategy::Strategy;
pub use training::*;

#[derive(Config, Debug)]
pub struct CaptionModelConfig {
    pub encoder: EncoderConfig,
    pub decoder: DecoderConfig,
}

impl CaptionModelConfig {
    /// Standard layout: a `feature_dim` encoder feeding a decoder of the given cell.
    pub fn create(vocab_size: usize, cell_type: CellType) -> Self {
        let encoder = EncoderConfig::new();
        let decoder = DecoderConfig::new(vocab_size, cell_type).with_feature_dim(encoder.feature_dim);
        Self { encoder, decoder }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> CaptionModel<B> {
        CaptionModel {
            encoder: self.encoder.init(device),
            decoder: self.decoder.init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct CaptionModel<B: Backend> {
    pub encoder: Encoder<B>,
    pub decoder: Decoder<B>,
}

impl<B: Backend> CaptionModel<B> {
    pub fn forward(&self, images: Tensor<B, 4>, captions: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let features = self.encoder.forward(images);
        self.decoder.forward(features, captions)
    }

    /// Teacher-forced loss with every module in its current mode.
    pub fn forward_loss(&self, batch: &ReportBatch<B>) -> Tensor<B, 1> {
        let logits = self.forward(batch.images.clone(), batch.captions.clone());
        caption_cross_entropy(logits, batch.captions.clone(), &batch.lengths)
    }

    pub fn sample(&self, images: Tensor<B, 4>, max_len: usize) -> Tensor<B, 2, Int> {
        let features = self.encoder.forward(images);
        self.decoder.sample(features, max_len)
    }
}

impl<B: AutodiffBackend> CaptionModel<B> {
    /// Training loss; the strategy decides whether the encoder is part of the graph.
    pub fn forward_training_loss(&self, batch: &ReportBatch<B>, strategy: Strategy) -> Tensor<B, 1> {
        let features = strategy.encode(&self.encoder, batch.images.clone());
        let logits = self.decoder.forward(features, batch.captions.clone());
        caption_cross_entropy(logits, batch.captions.clone(), &batch.lengths)
    }
}
