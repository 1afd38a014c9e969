use std::fmt;

use burn::{
    config::Config,
    module::Module,
    nn::{
        gru::{Gru, GruConfig},
        lstm::{Lstm, LstmConfig, LstmState},
        Embedding, EmbeddingConfig, Linear, LinearConfig,
    },
    tensor::{backend::Backend, Int, Tensor},
};
use serde::{Deserialize, Serialize};

use iu_xray::PAD_ID;

/// Recurrent cell used by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellType {
    #[serde(rename = "LSTM")]
    Lstm,
    #[serde(rename = "GRU")]
    Gru,
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellType::Lstm => f.write_str("LSTM"),
            CellType::Gru => f.write_str("GRU"),
        }
    }
}

#[derive(Config, Debug)]
pub struct DecoderConfig {
    pub vocab_size: usize,
    pub cell_type: CellType,
    #[config(default = 2048)]
    pub feature_dim: usize,
    #[config(default = 256)]
    pub embed_size: usize,
    #[config(default = 256)]
    pub hidden_size: usize,
}

impl DecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Decoder<B> {
        let cell = match self.cell_type {
            CellType::Lstm => {
                RecurrentCell::Lstm(LstmConfig::new(self.embed_size, self.hidden_size, true).init(device))
            }
            CellType::Gru => {
                RecurrentCell::Gru(GruConfig::new(self.embed_size, self.hidden_size, true).init(device))
            }
        };

        Decoder {
            feature_projection: LinearConfig::new(self.feature_dim, self.embed_size).init(device),
            embedding: EmbeddingConfig::new(self.vocab_size, self.embed_size).init(device),
            cell,
            head: LinearConfig::new(self.hidden_size, self.vocab_size).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub enum RecurrentCell<B: Backend> {
    Lstm(Lstm<B>),
    Gru(Gru<B>),
}

/// Recurrent report decoder.
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    feature_projection: Linear<B>,
    embedding: Embedding<B>,
    cell: RecurrentCell<B>,
    head: Linear<B>,
}

enum RecurrentState<B: Backend> {
    Lstm(LstmState<B, 2>),
    /// Last output, `[batch, 1, hidden]`.
    Gru(Tensor<B, 3>),
}

impl<B: Backend> Decoder<B> {
    /// Teacher-forced logits. The image feature is the first input, followed by
    /// the embedded caption tokens `1..len-1`; step `t` predicts caption token
    /// `t + 1`. Output is `[batch, len - 1, vocab]`.
    pub fn forward(&self, features: Tensor<B, 2>, captions: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = captions.dims();
        let feature = self.feature_projection.forward(features).unsqueeze_dim::<3>(1);

        let inputs = if seq_len > 2 {
            let words = self
                .embedding
                .forward(captions.slice([0..batch_size, 1..seq_len - 1]));
            Tensor::cat(vec![feature, words], 1)
        } else {
            feature
        };

        let (hidden, _) = self.recurrent(inputs, None);
        self.head.forward(hidden)
    }

    /// Greedy decoding of `max_len` tokens. The result starts with the begin
    /// id, so row `i` is `[0, t_1, .., t_max_len]`.
    pub fn sample(&self, features: Tensor<B, 2>, max_len: usize) -> Tensor<B, 2, Int> {
        let [batch_size, _] = features.dims();
        let device = features.device();

        let mut tokens = Vec::with_capacity(max_len + 1);
        tokens.push(Tensor::<B, 2, Int>::full([batch_size, 1], PAD_ID as i64, &device));

        let mut input = self.feature_projection.forward(features).unsqueeze_dim::<3>(1);
        let mut state = None;
        for _ in 0..max_len {
            let (hidden, next_state) = self.recurrent(input, state);
            state = Some(next_state);

            let logits = self.head.forward(hidden);
            let token = logits.argmax(2).reshape([batch_size, 1]);
            input = self.embedding.forward(token.clone());
            tokens.push(token);
        }

        Tensor::cat(tokens, 1)
    }

    fn recurrent(
        &self,
        inputs: Tensor<B, 3>,
        state: Option<RecurrentState<B>>,
    ) -> (Tensor<B, 3>, RecurrentState<B>) {
        match &self.cell {
            RecurrentCell::Lstm(lstm) => {
                let state = match state {
                    Some(RecurrentState::Lstm(state)) => Some(state),
                    _ => None,
                };
                let (output, state) = lstm.forward(inputs, state);
                (output, RecurrentState::Lstm(state))
            }
            RecurrentCell::Gru(gru) => {
                let mut hidden = match state {
                    Some(RecurrentState::Gru(hidden)) => Some(hidden),
                    _ => None,
                };
                // `Gru::forward` only feeds the given state into the first step of a call,
                // so the sequence is unrolled one step per call.
                let [batch_size, seq_len, embed_size] = inputs.dims();
                let mut outputs = Vec::with_capacity(seq_len);
                for step in 0..seq_len {
                    let input = inputs.clone().slice([0..batch_size, step..step + 1, 0..embed_size]);
                    let output = gru.forward(input, hidden);
                    hidden = Some(output.clone());
                    outputs.push(output);
                }

                let output = Tensor::cat(outputs, 1);
                let [_, _, hidden_size] = output.dims();
                let last = output
                    .clone()
                    .slice([0..batch_size, seq_len - 1..seq_len, 0..hidden_size]);
                (output, RecurrentState::Gru(last))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, TensorData};

    use super::*;

    type TestBackend = NdArray<f32>;

    fn config(cell_type: CellType) -> DecoderConfig {
        DecoderConfig::new(11, cell_type)
            .with_feature_dim(6)
            .with_embed_size(5)
            .with_hidden_size(7)
    }

    #[test]
    fn teacher_forcing_predicts_every_position_after_begin() {
        let device = Default::default();
        for cell_type in [CellType::Lstm, CellType::Gru] {
            let decoder = config(cell_type).init::<TestBackend>(&device);
            let features = Tensor::random([2, 6], Distribution::Default, &device);
            let captions = Tensor::<TestBackend, 2, Int>::from_data(
                TensorData::new(vec![0i64, 3, 4, 5, 0, 0, 2, 0, 0, 0], [2, 5]),
                &device,
            );

            assert_eq!(decoder.forward(features, captions).dims(), [2, 4, 11]);
        }
    }

    fn captions(second: i64) -> Tensor<TestBackend, 2, Int> {
        Tensor::from_data(
            TensorData::new(vec![0i64, second, 4, 5, 0], [1, 5]),
            &Default::default(),
        )
    }

    #[test]
    fn earlier_tokens_reach_later_steps() {
        let device = Default::default();
        for cell_type in [CellType::Lstm, CellType::Gru] {
            let decoder = config(cell_type).init::<TestBackend>(&device);
            let features = Tensor::<TestBackend, 2>::random([1, 6], Distribution::Default, &device);

            let logits = decoder.forward(features.clone(), captions(3));
            let changed = decoder.forward(features, captions(9));

            // Step 1 reads caption token 1; step 3 only sees it through the hidden state.
            let step = |logits: Tensor<TestBackend, 3>| logits.slice([0..1, 3..4, 0..11]);
            let delta = (step(logits) - step(changed))
                .abs()
                .sum()
                .into_scalar();
            assert!(delta > 1e-6, "{cell_type} ignores earlier tokens");
        }
    }

    #[test]
    fn teacher_forcing_matches_stepwise_decoding() {
        let device = Default::default();
        for cell_type in [CellType::Lstm, CellType::Gru] {
            let decoder = config(cell_type).init::<TestBackend>(&device);
            let features = Tensor::<TestBackend, 2>::random([1, 6], Distribution::Default, &device);
            let logits = decoder.forward(features.clone(), captions(3));

            let mut input = decoder.feature_projection.forward(features).unsqueeze_dim::<3>(1);
            let mut state = None;
            for (step, token) in [3i64, 4, 5, 0].into_iter().enumerate() {
                let (hidden, next_state) = decoder.recurrent(input, state);
                state = Some(next_state);
                let expected = decoder.head.forward(hidden);

                let delta = (logits.clone().slice([0..1, step..step + 1, 0..11]) - expected)
                    .abs()
                    .max()
                    .into_scalar();
                assert!(delta < 1e-5, "{cell_type} step {step} differs by {delta}");

                let token = Tensor::<TestBackend, 2, Int>::from_data(
                    TensorData::new(vec![token], [1, 1]),
                    &device,
                );
                input = decoder.embedding.forward(token);
            }
        }
    }

    #[test]
    fn sampling_prepends_begin_token() {
        let device = Default::default();
        for cell_type in [CellType::Lstm, CellType::Gru] {
            let decoder = config(cell_type).init::<TestBackend>(&device);
            let features = Tensor::random([3, 6], Distribution::Default, &device);

            let sampled = decoder.sample(features, 8);
            assert_eq!(sampled.dims(), [3, 9]);

            let ids = sampled.into_data().convert::<i64>().to_vec::<i64>().unwrap();
            assert!(ids.iter().step_by(9).all(|&id| id == 0));
            assert!(ids.iter().all(|&id| (0..11).contains(&id)));
        }
    }
}
