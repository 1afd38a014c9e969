use std::path::PathBuf;

use captioner::{
    CaptionModelConfig, CellType, Strategy, TrainingConfig, PRETRAINED_CHECKPOINT_EPOCH,
};
use serde::{Deserialize, Serialize};

/// Where the encoder's starting weights come from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Pretrain {
    Scratch,
    Imagenet,
    /// Run id of an earlier run in the record directory.
    Run(String),
}

impl Pretrain {
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None => Pretrain::Scratch,
            Some("Imagenet") => Pretrain::Imagenet,
            Some(run) => Pretrain::Run(run.to_string()),
        }
    }
}

/// Everything a run needs, resolved from the command line.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunConfig {
    pub dataset_path: PathBuf,
    pub patch_size: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub suffix: Option<String>,
    pub cell_type: CellType,
    pub strategy: Strategy,
    pub pretrain: Pretrain,
    pub encoder_type: String,
    pub max_seq_length: usize,
    pub record_dir: PathBuf,
    pub result_dir: PathBuf,
    pub imagenet_weights: PathBuf,
    pub num_workers: usize,
    pub threshold: usize,
    pub seed: u64,
    /// Network shape; the standard layout for the vocabulary when unset.
    pub model: Option<CaptionModelConfig>,
}

impl RunConfig {
    /// Encoder label; a run used as pretraining contributes the prefix of its id.
    pub fn encoder_type(&self) -> &str {
        match &self.pretrain {
            Pretrain::Run(run) => run.split('_').next().unwrap_or(run),
            Pretrain::Scratch | Pretrain::Imagenet => &self.encoder_type,
        }
    }

    /// Directory name shared by every artifact of the run.
    pub fn run_id(&self) -> String {
        let shape = format!(
            "{}_p{}_ep{}_b{}",
            self.cell_type, self.patch_size, self.epochs, self.batch_size
        );
        let id = match &self.pretrain {
            Pretrain::Imagenet => format!("Imagenet_{shape}_{}", self.strategy),
            Pretrain::Scratch => format!("{}_{shape}.scratch", self.encoder_type()),
            Pretrain::Run(_) => format!("{}_{shape}_{}", self.encoder_type(), self.strategy),
        };

        match &self.suffix {
            Some(suffix) => format!("{id}.{suffix}"),
            None => id,
        }
    }

    /// Encoder record to start from, `None` for random initialization.
    pub fn pretrained_encoder(&self) -> Option<PathBuf> {
        match &self.pretrain {
            Pretrain::Scratch => None,
            Pretrain::Imagenet => Some(self.imagenet_weights.clone()),
            Pretrain::Run(run) => Some(
                self.record_dir
                    .join(run)
                    .join("model")
                    .join(format!("encoder_{PRETRAINED_CHECKPOINT_EPOCH}")),
            ),
        }
    }

    /// The vocabulary built for this run always sizes the decoder, whatever shape was
    /// requested.
    pub fn model_config(&self, vocab_size: usize) -> CaptionModelConfig {
        match self.model.clone() {
            Some(mut model) => {
                model.decoder.vocab_size = vocab_size;
                model.decoder.cell_type = self.cell_type;
                model
            }
            None => CaptionModelConfig::create(vocab_size, self.cell_type),
        }
    }

    pub fn training_config(&self, vocab_size: usize) -> TrainingConfig {
        TrainingConfig::new(
            self.model_config(vocab_size),
            TrainingConfig::adam(),
            self.strategy,
        )
        .with_num_epochs(self.epochs)
        .with_batch_size(self.batch_size)
        .with_num_workers(self.num_workers)
        .with_seed(self.seed)
    }
}
