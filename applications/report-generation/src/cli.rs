use std::path::PathBuf;

use captioner::{CellType, Strategy};
use clap::{Parser, ValueEnum};

use crate::config::{Pretrain, RunConfig};

#[derive(Parser, Debug)]
#[command(about = "Train a CNN-RNN radiology report generator on IU X-ray")]
pub struct Cli {
    /// Directory holding annotation.json and images/
    #[arg(long = "dataset_path", default_value = "/hdd/vincent18/iu_xray/")]
    pub dataset_path: PathBuf,

    /// Adapter index to train on; empty selects the default device
    #[arg(long = "gpu_id", default_value = "")]
    pub gpu_id: String,

    /// Image size
    #[arg(long = "patch_size", short = 'p', default_value_t = 256)]
    pub patch_size: usize,

    #[arg(long, short = 'e', default_value_t = 400, value_parser = clap::value_parser!(u64).range(1..))]
    pub epochs: u64,

    #[arg(long = "batch_size", short = 'b', default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, short = 's')]
    pub suffix: Option<String>,

    /// Recurrent cell of the decoder
    #[arg(long = "cell_type", short = 'c', value_enum, default_value_t = CellArg::Lstm)]
    pub cell_type: CellArg,

    #[arg(long, value_enum, default_value_t = StrategyArg::Finetune)]
    pub strategy: StrategyArg,

    /// `Imagenet`, or the run id of a previous run to take the encoder from
    #[arg(long)]
    pub pretrain: Option<String>,

    #[arg(long = "encoder_type", default_value = "SSL")]
    pub encoder_type: String,

    /// The maximum sequence length of the reports
    #[arg(long = "max_seq_length", default_value_t = 60)]
    pub max_seq_length: usize,

    #[arg(long = "record_dir", default_value = "../record")]
    pub record_dir: PathBuf,

    #[arg(long = "result_dir", default_value = "../results")]
    pub result_dir: PathBuf,

    /// Encoder record loaded for `--pretrain Imagenet`
    #[arg(long = "imagenet_weights", default_value = "../pretrained/encoder_imagenet")]
    pub imagenet_weights: PathBuf,

    #[arg(long = "num_workers", default_value_t = 16)]
    pub num_workers: usize,

    /// Minimum count for a token to enter the vocabulary
    #[arg(long, default_value_t = 3)]
    pub threshold: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum CellArg {
    #[value(name = "LSTM")]
    Lstm,
    #[value(name = "GRU")]
    Gru,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum StrategyArg {
    Finetune,
    Freeze,
}

impl From<CellArg> for CellType {
    fn from(arg: CellArg) -> Self {
        match arg {
            CellArg::Lstm => CellType::Lstm,
            CellArg::Gru => CellType::Gru,
        }
    }
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Finetune => Strategy::Finetune,
            StrategyArg::Freeze => Strategy::Freeze,
        }
    }
}

impl From<Cli> for RunConfig {
    fn from(cli: Cli) -> Self {
        RunConfig {
            dataset_path: cli.dataset_path,
            patch_size: cli.patch_size,
            epochs: cli.epochs as usize,
            batch_size: cli.batch_size,
            suffix: cli.suffix,
            cell_type: cli.cell_type.into(),
            strategy: cli.strategy.into(),
            pretrain: Pretrain::from_arg(cli.pretrain.as_deref()),
            encoder_type: cli.encoder_type,
            max_seq_length: cli.max_seq_length,
            record_dir: cli.record_dir,
            result_dir: cli.result_dir,
            imagenet_weights: cli.imagenet_weights,
            num_workers: cli.num_workers,
            threshold: cli.threshold,
            seed: cli.seed,
            model: None,
        }
    }
}
