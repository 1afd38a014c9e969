use std::fmt;
use std::sync::Arc;

use burn::{
    config::Config,
    data::dataloader::DataLoader,
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion,
    },
};
use indicatif::{ProgressBar, ProgressStyle};
use iu_xray::ReportBatch;
use log::debug;

use crate::{CaptionModel, CaptionModelConfig, Strategy};

#[derive(Config)]
pub struct TrainingConfig {
    pub model: CaptionModelConfig,
    pub optimizer: AdamConfig,
    pub strategy: Strategy,
    #[config(default = 400)]
    pub num_epochs: usize,
    #[config(default = 32)]
    pub batch_size: usize,
    #[config(default = 16)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 1.0e-3)]
    pub learning_rate: f64,
    #[config(default = 0.1)]
    pub lr_gamma: f64,
}

impl TrainingConfig {
    /// Adam with the weight decay used for every run.
    pub fn adam() -> AdamConfig {
        AdamConfig::new().with_weight_decay(Some(WeightDecayConfig::new(1e-6)))
    }
}

/// Position of the loop, threaded into every step for progress reporting.
#[derive(Debug, Clone, Copy)]
pub struct EpochProgress {
    pub epoch: usize,
    pub epochs: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Val,
    Test,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Train => f.write_str("Train"),
            Phase::Val => f.write_str("Val"),
            Phase::Test => f.write_str("Test"),
        }
    }
}

/// Batch-size weighted running mean of per-batch losses.
#[derive(Debug, Default, Clone, Copy)]
pub struct LossMeter {
    total_loss: f64,
    total_num: usize,
}

impl LossMeter {
    pub fn update(&mut self, loss: f64, batch_size: usize) {
        self.total_loss += loss * batch_size as f64;
        self.total_num += batch_size;
    }

    pub fn current(&self) -> f64 {
        if self.total_num == 0 {
            0.0
        } else {
            self.total_loss / self.total_num as f64
        }
    }

    pub fn mean(&self, phase: Phase) -> anyhow::Result<f64> {
        anyhow::ensure!(self.total_num > 0, "{phase} split produced no samples");
        Ok(self.total_loss / self.total_num as f64)
    }
}

pub fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::with_template("{msg} {bar:30} {pos}/{len} [{elapsed}<{eta}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

fn describe(phase: Phase, progress: EpochProgress, meter: &LossMeter) -> String {
    format!(
        "{phase} Epoch: [{}/{}] Loss: {:.4}",
        progress.epoch,
        progress.epochs,
        meter.current()
    )
}

/// One pass over the training split with teacher forcing. Returns the updated model
/// and the batch-size weighted mean loss.
pub fn train_epoch<B, O>(
    mut model: CaptionModel<B>,
    optimizer: &mut O,
    loader: &Arc<dyn DataLoader<ReportBatch<B>>>,
    strategy: Strategy,
    learning_rate: f64,
    progress: EpochProgress,
) -> anyhow::Result<(CaptionModel<B>, f64)>
where
    B: AutodiffBackend,
    O: Optimizer<CaptionModel<B>, B>,
{
    let bar = progress_bar(loader.num_items());
    let mut meter = LossMeter::default();

    for batch in loader.iter() {
        let batch_size = batch.batch_size();
        let loss = model.forward_training_loss(&batch, strategy);
        let loss_value = loss.clone().into_scalar().elem::<f64>();

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optimizer.step(learning_rate, model, grads);

        meter.update(loss_value, batch_size);
        bar.inc(batch_size as u64);
        bar.set_message(describe(Phase::Train, progress, &meter));
    }
    bar.finish_and_clear();

    let mean = meter.mean(Phase::Train)?;
    debug!("epoch {} train loss {mean}", progress.epoch);
    Ok((model, mean))
}

/// Held-out loss without parameter updates. Validation and test differ only in the
/// split the loader serves.
pub fn evaluate<B: Backend>(
    model: &CaptionModel<B>,
    loader: &Arc<dyn DataLoader<ReportBatch<B>>>,
    phase: Phase,
    progress: EpochProgress,
) -> anyhow::Result<f64> {
    let bar = progress_bar(loader.num_items());
    let mut meter = LossMeter::default();

    for batch in loader.iter() {
        let batch_size = batch.batch_size();
        let loss_value = model.forward_loss(&batch).into_scalar().elem::<f64>();

        meter.update(loss_value, batch_size);
        bar.inc(batch_size as u64);
        bar.set_message(describe(phase, progress, &meter));
    }
    bar.finish_and_clear();

    meter.mean(phase)
}
