use std::{fs, sync::Arc};

use anyhow::Context;
use burn::{
    config::Config,
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    tensor::backend::{AutodiffBackend, Backend},
};
use captioner::{
    evaluate, generate_reports, is_checkpoint_epoch, load_encoder, train_epoch, CaptionModel,
    CheckpointManager, EpochProgress, Phase, StepScheduler, TrainingConfig,
};
use iu_xray::{Annotation, ReportBatch, ReportBatcher, ReportDataset, ReportTokenizer, Split};

use crate::chart::save_loss_chart;
use crate::config::RunConfig;
use crate::layout::RunLayout;
use crate::record::{LossRecord, RunLog};
use crate::report::write_caption_log;
use crate::scoring::CaptionScorer;

/// Everything the step functions need, passed explicitly instead of living in
/// globals: the resolved configuration, artifact paths, the epoch log, the
/// vocabulary and the checkpoint writer.
pub struct RunContext {
    pub config: RunConfig,
    pub training: TrainingConfig,
    pub layout: RunLayout,
    pub log: RunLog,
    pub tokenizer: ReportTokenizer,
    pub checkpoints: CheckpointManager,
}

pub struct RunSummary {
    pub run_id: String,
    pub record: LossRecord,
}

struct Loaders<B: AutodiffBackend> {
    train: Arc<dyn DataLoader<ReportBatch<B>>>,
    val: Arc<dyn DataLoader<ReportBatch<B::InnerBackend>>>,
    test: Arc<dyn DataLoader<ReportBatch<B::InnerBackend>>>,
}

fn build_loader<B: Backend>(
    dataset: ReportDataset,
    device: &B::Device,
    batch_size: usize,
    num_workers: usize,
    shuffle_seed: Option<u64>,
) -> Arc<dyn DataLoader<ReportBatch<B>>> {
    let mut builder = DataLoaderBuilder::new(ReportBatcher::<B>::new(device.clone())).batch_size(batch_size);
    if let Some(seed) = shuffle_seed {
        builder = builder.shuffle(seed);
    }
    if num_workers > 0 {
        builder = builder.num_workers(num_workers);
    }
    builder.build(dataset)
}

impl RunContext {
    /// Creates the run directories and log, builds the vocabulary and saves both
    /// configuration files.
    pub fn initialize(config: RunConfig, annotation: &Annotation) -> anyhow::Result<Self> {
        let layout = RunLayout::new(&config.record_dir, &config.result_dir, &config.run_id());
        layout.create_dirs()?;
        let log = RunLog::create(&layout.log_path(), config.epochs)?;

        let tokenizer = ReportTokenizer::from_annotation(annotation, config.threshold);
        let training = config.training_config(tokenizer.vocab_size());
        training
            .save(layout.config_path())
            .with_context(|| format!("cannot save '{}'", layout.config_path().display()))?;
        fs::write(layout.run_config_path(), serde_json::to_string_pretty(&config)?)
            .with_context(|| format!("cannot save '{}'", layout.run_config_path().display()))?;

        let checkpoints = CheckpointManager::new(layout.model_dir())?;
        tracing::info!("run '{}' initialized", layout.run_id());

        Ok(Self {
            config,
            training,
            layout,
            log,
            tokenizer,
            checkpoints,
        })
    }

    fn loaders<B: AutodiffBackend>(
        &self,
        annotation: &Annotation,
        device: &B::Device,
    ) -> anyhow::Result<Loaders<B>> {
        let dataset = |split| {
            ReportDataset::new(
                &self.config.dataset_path,
                annotation,
                split,
                &self.tokenizer,
                self.config.patch_size,
                self.config.max_seq_length,
            )
        };
        let workers = self.training.num_workers;

        Ok(Loaders {
            train: build_loader::<B>(
                dataset(Split::Train)?,
                device,
                self.training.batch_size,
                workers,
                Some(self.training.seed),
            ),
            val: build_loader::<B::InnerBackend>(
                dataset(Split::Val)?,
                device,
                self.training.batch_size,
                workers,
                None,
            ),
            test: build_loader::<B::InnerBackend>(dataset(Split::Test)?, device, 1, workers, None),
        })
    }

    /// Test loss, qualitative report and checkpoint for an evaluation epoch.
    fn periodic_evaluation<B: Backend>(
        &self,
        model: &CaptionModel<B>,
        test_loader: &Arc<dyn DataLoader<ReportBatch<B>>>,
        progress: EpochProgress,
    ) -> anyhow::Result<()> {
        let epoch = progress.epoch;
        let test_loss = evaluate(model, test_loader, Phase::Test, progress)?;
        self.log.test_loss(epoch, test_loss)?;

        let reports = generate_reports(
            model,
            test_loader,
            &self.tokenizer,
            self.config.max_seq_length,
        )?;
        write_caption_log(&self.layout.caption_log_path(epoch), &reports, &CaptionScorer)?;

        self.log.checkpoint_saved(epoch, test_loss)?;
        self.checkpoints.save(model, epoch)
    }
}

/// Runs the full schedule: train, validate and step the learning rate every epoch,
/// evaluate on the test split and checkpoint every tenth epoch, chart the losses at
/// the end.
pub fn run<B: AutodiffBackend>(config: RunConfig, device: B::Device) -> anyhow::Result<RunSummary> {
    tracing::info!("============== Load Dataset ===============");
    let annotation = Annotation::load(&config.dataset_path.join("annotation.json"))?;
    let ctx = RunContext::initialize(config, &annotation)?;
    B::seed(ctx.training.seed);

    let loaders = ctx.loaders::<B>(&annotation, &device)?;
    let mut model: CaptionModel<B> = ctx.training.model.init(&device);
    if let Some(path) = ctx.config.pretrained_encoder() {
        model.encoder = load_encoder(model.encoder, &path, &device)?;
    }

    let strategy = ctx.training.strategy;
    tracing::info!(
        "strategy {strategy}: encoder is {}",
        if strategy.updates_encoder() { "trained" } else { "frozen" }
    );
    let mut optimizer = ctx.training.optimizer.init::<B, CaptionModel<B>>();
    let mut scheduler = StepScheduler::halfway(
        ctx.training.learning_rate,
        ctx.training.num_epochs,
        ctx.training.lr_gamma,
    );
    let mut record = LossRecord::default();

    tracing::info!("============== Start Training ===============");
    let epochs = ctx.training.num_epochs;
    for epoch in 1..=epochs {
        let progress = EpochProgress { epoch, epochs };

        let (trained, train_loss) = train_epoch(
            model,
            &mut optimizer,
            &loaders.train,
            strategy,
            scheduler.lr(),
            progress,
        )?;
        model = trained;

        let eval_model = model.valid();
        let val_loss = evaluate(&eval_model, &loaders.val, Phase::Val, progress)?;
        scheduler.step();

        record.push(epoch, train_loss, val_loss);
        ctx.log.epoch_losses(epoch, train_loss, val_loss)?;
        tracing::info!("epoch {epoch}/{epochs}: train {train_loss:.4}, val {val_loss:.4}");

        if is_checkpoint_epoch(epoch) {
            ctx.periodic_evaluation(&eval_model, &loaders.test, progress)?;
        }
    }

    save_loss_chart(&record, epochs, &ctx.layout.chart_path())?;
    tracing::info!("--- training complete ---");

    Ok(RunSummary {
        run_id: ctx.layout.run_id().to_string(),
        record,
    })
}
