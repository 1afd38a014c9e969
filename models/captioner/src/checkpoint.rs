use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use burn::{
    module::Module,
    record::{CompactRecorder, FileRecorder},
    tensor::backend::Backend,
};
use log::info;

use crate::{CaptionModel, Encoder};

/// Epoch whose encoder snapshot is used when another run serves as pretraining.
// Assumes the referenced run trained for at least this many epochs.
pub const PRETRAINED_CHECKPOINT_EPOCH: usize = 500;

/// Checkpoints are taken on every multiple of this epoch interval.
pub const CHECKPOINT_INTERVAL: usize = 10;

pub fn is_checkpoint_epoch(epoch: usize) -> bool {
    epoch % CHECKPOINT_INTERVAL == 0
}

/// Epoch-numbered encoder/decoder snapshots of one run. Nothing is ever rotated.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Path of the encoder snapshot without the recorder's extension.
    pub fn encoder_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("encoder_{epoch}"))
    }

    pub fn decoder_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("decoder_{epoch}"))
    }

    /// Path the recorder actually writes for `stem`.
    pub fn file_for<B: Backend>(stem: &Path) -> PathBuf {
        stem.with_extension(<CompactRecorder as FileRecorder<B>>::file_extension())
    }

    pub fn save<B: Backend>(&self, model: &CaptionModel<B>, epoch: usize) -> anyhow::Result<()> {
        let recorder = CompactRecorder::new();
        let encoder_path = self.encoder_path(epoch);
        model
            .encoder
            .clone()
            .save_file(&encoder_path, &recorder)
            .map_err(|err| anyhow::anyhow!("cannot save '{}': {err:?}", encoder_path.display()))?;

        let decoder_path = self.decoder_path(epoch);
        model
            .decoder
            .clone()
            .save_file(&decoder_path, &recorder)
            .map_err(|err| anyhow::anyhow!("cannot save '{}': {err:?}", decoder_path.display()))?;

        info!("checkpoint saved at epoch {epoch} in '{}'", self.dir.display());
        Ok(())
    }
}

/// Loads encoder weights recorded by [`CheckpointManager::save`] or an external
/// record in the same format.
pub fn load_encoder<B: Backend>(
    encoder: Encoder<B>,
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<Encoder<B>> {
    info!("loading encoder weights from '{}'", path.display());
    encoder
        .load_file(path, &CompactRecorder::new(), device)
        .map_err(|err| anyhow::anyhow!("cannot load encoder '{}': {err:?}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::env;

    use burn::backend::NdArray;

    use super::*;
    use crate::{CaptionModelConfig, CellType, DecoderConfig, EncoderConfig};

    type TestBackend = NdArray<f32>;

    #[test]
    fn checkpoint_epochs_are_multiples_of_ten() {
        let epochs: Vec<usize> = (1..=35).filter(|&e| is_checkpoint_epoch(e)).collect();
        assert_eq!(epochs, vec![10, 20, 30]);
    }

    #[test]
    fn saved_encoder_loads_back() {
        let device = Default::default();
        let dir = env::temp_dir().join(format!("captioner-checkpoint-{}", std::process::id()));
        let config = CaptionModelConfig::new(
            EncoderConfig::new().with_feature_dim(4).with_channels(vec![2]),
            DecoderConfig::new(5, CellType::Lstm)
                .with_feature_dim(4)
                .with_embed_size(3)
                .with_hidden_size(3),
        );
        let model = config.init::<TestBackend>(&device);

        let manager = CheckpointManager::new(&dir).unwrap();
        manager.save(&model, 10).unwrap();

        assert!(CheckpointManager::file_for::<TestBackend>(&manager.encoder_path(10)).is_file());
        assert!(CheckpointManager::file_for::<TestBackend>(&manager.decoder_path(10)).is_file());

        let fresh = config.encoder.init::<TestBackend>(&device);
        let loaded = load_encoder(fresh, &manager.encoder_path(10), &device).unwrap();
        assert_eq!(loaded.num_params(), model.encoder.num_params());

        fs::remove_dir_all(&dir).ok();
    }
}
