use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;

/// Artifact paths of one run:
///
/// ```text
/// <record_dir>/<run_id>/<run_id>.log
/// <record_dir>/<run_id>/config.json
/// <record_dir>/<run_id>/run.json
/// <record_dir>/<run_id>/loss.png
/// <record_dir>/<run_id>/model/{encoder,decoder}_<epoch>.mpk
/// <result_dir>/<run_id>/caption_<epoch>.log
/// ```
#[derive(Debug, Clone)]
pub struct RunLayout {
    run_id: String,
    record: PathBuf,
    results: PathBuf,
}

impl RunLayout {
    pub fn new(record_dir: &Path, result_dir: &Path, run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            record: record_dir.join(run_id),
            results: result_dir.join(run_id),
        }
    }

    pub fn create_dirs(&self) -> anyhow::Result<()> {
        for dir in [self.model_dir(), self.results.clone()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("cannot create '{}'", dir.display()))?;
        }
        Ok(())
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn log_path(&self) -> PathBuf {
        self.record.join(format!("{}.log", self.run_id))
    }

    pub fn config_path(&self) -> PathBuf {
        self.record.join("config.json")
    }

    pub fn run_config_path(&self) -> PathBuf {
        self.record.join("run.json")
    }

    pub fn model_dir(&self) -> PathBuf {
        self.record.join("model")
    }

    pub fn chart_path(&self) -> PathBuf {
        self.record.join("loss.png")
    }

    pub fn caption_log_path(&self, epoch: usize) -> PathBuf {
        self.results.join(format!("caption_{epoch}.log"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_run_id() {
        let layout = RunLayout::new(
            Path::new("../record"),
            Path::new("../results"),
            "SSL_LSTM_p256_ep400_b32.scratch",
        );

        assert_eq!(
            layout.log_path(),
            PathBuf::from("../record/SSL_LSTM_p256_ep400_b32.scratch/SSL_LSTM_p256_ep400_b32.scratch.log")
        );
        assert_eq!(
            layout.caption_log_path(10),
            PathBuf::from("../results/SSL_LSTM_p256_ep400_b32.scratch/caption_10.log")
        );
        assert_eq!(
            layout.model_dir(),
            PathBuf::from("../record/SSL_LSTM_p256_ep400_b32.scratch/model")
        );
    }
}
