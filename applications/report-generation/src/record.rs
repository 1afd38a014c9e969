use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;

/// Wall-clock stamp written at the top of every log file.
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochLoss {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
}

/// In-memory loss history, rendered once the run completes.
#[derive(Debug, Default, Clone)]
pub struct LossRecord {
    entries: Vec<EpochLoss>,
}

impl LossRecord {
    pub fn push(&mut self, epoch: usize, train_loss: f64, val_loss: f64) {
        self.entries.push(EpochLoss {
            epoch,
            train_loss,
            val_loss,
        });
    }

    pub fn entries(&self) -> &[EpochLoss] {
        &self.entries
    }

    pub fn train_losses(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|entry| entry.train_loss)
    }

    pub fn val_losses(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|entry| entry.val_loss)
    }
}

/// Plain-text epoch log, appended to and closed after every write so the file is
/// current even if the process dies.
pub struct RunLog {
    path: PathBuf,
    epochs: usize,
}

impl RunLog {
    /// Truncates the log and writes the start timestamp.
    pub fn create(path: &Path, epochs: usize) -> anyhow::Result<Self> {
        fs::write(path, format!("{}\n", timestamp()))
            .with_context(|| format!("cannot create run log '{}'", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            epochs,
        })
    }

    pub fn epoch_losses(&self, epoch: usize, train_loss: f64, val_loss: f64) -> anyhow::Result<()> {
        self.append(&[
            format!("Epoch {epoch:4}/{:4} | Train Loss: {train_loss:?}", self.epochs),
            format!("Epoch {epoch:4}/{:4} | Val Loss: {val_loss:?}", self.epochs),
        ])
    }

    pub fn test_loss(&self, epoch: usize, test_loss: f64) -> anyhow::Result<()> {
        self.append(&[format!(
            "Epoch {epoch:4}/{:4} | Test Loss: {test_loss:?}",
            self.epochs
        )])
    }

    pub fn checkpoint_saved(&self, epoch: usize, test_loss: f64) -> anyhow::Result<()> {
        self.append(&[format!(
            "Save model at Epoch {epoch:4}/{:4} | Test Loss: {test_loss:?}",
            self.epochs
        )])
    }

    fn append(&self, lines: &[String]) -> anyhow::Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("cannot open run log '{}'", self.path.display()))?;
        for line in lines {
            writeln!(file, "{line}")?;
        }
        Ok(())
    }
}
