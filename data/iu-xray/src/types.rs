use std::{fmt, fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnnotationEntry {
    pub id: String,
    pub report: String,
    pub image_path: Vec<String>,
    #[serde(default)]
    pub split: Option<String>,
}

/// Contents of `annotation.json`: the three splits of the dataset.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Annotation {
    pub train: Vec<AnnotationEntry>,
    pub val: Vec<AnnotationEntry>,
    pub test: Vec<AnnotationEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Annotation {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read annotation file '{}'", path.display()))?;
        let annotation: Annotation = serde_json::from_str(&raw)
            .with_context(|| format!("malformed annotation file '{}'", path.display()))?;

        tracing::info!(
            "annotation loaded: {} train, {} val, {} test cases",
            annotation.train.len(),
            annotation.val.len(),
            annotation.test.len()
        );
        Ok(annotation)
    }

    pub fn entries(&self, split: Split) -> &[AnnotationEntry] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        };
        f.write_str(name)
    }
}
