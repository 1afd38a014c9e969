use std::path::{Path, PathBuf};

use anyhow::Context;
use burn::data::dataset::Dataset;

use crate::image::{decode, ImageTransform};
use crate::tokenizer::ReportTokenizer;
use crate::types::{Annotation, Split};
use crate::ReportItem;

struct Case {
    id: String,
    image: PathBuf,
    caption: Vec<usize>,
}

/// One split of the IU X-ray dataset. Captions are tokenized up front. Every image
/// is decoded once while the split is built, then again lazily by the loader
/// workers, so each index below `len()` yields an item.
pub struct ReportDataset {
    cases: Vec<Case>,
    transform: ImageTransform,
}

impl ReportDataset {
    pub fn new(
        dataset_dir: &Path,
        annotation: &Annotation,
        split: Split,
        tokenizer: &ReportTokenizer,
        patch_size: usize,
        max_seq_length: usize,
    ) -> anyhow::Result<Self> {
        let images_dir = dataset_dir.join("images");
        let mut cases = Vec::with_capacity(annotation.entries(split).len());

        for entry in annotation.entries(split) {
            let relative = entry.image_path.first().ok_or(anyhow::Error::msg(format!(
                "case '{}' has no image",
                entry.id
            )))?;
            let image = images_dir.join(relative);
            anyhow::ensure!(
                image.is_file(),
                "image '{}' of case '{}' does not exist",
                image.display(),
                entry.id
            );
            decode(&image).with_context(|| format!("unusable image for case '{}'", entry.id))?;

            let mut caption = tokenizer.encode(&entry.report);
            caption.truncate(max_seq_length);

            cases.push(Case {
                id: entry.id.clone(),
                image,
                caption,
            });
        }

        let transform = match split {
            Split::Train => ImageTransform::train(patch_size),
            Split::Val | Split::Test => ImageTransform::eval(patch_size),
        };
        tracing::info!("{split} split: {} cases", cases.len());

        Ok(Self { cases, transform })
    }
}

impl Dataset<ReportItem> for ReportDataset {
    fn get(&self, index: usize) -> Option<ReportItem> {
        let case = self.cases.get(index)?;
        // A `None` here would end the epoch early, so a file that broke after the
        // split was built aborts the run instead.
        let image = self.transform.load(&case.image).unwrap_or_else(|err| {
            tracing::error!("case '{}' is no longer readable: {err:#}", case.id);
            panic!("image of case '{}' became unreadable: {err:#}", case.id)
        });

        Some(ReportItem {
            case_id: case.id.clone(),
            image,
            image_size: self.transform.size,
            length: case.caption.len(),
            caption: case.caption.clone(),
        })
    }

    fn len(&self) -> usize {
        self.cases.len()
    }
}

#[cfg(test)]
mod tests {
    use std::{env, fs};

    use burn::{backend::NdArray, data::dataloader::DataLoaderBuilder};
    use resvg::tiny_skia::{Color, Pixmap};

    use super::*;
    use crate::{types::AnnotationEntry, ReportBatcher};

    type TestBackend = NdArray<f32>;

    fn dataset_dir(name: &str, corrupt: Option<usize>) -> (PathBuf, Annotation) {
        let root = env::temp_dir().join(format!("iu-xray-{name}-{}", std::process::id()));
        fs::remove_dir_all(&root).ok();
        let images = root.join("images");
        fs::create_dir_all(&images).unwrap();

        let mut test = Vec::new();
        for i in 0..5 {
            let file = format!("c{i}.png");
            if corrupt == Some(i) {
                fs::write(images.join(&file), b"not a png").unwrap();
            } else {
                let mut pixmap = Pixmap::new(12, 10).unwrap();
                pixmap.fill(Color::from_rgba8(30 * i as u8, 0, 0, 255));
                pixmap.save_png(images.join(&file)).unwrap();
            }
            test.push(AnnotationEntry {
                id: format!("c{i}"),
                report: "lungs are clear.".to_string(),
                image_path: vec![file],
                split: None,
            });
        }

        let annotation = Annotation {
            train: test.clone(),
            test,
            ..Default::default()
        };
        (root, annotation)
    }

    #[test]
    fn loader_serves_every_case_of_the_split() {
        let (root, annotation) = dataset_dir("complete", None);
        let tokenizer = ReportTokenizer::from_annotation(&annotation, 1);
        let dataset = ReportDataset::new(&root, &annotation, Split::Test, &tokenizer, 8, 60).unwrap();

        let loader = DataLoaderBuilder::new(ReportBatcher::<TestBackend>::new(Default::default()))
            .batch_size(1)
            .build(dataset);
        let case_ids: Vec<String> = loader.iter().flat_map(|batch| batch.case_ids).collect();

        assert_eq!(case_ids, vec!["c0", "c1", "c2", "c3", "c4"]);
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn undecodable_image_fails_the_split() {
        let (root, annotation) = dataset_dir("corrupt", Some(1));
        let tokenizer = ReportTokenizer::from_annotation(&annotation, 1);

        let err = ReportDataset::new(&root, &annotation, Split::Test, &tokenizer, 8, 60)
            .err()
            .expect("corrupt image accepted");
        let message = format!("{err:#}");
        assert!(message.contains("case 'c1'"), "{message}");
        assert!(message.contains("c1.png"), "{message}");
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn captions_are_truncated() {
        let (root, annotation) = dataset_dir("truncate", None);
        let tokenizer = ReportTokenizer::from_annotation(&annotation, 1);
        let dataset = ReportDataset::new(&root, &annotation, Split::Train, &tokenizer, 8, 3).unwrap();

        let item = dataset.get(4).unwrap();
        assert_eq!(item.caption.len(), 3);
        assert_eq!(item.length, 3);
        assert_eq!(item.image.len(), 3 * 8 * 8);
        fs::remove_dir_all(&root).ok();
    }
}
