use std::sync::Arc;

use burn::{
    data::dataloader::DataLoader,
    tensor::{backend::Backend, Int, Tensor},
};
use iu_xray::{ReportBatch, ReportTokenizer};

use crate::training::progress_bar;
use crate::CaptionModel;

/// A free-running prediction next to its ground truth.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedReport {
    pub case_id: String,
    pub hypothesis: String,
    pub reference: String,
}

/// Samples a report for every case of the split, in loader order.
pub fn generate_reports<B: Backend>(
    model: &CaptionModel<B>,
    loader: &Arc<dyn DataLoader<ReportBatch<B>>>,
    tokenizer: &ReportTokenizer,
    max_len: usize,
) -> anyhow::Result<Vec<GeneratedReport>> {
    let bar = progress_bar(loader.num_items());
    bar.set_message("Report Generating");
    let mut reports = Vec::with_capacity(loader.num_items());

    for batch in loader.iter() {
        let sampled = model.sample(batch.images, max_len);
        let hypotheses = rows(sampled)?;
        let references = rows(batch.captions)?;

        for ((case_id, hypothesis), reference) in
            batch.case_ids.into_iter().zip(hypotheses).zip(references)
        {
            reports.push(GeneratedReport {
                case_id,
                hypothesis: tokenizer.decode(hypothesis.get(1..).unwrap_or_default()),
                reference: tokenizer.decode(reference.get(1..).unwrap_or_default()),
            });
            bar.inc(1);
        }
    }
    bar.finish_and_clear();

    Ok(reports)
}

fn rows<B: Backend>(ids: Tensor<B, 2, Int>) -> anyhow::Result<Vec<Vec<usize>>> {
    let [_, width] = ids.dims();
    let flat = ids
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|err| anyhow::anyhow!("cannot read token ids: {err:?}"))?;

    Ok(flat
        .chunks(width.max(1))
        .map(|row| row.iter().map(|&id| id.max(0) as usize).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use burn::{
        backend::NdArray,
        data::{dataloader::DataLoaderBuilder, dataset::InMemDataset},
    };
    use iu_xray::{Annotation, AnnotationEntry, ReportBatcher, ReportItem};

    use super::*;
    use crate::{CaptionModelConfig, CellType, DecoderConfig, EncoderConfig};

    type TestBackend = NdArray<f32>;

    #[test]
    fn decodes_every_row_of_every_batch() {
        let device = Default::default();
        let annotation = Annotation {
            train: vec![AnnotationEntry {
                id: "CXR1".to_string(),
                report: "heart size normal. lungs clear.".to_string(),
                image_path: vec!["CXR1/0.png".to_string()],
                split: None,
            }],
            ..Default::default()
        };
        let tokenizer = ReportTokenizer::from_annotation(&annotation, 1);
        let caption = tokenizer.encode(&annotation.train[0].report);

        let items: Vec<ReportItem> = (0..3)
            .map(|i| ReportItem {
                case_id: format!("CXR{i}"),
                image: vec![0.1 * i as f32; 3 * 8 * 8],
                image_size: 8,
                length: caption.len(),
                caption: caption.clone(),
            })
            .collect();
        let loader = DataLoaderBuilder::new(ReportBatcher::<TestBackend>::new(device))
            .batch_size(2)
            .build(InMemDataset::new(items));

        let model = CaptionModelConfig::new(
            EncoderConfig::new().with_feature_dim(4).with_channels(vec![2]),
            DecoderConfig::new(tokenizer.vocab_size(), CellType::Gru)
                .with_feature_dim(4)
                .with_embed_size(4)
                .with_hidden_size(4),
        )
        .init::<TestBackend>(&device);

        let reports = generate_reports(&model, &loader, &tokenizer, 5).unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[2].case_id, "CXR2");
        assert!(reports
            .iter()
            .all(|report| report.reference == "heart size normal . lungs clear ."));
        assert!(reports
            .iter()
            .all(|report| report.hypothesis.split_whitespace().count() <= 5));
    }
}
