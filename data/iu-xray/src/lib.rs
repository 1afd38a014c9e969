use burn::{
    data::dataloader::batcher::Batcher,
    tensor::{backend::Backend, Int, Tensor, TensorData},
};

mod image;
mod loader;
mod tokenizer;
mod types;
pub use image::ImageTransform;
pub use loader::ReportDataset;
pub use tokenizer::{clean_report, ReportTokenizer, PAD_ID, UNK_TOKEN};
pub use types::{Annotation, AnnotationEntry, Split};

#[derive(Clone)]
pub struct ReportBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> Batcher<ReportItem, ReportBatch<B>> for ReportBatcher<B> {
    fn batch(&self, items: Vec<ReportItem>) -> ReportBatch<B> {
        let batch_size = items.len();
        let image_size = items.first().map(|item| item.image_size).unwrap_or(0);
        let max_length = items.iter().map(|item| item.caption.len()).max().unwrap_or(0);

        let mut pixels = Vec::with_capacity(batch_size * 3 * image_size * image_size);
        let mut captions = Vec::with_capacity(batch_size * max_length);
        let mut case_ids = Vec::with_capacity(batch_size);
        let mut lengths = Vec::with_capacity(batch_size);

        for item in items {
            pixels.extend_from_slice(&item.image);
            captions.extend(item.caption.iter().map(|&id| id as i64));
            captions.extend(std::iter::repeat(PAD_ID as i64).take(max_length - item.caption.len()));
            case_ids.push(item.case_id);
            lengths.push(item.length);
        }

        let images = Tensor::from_data(
            TensorData::new(pixels, [batch_size, 3, image_size, image_size]),
            &self.device,
        );
        let captions = Tensor::from_data(
            TensorData::new(captions, [batch_size, max_length]),
            &self.device,
        );
        tracing::debug!(
            "loaded batch of {:?} and {:?}",
            images.shape(),
            captions.shape()
        );

        ReportBatch {
            case_ids,
            images,
            captions,
            lengths,
        }
    }
}

impl<B: Backend> ReportBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

#[derive(Debug, Clone)]
pub struct ReportBatch<B: Backend> {
    pub case_ids: Vec<String>,
    pub images: Tensor<B, 4>,
    /// `[batch, max_length]`, padded with [`PAD_ID`].
    pub captions: Tensor<B, 2, Int>,
    /// True caption lengths before padding.
    pub lengths: Vec<usize>,
}

impl<B: Backend> ReportBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.case_ids.len()
    }
}

#[derive(Debug, Clone)]
pub struct ReportItem {
    pub case_id: String,
    /// `[3, image_size, image_size]`, row-major, values in `[-1, 1]`.
    pub image: Vec<f32>,
    pub image_size: usize,
    pub caption: Vec<usize>,
    pub length: usize,
}
