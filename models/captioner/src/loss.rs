use burn::tensor::{activation::log_softmax, backend::Backend, Int, Tensor, TensorData};

/// Token-level cross-entropy between teacher-forced logits `[batch, steps, vocab]`
/// and the captions shifted by one. Positions at or past a caption's true length
/// do not contribute; the result is the mean over the remaining tokens.
pub fn caption_cross_entropy<B: Backend>(
    logits: Tensor<B, 3>,
    captions: Tensor<B, 2, Int>,
    lengths: &[usize],
) -> Tensor<B, 1> {
    let [batch_size, steps, _] = logits.dims();
    let device = logits.device();

    let targets = captions.slice([0..batch_size, 1..steps + 1]);
    let picked = log_softmax(logits, 2)
        .gather(2, targets.unsqueeze_dim::<3>(2))
        .reshape([batch_size, steps]);

    let mask: Vec<f32> = lengths
        .iter()
        .flat_map(|&length| (0..steps).map(move |step| if step + 1 < length { 1.0 } else { 0.0 }))
        .collect();
    let tokens = mask.iter().sum::<f32>().max(1.0);
    let mask = Tensor::<B, 2>::from_data(TensorData::new(mask, [batch_size, steps]), &device);

    picked.mul(mask).sum().neg().div_scalar(tokens)
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use burn::tensor::ElementConversion;

    use super::*;

    type TestBackend = NdArray<f32>;

    #[test]
    fn uniform_logits_give_log_vocab() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 3>::zeros([2, 3, 4], &device);
        let captions = Tensor::<TestBackend, 2, Int>::from_data(
            TensorData::new(vec![0i64, 1, 2, 0, 0, 3, 0, 0], [2, 4]),
            &device,
        );

        let loss = caption_cross_entropy(logits, captions, &[4, 3])
            .into_scalar()
            .elem::<f64>();
        assert!((loss - 4f64.ln()).abs() < 1e-5);
    }

    #[test]
    fn padded_positions_are_ignored() {
        let device = Default::default();
        // Confident on the real token, badly wrong on the padded step.
        let logits = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![10.0f32, -10.0, -10.0, 10.0], [1, 2, 2]),
            &device,
        );
        let captions = Tensor::<TestBackend, 2, Int>::from_data(
            TensorData::new(vec![0i64, 0, 0], [1, 3]),
            &device,
        );

        let loss = caption_cross_entropy(logits, captions, &[2])
            .into_scalar()
            .elem::<f64>();
        assert!(loss >= 0.0);
        assert!(loss < 1e-3);
    }
}
