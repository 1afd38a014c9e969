use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

#[derive(Config, Debug)]
pub struct EncoderConfig {
    #[config(default = 2048)]
    pub feature_dim: usize,
    /// Output channels of the strided conv blocks, one entry per block.
    #[config(default = "vec![32, 64, 128, 256]")]
    pub channels: Vec<usize>,
}

impl EncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Encoder<B> {
        let mut blocks = Vec::with_capacity(self.channels.len());
        let mut channels_in = 3;
        for &channels_out in &self.channels {
            blocks.push(ConvBlock {
                conv: Conv2dConfig::new([channels_in, channels_out], [3, 3])
                    .with_stride([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device),
                norm: BatchNormConfig::new(channels_out).init(device),
                activation: Relu::new(),
            });
            channels_in = channels_out;
        }

        Encoder {
            blocks,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            projection: LinearConfig::new(channels_in, self.feature_dim).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    activation: Relu,
}

impl<B: Backend> ConvBlock<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.norm.forward(x);
        self.activation.forward(x)
    }
}

/// Convolutional image encoder: `[batch, 3, h, w]` to `[batch, feature_dim]`.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    pool: AdaptiveAvgPool2d,
    projection: Linear<B>,
}

impl<B: Backend> Encoder<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.blocks.iter().fold(images, |x, block| block.forward(x));
        let [batch_size, channels, _, _] = x.dims();
        let pooled = self.pool.forward(x).reshape([batch_size, channels]);
        self.projection.forward(pooled)
    }
}
