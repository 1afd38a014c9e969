use burn::backend::{wgpu::WgpuDevice, Autodiff, Wgpu};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod chart;
mod cli;
mod config;
mod layout;
mod record;
mod report;
mod run;
mod scoring;


/// `--gpu_id 1` or `--gpu_id 1,2` trains on the first listed adapter.
fn select_device(gpu_id: &str) -> WgpuDevice {
    gpu_id
        .split(',')
        .find_map(|id| id.trim().parse::<usize>().ok())
        .map(WgpuDevice::DiscreteGpu)
        .unwrap_or_default()
}

fn main() -> anyhow::Result<()> {
    type MyBackend = Wgpu<f32, i32>;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cmd = cli::Cli::parse();
    let device = select_device(&cmd.gpu_id);
    tracing::info!("training on {device:?}");

    let summary = run::run::<MyAutodiffBackend>(cmd.into(), device)?;
    tracing::info!("run '{}' finished after {} epochs", summary.run_id, summary.record.entries().len());

    Ok(())
}
