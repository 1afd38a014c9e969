use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::Context;
use captioner::GeneratedReport;

use crate::record::timestamp;
use crate::scoring::Scorer;

/// Examples written out per report file; metrics always cover the whole split.
pub const MAX_EXAMPLES: usize = 30;

/// Writes the qualitative report for one evaluation: timestamp, the first
/// [`MAX_EXAMPLES`] predictions next to their references, then one line per metric.
pub fn write_caption_log(
    path: &Path,
    reports: &[GeneratedReport],
    scorer: &dyn Scorer,
) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("cannot create caption log '{}'", path.display()))?;
    let mut out = BufWriter::new(file);

    writeln!(out, "{}", timestamp())?;
    for report in reports.iter().take(MAX_EXAMPLES) {
        writeln!(out, "======= {} =======", report.case_id)?;
        writeln!(out, "Out: {}", report.hypothesis)?;
        writeln!(out, "True: {}", report.reference)?;
    }

    let (references, hypotheses): (Vec<String>, Vec<String>) = reports
        .iter()
        .map(|report| (report.reference.clone(), report.hypothesis.clone()))
        .unzip();
    let metrics = scorer.score(&references, &hypotheses);
    for (name, value) in &metrics {
        writeln!(out, "{name}: {value}")?;
    }
    out.flush()?;

    tracing::info!(
        "report written to '{}': {}",
        path.display(),
        metrics
            .iter()
            .map(|(name, value)| format!("{name}={value:.4}"))
            .collect::<Vec<_>>()
            .join(" ")
    );
    Ok(())
}
