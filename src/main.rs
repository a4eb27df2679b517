use anyhow::Context;
use clap::Parser;

use fer_cnn::cli::Args;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let report = fer_cnn::driver::run(&args).context("fer-cnn failed")?;

    if let Some(summary) = &report.summary {
        for failure in &summary.checkpoint_failures {
            eprintln!("warning: {failure}");
        }
    }
    println!("========== Finished Training ==========");
    println!("Training accuracy: {:.3}", report.train_accuracy);
    println!("Validation accuracy: {:.3}", report.val_accuracy);
    Ok(())
}
