use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use pate_teachers::configs::{Args, TeacherConfig};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = TeacherConfig::try_from(Args::parse()).context("invalid configuration")?;
    let report = pate_teachers::run(&config).with_context(|| {
        format!(
            "training teacher {} of {} on {}",
            config.teacher_id, config.nb_teachers, config.dataset
        )
    })?;

    info!(
        "trained for {} epochs, weights saved at {}",
        report.num_epochs,
        report.checkpoint.display()
    );
    Ok(())
}
