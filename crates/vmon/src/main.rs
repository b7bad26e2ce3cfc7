mod cli;
mod controller;
mod hypervisor;
mod logging;
mod partitioned;
mod sampler;
mod shutdown;

use std::io::{self, BufReader, Write};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use vmon_core::{Collector, VmInfo};
use vmon_engine::{Executor, Scheduler};

use crate::cli::Cli;
use crate::controller::Controller;
use crate::hypervisor::FakeHypervisor;
use crate::sampler::{OutputCollector, Sampler};
use crate::shutdown::{install_ctrlc_handler, ShutdownController, ShutdownEvent};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Err(e) = cli.validate() {
        eprintln!("vmon: {e}");
        std::process::exit(2);
    }

    logging::init(cli.log_level, cli.log_file.as_deref())?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "vmon starting");

    let hypervisor = Arc::new(demo_hypervisor());
    let scheduler = Arc::new(Scheduler::new());
    let executor = Executor::new(scheduler.clone(), cli.max_threads, cli.max_tasks);
    let sampler = Sampler::new(hypervisor, cli.bulk_sampling);
    let collector: Arc<OutputCollector> = Arc::new(Collector::new(Box::new(io::stdout()) as Box<dyn Write + Send>));
    let timeout = if cli.timeout == 0 {
        None
    } else {
        Some(Duration::from_millis(cli.timeout))
    };

    let controller = Arc::new(Controller::new(scheduler, executor, sampler, collector, timeout));
    controller
        .start()
        .map_err(|e| anyhow::anyhow!("failed to start executor: {e}"))?;

    let (events_tx, events_rx) = mpsc::channel::<ShutdownEvent>();
    let shutdown = Arc::new(ShutdownController::new());
    install_ctrlc_handler(shutdown, events_tx.clone())?;

    if cli.polling_period > 0 {
        controller.start_periodic_polling(Duration::from_secs(cli.polling_period));
    } else {
        controller.spawn_stdin_reader(BufReader::new(io::stdin()), events_tx);
    }

    match events_rx.recv() {
        Ok(ShutdownEvent::Immediate) => {
            tracing::warn!("second interrupt received, exiting immediately");
            std::process::exit(130);
        }
        Ok(ShutdownEvent::Graceful) => {
            tracing::info!("shutdown requested, finishing in-flight work");
        }
        Ok(ShutdownEvent::ReaderDone) => {
            tracing::info!("request source closed, shutting down");
        }
        Err(_) => {
            tracing::warn!("shutdown channel closed unexpectedly");
        }
    }

    controller.stop();
    tracing::info!("vmon exiting");
    Ok(())
}

/// No real libvirt binding exists (§1 Non-goals); this demo hypervisor
/// stands in so the binary is runnable end-to-end out of the box.
fn demo_hypervisor() -> FakeHypervisor {
    FakeHypervisor::new()
        .with_domain("demo-vm-1", VmInfo::new("demo-vm-1"))
        .with_domain("demo-vm-2", VmInfo::new("demo-vm-2"))
}
