//! plate_readerd - live plate reader daemon
//!
//! This daemon:
//! 1. Loads layered configuration (file + environment)
//! 2. Builds the plate and character detectors
//! 3. Serves the control API and the MJPEG video feed
//! 4. Runs the processing loop until Ctrl-C

use anyhow::{anyhow, Result};
use std::sync::mpsc;

use plate_reader::{
    api::{ApiConfig, ApiServer},
    build_registry, file_opener, Pipeline, ReaderConfig, Scanner,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = ReaderConfig::load()?;
    let scanner = Scanner::new(build_registry(&cfg.detector)?, &cfg.detector);
    log::info!("detector backends: {}", scanner.registry().list().join(", "));
    if let Err(err) = scanner.registry().warm_up() {
        log::warn!("detector warm-up failed: {:#}", err);
    }

    let pipeline = Pipeline::new(&cfg, scanner, file_opener());
    let handle = pipeline.handle();
    if let Some(path) = &cfg.source.path {
        match handle.load_source(path) {
            Ok(()) => log::info!("initial source {}", path),
            Err(err) => log::warn!("initial source {} not loaded: {}", path, err),
        }
    }

    let api_config = ApiConfig {
        addr: cfg.api_addr.clone(),
        upload_dir: cfg.upload_dir.clone(),
        ..ApiConfig::default()
    };
    let api_handle = ApiServer::new(api_config, handle.clone()).spawn()?;
    log::info!("control api listening on {}", api_handle.addr);
    log::info!(
        "video feed at http://{}/video_feed, uploads stored in {}",
        api_handle.addr,
        cfg.upload_dir.display()
    );

    let loop_thread = std::thread::spawn(move || pipeline.run());

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("plate_readerd running, waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping...");
    handle.shutdown();
    loop_thread
        .join()
        .map_err(|_| anyhow!("processing loop panicked"))?;
    api_handle.stop()?;

    Ok(())
}
