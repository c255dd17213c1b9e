use mc_anvil::World;
use mc_server::{Listener, ServerConfig, console, logging};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    logging::init()?;

    let mut config = ServerConfig::default();
    if let Ok(port) = std::env::var("MC_PORT") {
        config.port = port.parse()?;
    }
    if std::env::var("MC_OFFLINE").is_ok() {
        config.online_mode = false;
    }

    preload_spawn_region(&config);

    info!("Starting server...");
    let listener = Listener::bind(config).await?;
    info!("Server started!");

    // Blocks until the console sees `stop` (or stdin closes).
    console::wait_for_stop().await;

    listener.shutdown().await;
    Ok(())
}

/// Maps the spawn region into memory when world data is present, and fully
/// loads the spawn chunk. A broken region file only costs a warning.
fn preload_spawn_region(config: &ServerConfig) {
    let mut world = World::new(&config.world_root);
    match world.load_region_for_chunk(0, 0) {
        Err(err) => {
            warn!(error = %err, "no spawn region loaded");
            return;
        }
        Ok(region) => info!(chunks = region.len(), "spawn region loaded"),
    }
    if let Some(chunk) = world.chunk_mut(0, 0) {
        match chunk.load() {
            Ok(()) => info!("spawn chunk parsed"),
            Err(err) => warn!(error = %err, "spawn chunk failed to parse"),
        }
    }
}
