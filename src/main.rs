use crossbeam_channel::unbounded;
use log::{error, info};
use tokio::sync::broadcast;

use nfc_text_tag::config::ServiceConfig;
use nfc_text_tag::types::{NfcCommand, OutgoingMessage};
use nfc_text_tag::{nfc_service, ws};

#[tokio::main]
async fn main() {
    env_logger::init();
    info!("Starting NFC Text Tag Service...");

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load config: {}", err);
            std::process::exit(1);
        }
    };
    let addr = match config.bind_addr() {
        Ok(addr) => addr,
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    };

    // WS -> NFC (Commands). Crossbeam (sync) because the NFC thread blocks.
    let (cmd_tx, cmd_rx) = unbounded::<NfcCommand>();

    // NFC -> WS (Events), fanned out to every client
    let (event_tx, event_rx) = broadcast::channel::<OutgoingMessage>(config.event_capacity);

    // NFC thread -> bridge -> broadcast
    let (bridge_tx, bridge_rx) = unbounded::<OutgoingMessage>();

    let nfc_config = config.clone();
    std::thread::spawn(move || {
        nfc_service::run(nfc_config, bridge_tx, cmd_rx);
    });

    std::thread::spawn(move || {
        while let Ok(msg) = bridge_rx.recv() {
            let _ = event_tx.send(msg);
        }
    });

    ws::start_server(addr, config.event_capacity, cmd_tx, event_rx).await;
}
