//! The connection supervisor (C8): one discovery-handshake-ingest cycle per
//! attempt, three cooperating tasks sharing the entity graph behind one
//! mutex, and a reconnect policy that tells a clean server close apart from
//! everything else.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use loxone_core::model::Building;
use loxone_data::DieselPool;

use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::transport::{Reader, Socket, Writer};
use crate::{handshake, persist, rest};

/// Runs connection attempts until the miniserver closes the socket cleanly
/// (code 1000), at which point the bridge stops rather than reconnecting.
pub async fn run(config: Config, pool: DieselPool) -> Result<()> {
    loop {
        match run_once(&config, &pool).await {
            Ok(()) => return Ok(()),
            Err(error) if error.is_clean_close() => {
                tracing::info!("miniserver closed the connection cleanly, stopping");
                return Ok(());
            }
            Err(error) => {
                tracing::warn!(%error, backoff_seconds = config.reconnect_backoff_seconds, "connection attempt failed, reconnecting");
                tokio::time::sleep(Duration::from_secs(config.reconnect_backoff_seconds)).await;
            }
        }
    }
}

async fn run_once(config: &Config, pool: &DieselPool) -> Result<()> {
    let client = reqwest::Client::new();
    let info = rest::get_info(&client, &config.host).await?;
    let public_key_pem = rest::get_public_key(&client, &config.host).await?;

    let ws_url = format!("{}/ws/rfc6455", info.ws_base_url);
    let mut socket = Socket::connect(&ws_url, config.insecure_skip_verify).await?;

    let outcome = handshake::perform(&mut socket, &config.user, &config.password, &public_key_pem).await?;
    let building = loxone_core::structure::parse_building(&outcome.structure_json)?;
    tracing::info!(serial = %info.serial, rooms = building.rooms.len(), "structure loaded, entering live ingest");

    let building = Arc::new(Mutex::new(building));
    let (reader, writer) = socket.split();
    let max_aggregation = Duration::from_secs(config.max_aggregation_seconds);

    let mut keepalive = tokio::spawn(keepalive_loop(writer, Duration::from_secs(config.keepalive_seconds)));
    let mut ingest = tokio::spawn(ingest_loop(reader, building.clone(), pool.clone(), max_aggregation));
    let mut snapshot = tokio::spawn(persist::scheduled_loop(building.clone(), pool.clone(), max_aggregation));

    let outcome = tokio::select! {
        result = &mut keepalive => join_result(result),
        result = &mut ingest => join_result(result),
        result = &mut snapshot => join_result(result),
    };

    keepalive.abort();
    ingest.abort();
    snapshot.abort();

    outcome
}

fn join_result(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match result {
        Ok(inner) => inner,
        Err(join_error) if join_error.is_cancelled() => Ok(()),
        Err(join_error) => Err(BridgeError::Io(std::io::Error::other(join_error))),
    }
}

async fn keepalive_loop(mut writer: Writer, interval: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately; skip it
    loop {
        ticker.tick().await;
        writer.send_keepalive().await?;
    }
}

async fn ingest_loop(mut reader: Reader, building: Arc<Mutex<Building>>, pool: DieselPool, max_aggregation: Duration) -> Result<()> {
    use loxone_core::frame::Identifier;

    loop {
        let header = reader.recv_header().await?;
        match header.identifier {
            Identifier::KeepAlive => {
                if header.size > 0 {
                    reader.recv_body().await?;
                }
            }
            Identifier::ValueStates => {
                let body = reader.recv_body().await?;
                let records = loxone_core::frame::decode_value_states(&body)?;
                {
                    let mut guard = building.lock().await;
                    for (identifier, value) in &records {
                        guard.update(identifier, Some(*value));
                    }
                }
                persist::after_ingest_batch(&building, &pool, max_aggregation).await;
            }
            _ => {
                if header.size > 0 {
                    reader.recv_body().await?;
                }
            }
        }
    }
}
