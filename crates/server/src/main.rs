use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use brasadb_common::{
    DEFAULT_AOF_PATH, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SWEEP_INTERVAL_SECS, MAX_CONNECTIONS,
    Metrics,
};
use brasadb_server::{Connection, ServerMetrics, handle_connection};
use brasadb_storage::{
    Aof, FsyncPolicy, Store, SystemClock, replay_into, start_flusher, start_sweeper,
};

#[derive(Parser, Debug)]
#[command(name = "brasadb-server", about = "BrasaDB — in-memory key-value store")]
struct Args {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    #[arg(long, default_value_t = MAX_CONNECTIONS)]
    max_connections: usize,
    #[arg(long, value_name = "FILE", default_value = DEFAULT_AOF_PATH)]
    aof: PathBuf,
    #[arg(long, default_value = "always", value_parser = parse_fsync)]
    fsync: FsyncPolicy,
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_SWEEP_INTERVAL_SECS)]
    sweep_interval: u64,
}

fn parse_fsync(s: &str) -> Result<FsyncPolicy, String> {
    match s.to_lowercase().as_str() {
        "always" => Ok(FsyncPolicy::Always),
        "everysec" => Ok(FsyncPolicy::EverySec),
        "no" => Ok(FsyncPolicy::No),
        _ => Err(format!("valor inválido: '{s}'. Use: always, everysec, no")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "brasadb_server=info".into()),
        )
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let metrics = Arc::new(ServerMetrics::new()?);
    let store = Store::with(Arc::new(SystemClock), metrics.clone());

    // Replay do log antes de aceitar qualquer conexão
    let count = replay_into(&args.aof, &store).await?;
    if count > 0 {
        info!("{count} registros restaurados do AOF");
    }

    let aof = Arc::new(Aof::open(&args.aof, args.fsync).await?);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let sweeper = start_sweeper(
        store.clone(),
        Duration::from_secs(args.sweep_interval),
        shutdown_tx.subscribe(),
    );
    let flusher = (args.fsync == FsyncPolicy::EverySec)
        .then(|| start_flusher(aof.clone(), shutdown_tx.subscribe()));

    let listener = TcpListener::bind(&addr).await?;
    info!("BrasaDB escutando em {addr}");

    let semaphore = Arc::new(tokio::sync::Semaphore::new(args.max_connections));

    loop {
        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => permit.unwrap(),
            _ = signal::ctrl_c() => {
                info!("shutdown signal recebido");
                break;
            }
        };

        let (socket, peer) = tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok(v) => v,
                    Err(e) => {
                        error!("erro ao aceitar conexão: {e}");
                        continue;
                    }
                }
            }
            _ = signal::ctrl_c() => {
                info!("shutdown signal recebido");
                break;
            }
        };

        info!("nova conexão: {peer}");
        metrics.connection_opened();

        let store = store.clone();
        let aof = aof.clone();
        let metrics = metrics.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            let conn = Connection::new(socket);
            if let Err(e) =
                handle_connection(conn, store, Some(aof), metrics.clone(), &mut shutdown_rx).await
            {
                error!("erro na conexão {peer}: {e}");
            }
            metrics.connection_closed();
            info!("conexão encerrada: {peer}");
            drop(permit);
        });
    }

    // Acorda as tarefas de fundo e espera o fsync final do log
    drop(shutdown_tx);
    sweeper.await?;
    if let Some(flusher) = flusher {
        flusher.await?;
    }

    Ok(())
}
