use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::{debug, warn};

use brasadb_common::{CommandError, ConnectionError, Metrics};
use brasadb_protocol::{Command, Frame};
use brasadb_storage::{Aof, Store, Ttl};

use crate::Connection;

/// Loop principal de tratamento de uma conexão.
///
/// Um pedido, uma resposta, em ordem. Entrada malformada recebe um Error,
/// o buffer é descartado e a conexão continua viva; só EOF, erro de I/O ou
/// shutdown encerram o loop.
pub async fn handle_connection(
    mut conn: Connection,
    store: Store,
    aof: Option<Arc<Aof>>,
    metrics: Arc<dyn Metrics>,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ConnectionError> {
    loop {
        let result = tokio::select! {
            result = conn.read_frame() => result,
            _ = shutdown.recv() => {
                return Ok(());
            }
        };

        let frame = match result {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()), // EOF
            Err(ConnectionError::Protocol(e)) => {
                warn!("frame malformado: {e}");
                conn.discard_input();
                conn.write_frame(&Frame::Error("ERR invalid command".into()))
                    .await?;
                continue;
            }
            Err(e) => return Err(e),
        };

        let cmd = match Command::from_frame(frame) {
            Ok(cmd) => cmd,
            Err(e) => {
                conn.write_frame(&error_reply(&e)).await?;
                continue;
            }
        };

        debug!("comando recebido: {cmd:?}");
        if !matches!(cmd, Command::Unknown(_)) {
            metrics.record_command(cmd.name());
        }

        let response = execute_command(&cmd, &store, aof.as_ref(), &metrics).await;
        conn.write_frame(&response).await?;
    }
}

/// Executa um comando e retorna o Frame de resposta.
///
/// Mutação no store primeiro; o log só recebe o registro se a mutação
/// aconteceu. EXPIRE nunca é logado: estado de TTL não sobrevive a restart.
async fn execute_command(
    cmd: &Command,
    store: &Store,
    aof: Option<&Arc<Aof>>,
    metrics: &Arc<dyn Metrics>,
) -> Frame {
    match cmd {
        Command::Set { key, value } => {
            if store.put(key.clone(), value.clone()) {
                append_record(cmd, aof, metrics).await;
                Frame::Simple("OK".into())
            } else {
                Frame::Error("ERR key already exists".into())
            }
        }
        Command::Get(key) => match store.get(key) {
            Some(value) => Frame::Bulk(value),
            None => Frame::Null,
        },
        Command::Del(key) => {
            if store.remove(key) {
                append_record(cmd, aof, metrics).await;
                Frame::Integer(1)
            } else {
                Frame::Integer(0)
            }
        }
        Command::Persist(key) => {
            if store.persist(key) {
                append_record(cmd, aof, metrics).await;
                Frame::Integer(1)
            } else {
                Frame::Integer(0)
            }
        }
        Command::Ttl(key) => match store.ttl(key) {
            Some(Ttl::Remaining(d)) => Frame::Integer(d.as_secs() as i64),
            Some(Ttl::Persistent) | None => Frame::Integer(-1),
        },
        Command::Expire { key, seconds } => {
            if store.set_expiry(key, Duration::from_secs(*seconds)) {
                Frame::Integer(1)
            } else {
                Frame::Integer(0)
            }
        }
        Command::Keys => {
            let keys = store.keys();
            Frame::Array(
                keys.into_iter()
                    .map(|k| Frame::Bulk(Bytes::from(k)))
                    .collect(),
            )
        }
        Command::Ping(msg) => match msg {
            Some(m) => Frame::Bulk(m.clone()),
            None => Frame::Simple("PONG".into()),
        },
        Command::Metrics => Frame::Bulk(Bytes::from(metrics.render())),
        Command::Unknown(_) => Frame::Error("ERR unknown command".into()),
    }
}

// Falha de log conta no sink de métricas e vai pro log do servidor; a
// resposta do cliente não muda e a mutação não é desfeita.
async fn append_record(cmd: &Command, aof: Option<&Arc<Aof>>, metrics: &Arc<dyn Metrics>) {
    let Some(aof) = aof else { return };
    match aof.append(cmd).await {
        Ok(()) => metrics.record_aof_write(),
        Err(e) => {
            metrics.record_aof_error();
            warn!("falha ao gravar {} no AOF: {e}", cmd.name());
        }
    }
}

fn error_reply(err: &CommandError) -> Frame {
    match err {
        CommandError::WrongArity(name) => {
            Frame::Error(format!("ERR wrong number of arguments for {name} command"))
        }
        CommandError::InvalidArgument(what) => Frame::Error(format!("ERR {what}")),
    }
}
