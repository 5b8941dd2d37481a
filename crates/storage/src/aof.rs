use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};
use tracing::{debug, info, warn};

use brasadb_common::ProtocolError;
use brasadb_protocol::{Command, Frame};

use crate::store::Store;

/// Política de fsync do log de durabilidade.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FsyncPolicy {
    /// Fsync após cada registro.
    #[default]
    Always,
    /// Fsync a cada segundo, via tarefa de fundo.
    EverySec,
    /// Sem fsync explícito (deixa pro OS).
    No,
}

/// Log append-only de mutações confirmadas.
///
/// Cada registro é um comando encodado em RESP; o arquivo é uma sequência
/// de frames sem delimitador extra. O append acontece no caminho do comando:
/// o cliente só recebe resposta depois do registro escrito.
pub struct Aof {
    file: Mutex<File>,
    policy: FsyncPolicy,
}

impl Aof {
    /// Abre (ou cria) o arquivo em modo append.
    pub async fn open(path: impl AsRef<Path>, policy: FsyncPolicy) -> std::io::Result<Aof> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .await?;
        info!("AOF aberto: {:?}", path.as_ref());
        Ok(Aof {
            file: Mutex::new(file),
            policy,
        })
    }

    /// Escreve um registro no log. Registros nunca se intercalam: o lock do
    /// arquivo cobre o write inteiro. Só SET, DEL e PERSIST são registros;
    /// qualquer outro comando é recusado sem tocar o arquivo.
    pub async fn append(&self, cmd: &Command) -> std::io::Result<()> {
        if !is_record(cmd) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("comando {} não é registro de log", cmd.name()),
            ));
        }

        let mut buf = BytesMut::new();
        cmd.to_frame().encode(&mut buf);

        let mut file = self.file.lock().await;
        file.write_all(&buf).await?;
        if self.policy == FsyncPolicy::Always {
            file.sync_data().await?;
        }
        Ok(())
    }

    /// Força fsync do que já foi escrito.
    pub async fn sync(&self) -> std::io::Result<()> {
        self.file.lock().await.sync_data().await
    }
}

// SET, DEL e PERSIST são os únicos comandos que viram registro.
fn is_record(cmd: &Command) -> bool {
    matches!(
        cmd,
        Command::Set { .. } | Command::Del(_) | Command::Persist(_)
    )
}

/// Tarefa de fsync periódico para a política EverySec.
pub fn start_flusher(aof: Arc<Aof>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = aof.sync().await {
                        warn!("fsync periódico do AOF falhou: {e}");
                    }
                }
                _ = shutdown.recv() => {
                    if let Err(e) = aof.sync().await {
                        warn!("fsync final do AOF falhou: {e}");
                    }
                    debug!("flusher do AOF encerrando");
                    return;
                }
            }
        }
    })
}

/// Lê o log e entrega cada registro ao callback correspondente, na ordem
/// do arquivo.
///
/// O replay para no primeiro registro inutilizável: cauda truncada (escrita
/// interrompida no meio), frame malformado ou comando que não é SET, DEL ou
/// PERSIST. O prefixo já aplicado é preservado e o retorno conta só ele.
pub async fn replay_aof<S, D, P>(
    path: &Path,
    mut on_set: S,
    mut on_del: D,
    mut on_persist: P,
) -> std::io::Result<usize>
where
    S: FnMut(String, Bytes),
    D: FnMut(&str),
    P: FnMut(&str),
{
    if !path.exists() {
        info!("arquivo AOF não encontrado, iniciando sem dados");
        return Ok(0);
    }

    let data = tokio::fs::read(path).await?;
    let mut cursor = Cursor::new(&data[..]);
    let mut count = 0;

    while (cursor.position() as usize) < data.len() {
        let record_start = cursor.position();
        match Frame::check(&mut cursor) {
            Ok(()) => {
                cursor.set_position(record_start);
                let frame = match Frame::parse(&mut cursor) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("AOF: registro corrompido, parando replay: {e}");
                        break;
                    }
                };
                match Command::from_frame(frame) {
                    Ok(Command::Set { key, value }) => {
                        on_set(key, value);
                        count += 1;
                    }
                    Ok(Command::Del(key)) => {
                        on_del(&key);
                        count += 1;
                    }
                    Ok(Command::Persist(key)) => {
                        on_persist(&key);
                        count += 1;
                    }
                    Ok(other) => {
                        warn!(
                            "AOF: registro {} não é de escrita, parando replay",
                            other.name()
                        );
                        break;
                    }
                    Err(e) => {
                        warn!("AOF: registro irreconhecível, parando replay: {e}");
                        break;
                    }
                }
            }
            Err(ProtocolError::Incomplete) => {
                warn!("AOF: cauda truncada no offset {record_start}, prefixo preservado");
                break;
            }
            Err(e) => {
                warn!("AOF: registro malformado, parando replay: {e}");
                break;
            }
        }
    }

    info!("AOF replay completo: {count} registros aplicados");
    Ok(count)
}

/// Replay direto num `Store` vazio: a fiação padrão de recuperação.
///
/// O último SET de uma chave vence. Como expiração nunca vai para o log, um
/// log legítimo pode ter dois SET da mesma chave sem DEL entre eles (a chave
/// expirou no intervalo); aplicar só inserções regrediria o valor.
pub async fn replay_into(path: &Path, store: &Store) -> std::io::Result<usize> {
    replay_aof(
        path,
        |key, value| {
            if !store.put(key.clone(), value.clone()) {
                store.replace(&key, value);
            }
        },
        |key| {
            store.remove(key);
        },
        |key| {
            store.persist(key);
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use brasadb_common::NoopMetrics;
    use tempfile::tempdir;

    #[tokio::test]
    async fn append_then_replay_rebuilds_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.aof");

        let aof = Aof::open(&path, FsyncPolicy::Always).await.unwrap();
        aof.append(&Command::Set {
            key: "a".into(),
            value: Bytes::from("1"),
        })
        .await
        .unwrap();
        aof.append(&Command::Del("a".into())).await.unwrap();
        aof.append(&Command::Set {
            key: "a".into(),
            value: Bytes::from("2"),
        })
        .await
        .unwrap();
        drop(aof);

        let store = Store::new();
        let count = replay_into(&path, &store).await.unwrap();

        assert_eq!(count, 3);
        assert_eq!(store.get("a"), Some(Bytes::from("2")));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn replay_applies_reset_after_expiry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reset.aof");

        // SET, expiração, SET de novo: o log termina com dois SET da mesma
        // chave e nenhum DEL, exatamente o que o servidor produz (expiração
        // não é logada). O replay precisa terminar no valor mais novo.
        let clock = Arc::new(ManualClock::new());
        let live = Store::with(clock.clone(), Arc::new(NoopMetrics));
        let aof = Aof::open(&path, FsyncPolicy::Always).await.unwrap();

        assert!(live.put("k".into(), Bytes::from("v1")));
        aof.append(&Command::Set {
            key: "k".into(),
            value: Bytes::from("v1"),
        })
        .await
        .unwrap();

        assert!(live.set_expiry("k", Duration::from_secs(1)));
        clock.advance(Duration::from_secs(2));

        assert!(live.put("k".into(), Bytes::from("v2")));
        aof.append(&Command::Set {
            key: "k".into(),
            value: Bytes::from("v2"),
        })
        .await
        .unwrap();
        drop(aof);

        let restored = Store::new();
        let count = replay_into(&path, &restored).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(restored.get("k"), Some(Bytes::from("v2")));
        assert_eq!(restored.len(), 1);
    }

    #[tokio::test]
    async fn append_rejects_non_record_commands() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("guard.aof");

        let aof = Aof::open(&path, FsyncPolicy::Always).await.unwrap();
        let err = aof
            .append(&Command::Expire {
                key: "k".into(),
                seconds: 5,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);

        let err = aof.append(&Command::Get("k".into())).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        drop(aof);

        let data = tokio::fs::read(&path).await.unwrap();
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn append_writes_exact_record_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bytes.aof");

        let aof = Aof::open(&path, FsyncPolicy::Always).await.unwrap();
        aof.append(&Command::Set {
            key: "chave".into(),
            value: Bytes::from("valor"),
        })
        .await
        .unwrap();
        aof.append(&Command::Persist("chave".into())).await.unwrap();
        drop(aof);

        let data = tokio::fs::read(&path).await.unwrap();
        let expected: &[u8] =
            b"*3\r\n$3\r\nSET\r\n$5\r\nchave\r\n$5\r\nvalor\r\n*2\r\n$7\r\nPERSIST\r\n$5\r\nchave\r\n";
        assert_eq!(&data[..], expected);
    }

    #[tokio::test]
    async fn replay_dispatches_per_record_kind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kinds.aof");

        let mut buf = BytesMut::new();
        Command::Set {
            key: "a".into(),
            value: Bytes::from("1"),
        }
        .to_frame()
        .encode(&mut buf);
        Command::Del("b".into()).to_frame().encode(&mut buf);
        Command::Persist("c".into()).to_frame().encode(&mut buf);
        tokio::fs::write(&path, &buf).await.unwrap();

        let mut sets = Vec::new();
        let mut dels = Vec::new();
        let mut persists = Vec::new();
        let count = replay_aof(
            &path,
            |k, v| sets.push((k, v)),
            |k| dels.push(k.to_string()),
            |k| persists.push(k.to_string()),
        )
        .await
        .unwrap();

        assert_eq!(count, 3);
        assert_eq!(sets, vec![("a".to_string(), Bytes::from("1"))]);
        assert_eq!(dels, vec!["b".to_string()]);
        assert_eq!(persists, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn replay_truncated_tail_keeps_prefix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trunc.aof");

        let mut buf = BytesMut::new();
        Command::Set {
            key: "k".into(),
            value: Bytes::from("v"),
        }
        .to_frame()
        .encode(&mut buf);
        buf.extend_from_slice(b"$5\r\nhel"); // registro cortado no meio
        tokio::fs::write(&path, &buf).await.unwrap();

        let mut sets = 0;
        let count = replay_aof(&path, |_k, _v| sets += 1, |_| {}, |_| {})
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(sets, 1);
    }

    #[tokio::test]
    async fn replay_stops_at_malformed_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lixo.aof");

        let mut buf = BytesMut::new();
        Command::Set {
            key: "antes".into(),
            value: Bytes::from("1"),
        }
        .to_frame()
        .encode(&mut buf);
        buf.extend_from_slice(b"?lixo\r\n");
        Command::Set {
            key: "depois".into(),
            value: Bytes::from("2"),
        }
        .to_frame()
        .encode(&mut buf);
        tokio::fs::write(&path, &buf).await.unwrap();

        let mut sets = Vec::new();
        let count = replay_aof(&path, |k, _v| sets.push(k), |_| {}, |_| {})
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(sets, vec!["antes".to_string()]);
    }

    #[tokio::test]
    async fn replay_stops_at_unrecognized_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("misto.aof");

        let mut buf = BytesMut::new();
        Command::Set {
            key: "antes".into(),
            value: Bytes::from("1"),
        }
        .to_frame()
        .encode(&mut buf);
        Command::Ping(None).to_frame().encode(&mut buf);
        Command::Set {
            key: "depois".into(),
            value: Bytes::from("2"),
        }
        .to_frame()
        .encode(&mut buf);
        tokio::fs::write(&path, &buf).await.unwrap();

        let mut sets = Vec::new();
        let count = replay_aof(&path, |k, _v| sets.push(k), |_| {}, |_| {})
            .await
            .unwrap();

        // para no primeiro registro que não é SET/DEL/PERSIST
        assert_eq!(count, 1);
        assert_eq!(sets, vec!["antes".to_string()]);
    }

    #[tokio::test]
    async fn replay_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nao_existe.aof");
        let count = replay_aof(&path, |_, _| {}, |_| {}, |_| {}).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn concurrent_appends_never_interleave() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("concorrente.aof");
        let aof = Arc::new(Aof::open(&path, FsyncPolicy::No).await.unwrap());

        let mut handles = Vec::new();
        for t in 0..8 {
            let aof = aof.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    let cmd = Command::Set {
                        key: format!("t{t}-k{i}"),
                        value: Bytes::from("valor"),
                    };
                    aof.append(&cmd).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let mut records = 0;
        let count = replay_aof(&path, |_, _| records += 1, |_| {}, |_| {})
            .await
            .unwrap();
        assert_eq!(count, 80);
        assert_eq!(records, 80);
    }
}
