use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::debug;

use brasadb_common::{Metrics, NoopMetrics};

use crate::clock::{Clock, SystemClock};
use crate::entry::Entry;

/// Estado de expiração de uma chave viva.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Sem expiração armada.
    Persistent,
    /// Tempo restante até o prazo.
    Remaining(Duration),
}

/// Estado compartilhado entre todas as conexões e o sweeper.
struct SharedState {
    data: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn Metrics>,
}

/// Handle para o banco in-memory.
///
/// Toda operação é atômica por chave; chaves expiradas são colhidas
/// preguiçosamente em qualquer acesso que as toque e em lote pelo sweeper.
#[derive(Clone)]
pub struct Store {
    shared: Arc<SharedState>,
}

impl Store {
    /// Store com relógio de produção e métricas nulas.
    pub fn new() -> Self {
        Self::with(Arc::new(SystemClock), Arc::new(NoopMetrics))
    }

    /// Store com relógio e sink de métricas injetados.
    pub fn with(clock: Arc<dyn Clock>, metrics: Arc<dyn Metrics>) -> Self {
        Store {
            shared: Arc::new(SharedState {
                data: DashMap::new(),
                clock,
                metrics,
            }),
        }
    }

    /// Insere somente se a chave está ausente. Entrada expirada ainda não
    /// colhida conta como ausente e é substituída no lugar.
    pub fn put(&self, key: String, value: Bytes) -> bool {
        let now = self.shared.clock.now();
        let size = (key.len() + value.len()) as i64;

        match self.shared.data.entry(key) {
            MapEntry::Occupied(mut occ) => {
                if !occ.get().is_expired(now) {
                    return false;
                }
                let old_len = occ.get().value.len() as i64;
                let new_len = value.len() as i64;
                occ.insert(Entry::new(value));
                self.shared.metrics.record_expired(1);
                self.shared.metrics.record_memory_delta(new_len - old_len);
                true
            }
            MapEntry::Vacant(vac) => {
                vac.insert(Entry::new(value));
                self.shared.metrics.record_memory_delta(size);
                true
            }
        }
    }

    /// Sobrescreve somente se a chave está viva; limpa qualquer expiração.
    /// Se a chave está presente mas expirada, colhe e reporta falha.
    pub fn replace(&self, key: &str, value: Bytes) -> bool {
        let now = self.shared.clock.now();
        match self.shared.data.get_mut(key) {
            None => false,
            Some(mut entry) => {
                if entry.is_expired(now) {
                    drop(entry);
                    self.reap(key);
                    return false;
                }
                let delta = value.len() as i64 - entry.value.len() as i64;
                entry.value = value;
                entry.expires_at = None;
                self.shared.metrics.record_memory_delta(delta);
                true
            }
        }
    }

    /// Remove se presente, expirada ou não.
    pub fn remove(&self, key: &str) -> bool {
        match self.shared.data.remove(key) {
            Some((k, entry)) => {
                self.shared
                    .metrics
                    .record_memory_delta(-((k.len() + entry.value.len()) as i64));
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = self.shared.clock.now();
        let entry = self.shared.data.get(key)?;
        if entry.is_expired(now) {
            drop(entry);
            self.reap(key);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Todas as chaves vivas; expiradas encontradas na varredura são colhidas.
    pub fn keys(&self) -> Vec<String> {
        let now = self.shared.clock.now();
        let mut live = Vec::new();
        let mut reaped = 0u64;
        let mut freed = 0i64;

        self.shared.data.retain(|key, entry| {
            if entry.is_expired(now) {
                reaped += 1;
                freed += (key.len() + entry.value.len()) as i64;
                false
            } else {
                live.push(key.clone());
                true
            }
        });

        if reaped > 0 {
            self.shared.metrics.record_expired(reaped);
            self.shared.metrics.record_memory_delta(-freed);
        }
        live
    }

    /// Arma expiração em `agora + ttl`. Falha se a chave está ausente
    /// (inclusive expirada ainda não colhida). Prazo além do que o relógio
    /// monotônico representa vira entrada sem expiração.
    pub fn set_expiry(&self, key: &str, ttl: Duration) -> bool {
        let now = self.shared.clock.now();
        match self.shared.data.get_mut(key) {
            None => false,
            Some(mut entry) => {
                if entry.is_expired(now) {
                    drop(entry);
                    self.reap(key);
                    return false;
                }
                entry.expires_at = now.checked_add(ttl);
                true
            }
        }
    }

    /// Estado de expiração: None se a chave está ausente.
    pub fn ttl(&self, key: &str) -> Option<Ttl> {
        let now = self.shared.clock.now();
        let entry = self.shared.data.get(key)?;
        match entry.expires_at {
            None => Some(Ttl::Persistent),
            Some(at) if at <= now => {
                drop(entry);
                self.reap(key);
                None
            }
            Some(at) => Some(Ttl::Remaining(at - now)),
        }
    }

    /// Limpa a expiração se a chave está viva.
    pub fn persist(&self, key: &str) -> bool {
        let now = self.shared.clock.now();
        match self.shared.data.get_mut(key) {
            None => false,
            Some(mut entry) => {
                if entry.is_expired(now) {
                    drop(entry);
                    self.reap(key);
                    return false;
                }
                entry.expires_at = None;
                true
            }
        }
    }

    /// Varredura única: remove toda entrada expirada. Retorna quantas saíram.
    pub fn sweep(&self) -> usize {
        let now = self.shared.clock.now();
        let mut removed = 0usize;
        let mut freed = 0i64;

        self.shared.data.retain(|key, entry| {
            if entry.is_expired(now) {
                removed += 1;
                freed += (key.len() + entry.value.len()) as i64;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.shared.metrics.record_expired(removed as u64);
            self.shared.metrics.record_memory_delta(-freed);
            debug!("sweep removeu {removed} chaves expiradas");
        }
        removed
    }

    /// Contagem física de entradas (pode incluir expiradas ainda não colhidas).
    pub fn len(&self) -> usize {
        self.shared.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.data.is_empty()
    }

    // Remove a chave se (ainda) estiver expirada. Chamadores soltam qualquer
    // guard sobre a chave antes de chamar, senão deadlock no shard.
    fn reap(&self, key: &str) {
        let now = self.shared.clock.now();
        if let Some((k, entry)) = self
            .shared
            .data
            .remove_if(key, |_, entry| entry.is_expired(now))
        {
            self.shared.metrics.record_expired(1);
            self.shared
                .metrics
                .record_memory_delta(-((k.len() + entry.value.len()) as i64));
            debug!("chave expirada removida: {k}");
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

/// Tarefa periódica de colheita: roda `sweep` a cada `every` até o sinal
/// de shutdown.
pub fn start_sweeper(
    store: Store,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    store.sweep();
                }
                _ = shutdown.recv() => {
                    debug!("sweeper encerrando");
                    return;
                }
            }
        }
    })
}
