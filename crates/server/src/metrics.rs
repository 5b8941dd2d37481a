use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::warn;

use brasadb_common::Metrics;

// Labels pré-instanciados para os contadores aparecerem zerados na
// exposição antes do primeiro uso.
const COMMAND_LABELS: &[&str] = &[
    "set", "get", "del", "persist", "ttl", "expire", "keys", "ping", "metrics",
];

/// Sink de métricas do servidor, com registry próprio e exposição no
/// formato de texto do Prometheus (servida pelo comando METRICS).
pub struct ServerMetrics {
    registry: Registry,
    commands: IntCounterVec,
    memory_bytes: IntGauge,
    connections_active: IntGauge,
    connections_total: IntCounter,
    aof_writes: IntCounter,
    aof_errors: IntCounter,
    expired_keys: IntCounter,
}

impl ServerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let commands = IntCounterVec::new(
            Opts::new(
                "brasadb_commands_total",
                "Total number of commands processed",
            ),
            &["command"],
        )?;
        for &name in COMMAND_LABELS {
            commands.with_label_values(&[name]);
        }
        registry.register(Box::new(commands.clone()))?;

        let memory_bytes = IntGauge::new("brasadb_memory_bytes", "Total memory used in bytes")?;
        registry.register(Box::new(memory_bytes.clone()))?;

        let connections_active = IntGauge::new(
            "brasadb_connections_active",
            "Current number of active connections",
        )?;
        registry.register(Box::new(connections_active.clone()))?;

        let connections_total = IntCounter::new(
            "brasadb_connections_total",
            "Total number of connections since server start",
        )?;
        registry.register(Box::new(connections_total.clone()))?;

        let aof_writes = IntCounter::new("brasadb_aof_writes_total", "Total number of AOF writes")?;
        registry.register(Box::new(aof_writes.clone()))?;

        let aof_errors = IntCounter::new("brasadb_aof_errors_total", "Total number of AOF errors")?;
        registry.register(Box::new(aof_errors.clone()))?;

        let expired_keys = IntCounter::new(
            "brasadb_expired_keys_total",
            "Total number of keys removed by expiry",
        )?;
        registry.register(Box::new(expired_keys.clone()))?;

        Ok(Self {
            registry,
            commands,
            memory_bytes,
            connections_active,
            connections_total,
            aof_writes,
            aof_errors,
            expired_keys,
        })
    }
}

impl Metrics for ServerMetrics {
    fn record_command(&self, name: &str) {
        self.commands
            .with_label_values(&[name.to_lowercase().as_str()])
            .inc();
    }

    fn record_memory_delta(&self, delta: i64) {
        self.memory_bytes.add(delta);
    }

    fn connection_opened(&self) {
        self.connections_total.inc();
        self.connections_active.inc();
    }

    fn connection_closed(&self) {
        self.connections_active.dec();
    }

    fn record_aof_write(&self) {
        self.aof_writes.inc();
    }

    fn record_aof_error(&self) {
        self.aof_errors.inc();
    }

    fn record_expired(&self, count: u64) {
        self.expired_keys.inc_by(count);
    }

    fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            warn!("falha ao encodar métricas: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
