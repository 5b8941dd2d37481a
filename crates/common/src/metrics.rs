/// Sink de métricas injetado no engine e no servidor.
///
/// Todos os métodos têm corpo padrão vazio: o core se comporta de forma
/// idêntica com o handle nulo, só deixa de contar.
pub trait Metrics: Send + Sync + 'static {
    /// Comando despachado com sucesso de parsing (rotulado pelo nome).
    fn record_command(&self, _name: &str) {}

    /// Variação de memória lógica em bytes (chave + valor); negativa em remoção.
    fn record_memory_delta(&self, _delta: i64) {}

    /// Conexão aceita.
    fn connection_opened(&self) {}

    /// Conexão encerrada (qualquer causa).
    fn connection_closed(&self) {}

    /// Registro anexado ao log de durabilidade.
    fn record_aof_write(&self) {}

    /// Falha de append no log de durabilidade.
    fn record_aof_error(&self) {}

    /// Chaves expiradas colhidas (lazy ou pelo sweeper).
    fn record_expired(&self, _count: u64) {}

    /// Exposição em texto (formato Prometheus); vazio no handle nulo.
    fn render(&self) -> String {
        String::new()
    }
}

/// Handle nulo: descarta tudo.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {}
