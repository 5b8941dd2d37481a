use bytes::Bytes;
use tokio::time::Instant;

/// Entrada no store: valor + expiração opcional.
///
/// Uma entrada com `expires_at <= agora` é logicamente ausente mesmo que
/// ainda esteja fisicamente no mapa (janela de expiração preguiçosa).
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Bytes,
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Entrada nova, sem expiração.
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|t| t <= now).unwrap_or(false)
    }
}
