/// Erros de parsing do protocolo RESP.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame incompleto")]
    Incomplete,
    #[error("byte de tipo inválido: {0:#x}")]
    InvalidFrameType(u8),
    #[error("inteiro inválido: {0}")]
    InvalidInteger(String),
    #[error("comprimento de bulk inválido: {0}")]
    InvalidBulkLength(i64),
    #[error("frame excede tamanho máximo ({0} bytes)")]
    FrameTooLarge(usize),
    #[error("terminador CRLF ausente após payload")]
    MissingTerminator,
    #[error("encoding inválido: {0}")]
    InvalidEncoding(String),
}

impl ProtocolError {
    /// Incompleto pede mais bytes; todo o resto é frame malformado.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ProtocolError::Incomplete)
    }
}

/// Erros de conexão TCP.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("conexão resetada pelo peer")]
    ConnectionReset,
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocolo: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("servidor em shutdown")]
    Shutdown,
}

/// Erros de parsing/validação de comandos. Nome desconhecido não é erro de
/// parse: vira a variante Unknown do comando e responde no dispatch.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("número errado de argumentos para '{0}'")]
    WrongArity(String),
    #[error("argumento inválido: {0}")]
    InvalidArgument(String),
}

/// Erro top-level do BrasaDB.
#[derive(Debug, thiserror::Error)]
pub enum BrasaError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Result type alias.
pub type BrasaResult<T> = Result<T, BrasaError>;

// Conversão implícita de io::Error → BrasaError (via ConnectionError)
impl From<std::io::Error> for BrasaError {
    fn from(e: std::io::Error) -> Self {
        BrasaError::Connection(ConnectionError::Io(e))
    }
}
