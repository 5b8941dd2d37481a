use brasadb_common::CommandError;
use bytes::Bytes;

use crate::{Frame, Parse};

/// Teto do EXPIRE: o prazo em milissegundos precisa caber em i64.
const MAX_EXPIRE_SECONDS: i64 = i64::MAX / 1000;

/// Enum com todos os comandos suportados.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Insere chave nova; falha se a chave já existe viva.
    Set { key: String, value: Bytes },
    Get(String),
    Del(String),
    Persist(String),
    Ttl(String),
    /// Arma expiração relativa em segundos. Nunca vai para o log.
    Expire { key: String, seconds: u64 },
    Keys,
    Ping(Option<Bytes>),
    Metrics,
    Unknown(String),
}

impl Command {
    /// Faz o parse de um Frame em um Command.
    ///
    /// Aridade é exata por comando; erro de aridade ou de tipo de argumento
    /// não toca o store nem o log.
    pub fn from_frame(frame: Frame) -> Result<Command, CommandError> {
        let mut parse = Parse::new(frame).map_err(|_| invalid("invalid command"))?;
        if !parse.has_remaining() {
            return Err(invalid("empty command"));
        }
        let cmd_name = parse
            .next_string()
            .map_err(|_| invalid("invalid command"))?
            .to_uppercase();

        let cmd = match cmd_name.as_str() {
            "SET" => {
                if parse.remaining() != 2 {
                    return Err(CommandError::WrongArity("SET".into()));
                }
                let key = parse.next_string().map_err(|_| invalid("invalid key"))?;
                let value = parse.next_bytes().map_err(|_| invalid("invalid value"))?;
                Command::Set { key, value }
            }
            "GET" => {
                if parse.remaining() != 1 {
                    return Err(CommandError::WrongArity("GET".into()));
                }
                let key = parse.next_string().map_err(|_| invalid("invalid key"))?;
                Command::Get(key)
            }
            "DEL" => {
                if parse.remaining() != 1 {
                    return Err(CommandError::WrongArity("DEL".into()));
                }
                let key = parse.next_string().map_err(|_| invalid("invalid key"))?;
                Command::Del(key)
            }
            "PERSIST" => {
                if parse.remaining() != 1 {
                    return Err(CommandError::WrongArity("PERSIST".into()));
                }
                let key = parse.next_string().map_err(|_| invalid("invalid key"))?;
                Command::Persist(key)
            }
            "TTL" => {
                if parse.remaining() != 1 {
                    return Err(CommandError::WrongArity("TTL".into()));
                }
                let key = parse.next_string().map_err(|_| invalid("invalid key"))?;
                Command::Ttl(key)
            }
            "EXPIRE" => {
                if parse.remaining() != 2 {
                    return Err(CommandError::WrongArity("EXPIRE".into()));
                }
                let key = parse.next_string().map_err(|_| invalid("invalid key"))?;
                let seconds = parse
                    .next_int()
                    .map_err(|_| invalid("invalid expire time"))?;
                if seconds <= 0 || seconds > MAX_EXPIRE_SECONDS {
                    return Err(invalid("invalid expire time"));
                }
                Command::Expire {
                    key,
                    seconds: seconds as u64,
                }
            }
            "KEYS" => {
                if parse.remaining() != 0 {
                    return Err(CommandError::WrongArity("KEYS".into()));
                }
                Command::Keys
            }
            "PING" => {
                let msg = match parse.remaining() {
                    0 => None,
                    1 => Some(parse.next_bytes().map_err(|_| invalid("invalid value"))?),
                    _ => return Err(CommandError::WrongArity("PING".into())),
                };
                Command::Ping(msg)
            }
            "METRICS" => {
                if parse.remaining() != 0 {
                    return Err(CommandError::WrongArity("METRICS".into()));
                }
                Command::Metrics
            }
            _ => Command::Unknown(cmd_name),
        };

        Ok(cmd)
    }

    /// Encoda o comando como Frame para envio via RESP.
    ///
    /// Para SET/DEL/PERSIST este é também o formato de registro no log de
    /// durabilidade, byte a byte.
    pub fn to_frame(&self) -> Frame {
        match self {
            Command::Set { key, value } => Frame::Array(vec![
                Frame::bulk("SET"),
                Frame::bulk(key),
                Frame::Bulk(value.clone()),
            ]),
            Command::Get(key) => Frame::Array(vec![Frame::bulk("GET"), Frame::bulk(key)]),
            Command::Del(key) => Frame::Array(vec![Frame::bulk("DEL"), Frame::bulk(key)]),
            Command::Persist(key) => {
                Frame::Array(vec![Frame::bulk("PERSIST"), Frame::bulk(key)])
            }
            Command::Ttl(key) => Frame::Array(vec![Frame::bulk("TTL"), Frame::bulk(key)]),
            Command::Expire { key, seconds } => Frame::Array(vec![
                Frame::bulk("EXPIRE"),
                Frame::bulk(key),
                Frame::bulk(&seconds.to_string()),
            ]),
            Command::Keys => Frame::Array(vec![Frame::bulk("KEYS")]),
            Command::Ping(None) => Frame::Array(vec![Frame::bulk("PING")]),
            Command::Ping(Some(msg)) => {
                Frame::Array(vec![Frame::bulk("PING"), Frame::Bulk(msg.clone())])
            }
            Command::Metrics => Frame::Array(vec![Frame::bulk("METRICS")]),
            Command::Unknown(name) => Frame::Array(vec![Frame::bulk(name)]),
        }
    }

    /// Nome canônico do comando, para rótulo de métrica e log.
    pub fn name(&self) -> &str {
        match self {
            Command::Set { .. } => "SET",
            Command::Get(_) => "GET",
            Command::Del(_) => "DEL",
            Command::Persist(_) => "PERSIST",
            Command::Ttl(_) => "TTL",
            Command::Expire { .. } => "EXPIRE",
            Command::Keys => "KEYS",
            Command::Ping(_) => "PING",
            Command::Metrics => "METRICS",
            Command::Unknown(name) => name,
        }
    }
}

fn invalid(what: &str) -> CommandError {
    CommandError::InvalidArgument(what.into())
}
