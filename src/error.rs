use crate::resp::RespValue;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("ERR {0}")]
    Generic(String),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArgCount(String),

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR value is not a valid float")]
    NotFloat,

    #[error("ERR hash value is not an integer")]
    HashValueNotInteger,

    #[error("ERR hash value is not a float")]
    HashValueNotFloat,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("ERR syntax error")]
    SyntaxError,

    #[error("ERR unknown command '{0}', with args beginning with: {1}")]
    UnknownCommand(String, String),

    /// Raised while building a registry, never at dispatch time.
    #[error("ERR command '{0}' registered twice")]
    DuplicateCommand(String),

    #[error("MISCONF Errors writing to the append only file, write commands are disabled")]
    WritesRefused,

    #[error("ERR failed to persist committed write: {0}")]
    Durability(std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn to_resp_error(&self) -> RespValue {
        RespValue::error(self.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
