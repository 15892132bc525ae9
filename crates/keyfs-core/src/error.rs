use thiserror::Error;

pub type KeyfsResult<T> = Result<T, KeyfsError>;

#[derive(Debug, Error)]
pub enum KeyfsError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("unknown algorithm: {0}")]
    InvalidAlgorithm(String),

    #[error("invalid key chain: {0}")]
    InvalidChain(String),

    #[error("key chain is already set: {0} -> {1}")]
    ChainAlreadySet(String, String),

    #[error("corrupt chain entry: {0}")]
    CorruptEntry(String),

    #[error("corrupt key chain: {0}")]
    CorruptChain(String),

    #[error("not a keyfs filesystem: {0}")]
    WrongType(String),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
