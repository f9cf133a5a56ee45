//! CLI Error Types
//!
//! Every library error is raised into one of these kinds at the command
//! boundary, so the top frame always has a diagnostic code to print.

use derive_more::{Display, Error};
use opacify_cache::error::Error as CacheError;
use opacify_config::error::Error as ConfigError;
use opacify_engine::error::{Error as EngineError, ErrorKind as EngineErrorKind};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("cannot load configuration")]
    Config,
    #[display("cannot open resource cache")]
    Cache,
    #[display("{_0}")]
    Engine(#[error(not(source))] EngineErrorKind),
    /// `verify` found problems it reports rather than raises.
    #[display("manifest has {_0} problem(s)")]
    Unverified(#[error(not(source))] usize),
}

impl ErrorKind {
    /// Stable diagnostic code, printed next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config => "E_CONFIG",
            Self::Cache => "E_CACHE",
            Self::Engine(kind) => kind.code(),
            Self::Unverified(_) => "E_UNVERIFIED",
        }
    }

    #[track_caller]
    pub fn config(err: ConfigError) -> Error {
        err.raise(Self::Config)
    }

    #[track_caller]
    pub fn cache(err: CacheError) -> Error {
        err.raise(Self::Cache)
    }

    #[track_caller]
    pub fn engine(err: EngineError) -> Error {
        let kind = Self::Engine((*err).clone());
        err.raise(kind)
    }
}
