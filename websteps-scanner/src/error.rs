use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("Cannot parse {0:?} as an IP address")]
    AddressParse(String),

    #[error("Unknown network {0:?}")]
    UnknownNetwork(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
