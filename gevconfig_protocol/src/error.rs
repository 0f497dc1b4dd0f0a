use crate::status::describe_status;
use thiserror::Error;

/// Error types.
#[derive(Debug, Error)]
pub enum Error {
    #[cfg(test)]
    #[error(transparent)]
    FromHexError(#[from] hex::FromHexError),

    #[error("invalid length")]
    InvalidLength,

    #[error("data parse error: {0}")]
    BinRwError(#[from] binrw::Error),

    #[error("device reported {}", describe_status(*.0))]
    DeviceStatus(u16),
}
