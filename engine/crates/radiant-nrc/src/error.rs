use crate::integration::NrcState;
use crate::sdk::{NrcOp, NrcStatus};

#[derive(thiserror::Error, Debug)]
pub enum NrcError {
    #[error("native device is unavailable")]
    MissingNativeDevice,

    #[error("required device extension {0} is not supported")]
    MissingExtension(&'static str),

    #[error("NRC {op} failed: {status:?}")]
    Sdk { op: NrcOp, status: NrcStatus },

    #[error("NRC {op} called in state {state:?}")]
    InvalidState { op: NrcOp, state: NrcState },

    #[error("{what}: {message}")]
    Gfx { what: String, message: String },
}

impl NrcError {
    pub(crate) fn check(op: NrcOp, status: NrcStatus) -> Result<(), NrcError> {
        if status.is_ok() { Ok(()) } else { Err(NrcError::Sdk { op, status }) }
    }

    pub(crate) fn gfx(what: impl Into<String>, err: anyhow::Error) -> Self {
        Self::Gfx {
            what: what.into(),
            message: format!("{err:#}"),
        }
    }
}
