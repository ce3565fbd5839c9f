use thiserror::Error;

use crate::codec::CodecError;
use crate::domain::TransitionError;
use crate::params::ParamsError;
use crate::plugins::PluginError;
use crate::ports::StoreError;

/// Any failure of this crate.
#[derive(Debug, Error)]
pub enum BuildrecError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Params(#[from] ParamsError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

pub type Result<T, E = BuildrecError> = std::result::Result<T, E>;
