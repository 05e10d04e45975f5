use thiserror::Error;

use crate::upstream::UpstreamError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}
