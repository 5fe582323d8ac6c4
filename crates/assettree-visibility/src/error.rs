use assettree_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Request superseded by a newer one")]
    Superseded,
    #[error("Search matched more than {limit} targets")]
    SearchLimitExceeded { limit: usize },
    #[error("Malformed row: {0}")]
    MalformedRow(String),
}

pub type TreeResult<T> = Result<T, TreeError>;
