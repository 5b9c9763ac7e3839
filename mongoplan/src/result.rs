use crate::workflow::crush;
use mongoplan_datastructures::unique_linked_hash_map::DuplicateKeyError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("crush error: {0}")]
    Crush(#[from] crush::Error),
    #[error("duplicate field name: {0}")]
    DuplicateField(#[from] DuplicateKeyError),
}
