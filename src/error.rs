use thiserror::Error;

use crate::resolute::SUSPENDED;

#[derive(Debug, Error)]
pub(crate) enum MreadError {
    #[error("Error: IO Error {0} for file {1:?}")] IoError(std::io::Error, Option<String>),
    #[error("Error: {0}")] StatusError(reqwest::StatusCode),
    #[error("Error: {0}")] NetworkError(#[from] reqwest::Error),
    #[error("Error: DatabaseError {0}")] DatabaseError(#[from] rusqlite::Error),
    #[error("Error: either corrupt json value or not found item; {0}")] JsonError(String),
    #[error("Error: ConversionError {0}")] ConversionError(String),
    #[error("Error: NotFoundError {0}")] NotFoundError(String),
}

pub(crate) fn handle_error(err: &MreadError, from: String) {
    match err {
        MreadError::IoError(err, name) => {
            match name {
                Some(name) => eprintln!("Error: IO Error {} in file {} ({})", err, name, from),
                None => eprintln!("Error: IO Error {} ({})", err, from),
            }
        }
        MreadError::StatusError(err) => eprintln!("Error: Network Error {} ({})", err, from),
        MreadError::NetworkError(err) => eprintln!("Error: Network Error {} ({})", err, from),
        MreadError::DatabaseError(err) => eprintln!("Error: Database Error {} ({})", err, from),
        MreadError::JsonError(err) => eprintln!("Error: Json Error {} ({})", err, from),
        MreadError::ConversionError(err) =>
            eprintln!("Error: ConversionError {} ({})", err, from),
        MreadError::NotFoundError(err) => eprintln!("Error: NotFoundError {} ({})", err, from),
    }
}

/// Records a non-fatal error so it can be shown once at shutdown.
pub(crate) fn suspend_error(err: MreadError, from: &str) {
    tracing::warn!("suspended error from {}: {}", from, err);
    SUSPENDED.lock().push(err);
}

pub(crate) fn handle_suspended() {
    let suspended = SUSPENDED.lock();
    if !suspended.is_empty() {
        println!("Suspended errors:");
        for i in suspended.iter() {
            handle_error(i, String::from("suspended"));
        }
    }
}
