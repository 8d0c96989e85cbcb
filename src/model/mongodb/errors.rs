//! For some reason, the mongodb crate doesn't provide error code constants.
//! This module fills in the gaps.

use mongodb::error::{
    BulkWriteFailure, Error as DbError, ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR,
};

pub const DUPLICATE_KEY: i32 = 11000;

/// Return true if the given error is a duplicate key write error, whether from
/// a single insert or from any document of a bulk insert.
pub fn is_duplicate_key_error(err: &DbError) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => e.code == DUPLICATE_KEY,
        ErrorKind::BulkWrite(BulkWriteFailure {
            write_errors: Some(ref errors),
            ..
        }) => errors.iter().any(|e| e.code == DUPLICATE_KEY),
        _ => false,
    }
}

/// Return true if the server labelled the error as a transient transaction
/// error, meaning the whole transaction may be retried.
pub fn is_transient_transaction_error(err: &DbError) -> bool {
    err.contains_label(TRANSIENT_TRANSACTION_ERROR)
}
