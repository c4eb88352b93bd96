//! Command builders for the log service.
//!
//! Builders follow the pattern of accumulating options and executing via
//! `.execute().await`; single-shot commands are plain async functions.

pub mod streams;

use bytes::Bytes;

use crate::error::Result;
use crate::transport::Transport;
use crate::types::{ToArg, Value};

/// Helper to execute an assembled argument vector.
pub(crate) async fn exec<T: Transport + ?Sized>(conn: &mut T, args: Vec<Bytes>) -> Result<Value> {
    conn.execute(&args).await
}

/// Helper to create a Bytes arg from anything that implements ToArg.
#[inline]
pub(crate) fn arg<T: ToArg>(val: T) -> Bytes {
    val.to_arg()
}
