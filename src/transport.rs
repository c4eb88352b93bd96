//! The command-execution seam between the pub/sub core and the log service.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::types::Value;

/// Something that can execute one command against the log service and
/// return its reply.
///
/// [`Connection`](crate::connection::Connection) is the production
/// implementation. Group bootstrap, the consumption loop and publishing are
/// written against this trait only.
#[async_trait]
pub trait Transport: Send {
    /// Send `args` as a single command and wait for its reply.
    ///
    /// Server error replies are returned as [`Error::Server`](crate::Error::Server).
    async fn execute(&mut self, args: &[Bytes]) -> Result<Value>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for &mut T {
    async fn execute(&mut self, args: &[Bytes]) -> Result<Value> {
        (**self).execute(args).await
    }
}
