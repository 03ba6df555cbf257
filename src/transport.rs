use async_trait::async_trait;
use std::sync::Arc;

use crate::cmd::Cmd;
use crate::frame::Frame;
use crate::Result;

/// A connected client able to run store commands.
///
/// Implementations must accept concurrent calls from many tasks, each call resolving with the
/// reply to its own command. Error replies from the store resolve as `Error::Server`, so `Ok`
/// always carries a data frame.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, cmd: Cmd) -> Result<Frame>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn call(&self, cmd: Cmd) -> Result<Frame> {
        (**self).call(cmd).await
    }
}
