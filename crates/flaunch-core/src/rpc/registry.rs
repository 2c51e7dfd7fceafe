//! Process-wide RPC channel
//!
//! The daemon holds one connection to one backend for its lifetime. It is
//! installed once at startup and torn down on exit; tests install a mock.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::RpcChannel;
use crate::{Error, Result};

static CHANNEL: RwLock<Option<Arc<dyn RpcChannel>>> = RwLock::new(None);

/// Install the process channel, returning the one it replaces
pub fn install(channel: Arc<dyn RpcChannel>) -> Option<Arc<dyn RpcChannel>> {
    let mut slot = CHANNEL.write().unwrap_or_else(PoisonError::into_inner);
    let previous = slot.replace(channel);
    debug!(replaced = previous.is_some(), "RPC channel installed");
    previous
}

/// The installed channel
pub fn current() -> Result<Arc<dyn RpcChannel>> {
    CHANNEL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or(Error::ChannelNotInstalled)
}

/// Remove the process channel. Streams already open keep their own handles.
pub fn teardown() -> Option<Arc<dyn RpcChannel>> {
    let previous = CHANNEL.write().unwrap_or_else(PoisonError::into_inner).take();
    if previous.is_some() {
        debug!("RPC channel torn down");
    }
    previous
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::mock::MockChannel;

    // Only test in the crate that touches the global slot
    #[test]
    fn test_install_current_teardown() {
        teardown();
        assert!(matches!(current(), Err(Error::ChannelNotInstalled)));

        let (mock, _calls) = MockChannel::new();
        assert!(install(Arc::new(mock)).is_none());
        assert!(current().is_ok());

        let (replacement, _calls) = MockChannel::new();
        assert!(install(Arc::new(replacement)).is_some());

        assert!(teardown().is_some());
        assert!(matches!(current(), Err(Error::ChannelNotInstalled)));
        assert!(teardown().is_none());
    }
}
