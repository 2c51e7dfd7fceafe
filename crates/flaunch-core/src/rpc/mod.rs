//! Transport side of the bridge: the connection to the backend service.

mod channel;
mod endpoint;
pub mod mock;
pub mod proto;
pub mod registry;

pub use channel::{GrpcChannel, RpcChannel, TransportError, TransportEvent};
pub use endpoint::{CallPath, ServiceEndpoint};
