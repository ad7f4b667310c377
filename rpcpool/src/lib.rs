pub mod endpoint;
pub mod pool;
pub mod transport;

pub use endpoint::{Endpoint, EndpointConfig, DEFAULT_DAILY_LIMIT};
pub use pool::{Capacity, RpcPool};
pub use transport::{HttpTransport, RpcError, RpcTransport};
