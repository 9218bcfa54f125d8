pub mod dispatch;
pub mod error;
pub mod inbound;
pub mod transport;

pub use dispatch::{ConsumerApi, DispatchError, ProviderApi};
pub use inbound::InboundRouter;
pub use transport::{CallbackResponse, CallbackTransport, HttpCallbackTransport, TransportError};
