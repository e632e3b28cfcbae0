mod endpoint;
mod transport;

pub use endpoint::Endpoint;
pub use transport::{OpenOptions, RtspTransport, TRANSPORT_OPTION};
