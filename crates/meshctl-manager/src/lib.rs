pub mod aggregator;
pub mod connection;
pub mod correlator;
pub mod frontend;
pub mod http_api;
pub mod session_server;

pub use aggregator::Aggregator;
pub use connection::ConnectionManager;
pub use correlator::Correlator;
pub use frontend::FrontendApi;
pub use session_server::{
    SessionServer,
    SessionServerConfig,
};
