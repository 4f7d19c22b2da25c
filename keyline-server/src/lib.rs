/// Keyline network server
///
/// Brokers remote sessions onto shared embedded database handles. Each
/// connection gets one sequential session; databases are shared across
/// sessions through a refcounted registry.

pub mod registry;
pub mod server;
pub mod session;

pub use registry::Registry;
pub use server::Server;
pub use session::Session;
