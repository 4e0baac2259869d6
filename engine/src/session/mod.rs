//! Session protocol drivers

pub mod cli;
pub mod driver;
pub mod interactive;
pub mod structured;
pub mod transport;

pub use cli::{CliSession, CliSessionFactory, TelnetCliSessionFactory};
pub use driver::{SessionDriver, SessionRunner};
pub use transport::{Connector, TcpConnector, Transport};
