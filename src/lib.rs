pub mod cmd;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod increment;
pub mod keys;
pub mod memory;
mod reply;
pub mod store;
pub mod transport;

pub use cmd::{Cmd, CommandName, ToArg};
pub use config::Config;
pub use connection::Connection;
pub use error::Error;
pub use increment::Increment;
pub use memory::MemoryTransport;
pub use store::KeyValueStore;
pub use transport::Transport;

pub type Result<T> = std::result::Result<T, Error>;
