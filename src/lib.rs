pub mod config;
pub mod listener;
pub mod source;

pub use config::{Config, ConfigError};
pub use listener::{
    Axis, Button, ChannelReader, Listenable, Listener, ListenerError, ListenerManager,
    ManagerSettings, Snapshot,
};
pub use source::{InputSource, RawIndexTable};
