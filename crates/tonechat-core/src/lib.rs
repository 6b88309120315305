pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::ToneChatConfig;
pub use error::{Result, ToneChatError};
pub use events::ChatEvent;
pub use types::*;
