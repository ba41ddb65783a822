//! Synchronous Minecraft server status client.
//!
//! Two independent protocols are supported:
//!
//! - [Server List Ping](https://wiki.vg/Server_List_Ping) over TCP through
//!   [SlpClient], including the pre-1.7 legacy ping.
//! - The UT3/GameSpot [Query](https://wiki.vg/Query) protocol over UDP through
//!   [QueryClient].
//!
//! Every call is one blocking request/response exchange bounded by the
//! timeout in [SocketConf]. Nothing is retried or cached.

mod conf;
mod error;
mod query;
mod server;
mod share;
mod varint;

pub use conf::{Conf, SocketConf, DEFAULT_PORT, DEFAULT_TIMEOUT};
pub use error::{Result, StatErr};
pub use query::{QueryClient, ServerInfo};
pub use server::{PingResult, Player, Players, SlpClient, Version};
