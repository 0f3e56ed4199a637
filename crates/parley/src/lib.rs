//! # Parley
//!
//! A chat server speaking a compact length-prefixed binary protocol.
//!
//! Users create accounts, log in, and exchange messages. A message to an
//! online user is pushed to their connection immediately; a message to
//! an offline user waits in their queue until they read it. Every pair
//! of users shares one conversation history.
//!
//! The crates, leaf to root:
//!
//! ```text
//! parley-transport  TCP listener, connection halves
//! parley-protocol   frames, field codec, typed requests
//! parley-directory  accounts, sessions, conversations, delivery routing
//! parley            session handler, server, client (this crate)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parley::prelude::*;
//!
//! # async fn run() -> Result<(), ParleyError> {
//! let server = ParleyServer::builder()
//!     .bind("127.0.0.1:56789")
//!     .build()
//!     .await?;
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await
//! # }
//! ```

mod client;
mod config;
mod error;
mod handler;
mod server;
pub mod status;

pub use client::{ParleyClient, READ_ACK_TOKEN, ReadBatch, Reply};
pub use config::{
    BIND_ENV, CONFIG_PATH_ENV, ConfigError, DEFAULT_BIND_ADDR, ServerConfig,
};
pub use error::ParleyError;
pub use server::{ParleyServer, ParleyServerBuilder};

/// Everything needed to run a server or talk to one.
pub mod prelude {
    pub use crate::{
        ParleyClient, ParleyError, ParleyServer, ParleyServerBuilder, ReadBatch,
        Reply, ServerConfig,
    };
    pub use parley_directory::{Directory, DirectoryError};
    pub use parley_protocol::{ChatMessage, Command, ProtocolError, Request};
}
