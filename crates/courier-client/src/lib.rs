//! Courier client
//!
//! Polling transport for Courier. One [`Transport`] per signed-in user
//! keeps a long-poll loop running and exposes the outbound actions:
//!
//! ```no_run
//! use courier_client::{ChannelHandler, StaticIdentity, Transport, TransportConfig};
//! use std::sync::Arc;
//!
//! # async fn demo() -> courier_client::Result<()> {
//! let (handler, mut events) = ChannelHandler::new();
//! let config = TransportConfig::new("http://localhost:3001").with_session_token("t1");
//! let transport = Transport::http(
//!     config,
//!     Arc::new(StaticIdentity::signed_in("u1", "Alice")),
//!     Arc::new(handler),
//! )?;
//!
//! transport.connect();
//! transport.send_message("c1", "hello", None).await;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod dedupe;
pub mod echo;
pub mod error;
pub mod handler;
pub mod identity;
pub mod transport;

pub use api::{HttpApi, RealtimeApi};
pub use config::TransportConfig;
pub use error::{ClientError, Result};
pub use handler::{ChannelHandler, EventHandler, NoopHandler, TransportEvent};
pub use identity::{IdentityProvider, StaticIdentity};
pub use transport::{ConnectionState, Transport, CONNECTIVITY_ERROR};
