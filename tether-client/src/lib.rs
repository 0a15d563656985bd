//! Resilient API client for Tether
//!
//! [`ResilientClient`] wraps every API operation with per-tier retries,
//! per-category circuit breakers, credential refresh and an offline queue that
//! replays deferred calls when connectivity returns.
//!
//! ```no_run
//! # async fn demo() -> Result<(), tether_client::ClientError> {
//! use std::sync::Arc;
//! use tether_client::{CallOutcome, ResilientClient, StaticCredentials};
//!
//! let client = ResilientClient::builder(tether_config::TetherConfig::default())
//!     .credentials(Arc::new(StaticCredentials::new("token")))
//!     .build()?;
//! let _probe = client.start_background();
//!
//! match client.workflows().get::<serde_json::Value>("42").await? {
//!     CallOutcome::Completed(workflow) => println!("{workflow}"),
//!     CallOutcome::Queued(receipt) => println!("queued as {}", receipt.queue_id),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod credential;
pub mod diagnostics;
pub mod error;
pub mod operations;
pub mod probe;
pub mod request;

pub use client::{ResilientClient, ResilientClientBuilder, REQUEST_ID_HEADER};
pub use credential::{CredentialError, CredentialProvider, StaticCredentials};
pub use diagnostics::ClientStatus;
pub use error::{ClientError, ClientResult};
pub use operations::{Notifications, Queries, System, Workflows};
pub use probe::HealthProbe;
pub use request::{ApiRequest, CallOutcome, QueuedReceipt};
