//! monq - columnar query engine over a monitoring daemon's live state
//!
//! # Architecture
//!
//! - **World**: read-side view of the daemon's object graph ([`DaemonView`])
//! - **Tables**: virtual columnar tables (hosts, services, groups, log, ...)
//! - **Filters**: AND/OR trees of typed predicates with scan push-down
//! - **Query**: line-oriented protocol, stats grouping, wait conditions
//! - **Engine**: table registry and per-connection request loop
//!
//! # Usage example
//!
//! ```no_run
//! use std::sync::Arc;
//! use monq::{Engine, EngineConfig, StaticWorld};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let world = StaticWorld::from_json_file("./world.json")?;
//! let engine = Engine::new(Arc::new(world), EngineConfig::default());
//!
//! // One call per accepted connection, from any worker thread.
//! let stream = std::os::unix::net::UnixStream::connect("/tmp/monq.sock")?;
//! engine.serve_connection(std::io::BufReader::new(stream.try_clone()?), stream)?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod column;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod query;
pub mod render;
pub mod stats;
pub mod table;
pub mod triggers;
pub mod world;

pub use buffer::{InputBuffer, OutputBuffer, ResponseCode};
pub use config::{AuthorizationKind, EngineConfig};
pub use engine::{Counters, Engine};
pub use error::{EngineError, Result};
pub use triggers::{Trigger, Triggers};
pub use world::{DaemonView, StaticWorld};
