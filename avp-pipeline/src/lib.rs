//! Media distribution core of the SFU recording node.
//!
//! ```text
//!                                                        +---> element
//!                                                        |
//! publisher --> ingest --> reconstructor --> dispatch ---+---> element
//!                                                        |
//!                                                        +---> element
//! ```
//!
//! Each element is fed through its own bounded queue and delivery task, so the
//! dispatch loop never waits on a slow consumer unless that queue is configured
//! to block.

pub mod config;
pub mod element;
pub mod error;
pub mod packet;
pub mod packet_log;
pub mod pipeline;
pub mod publisher;
pub mod queue;
pub mod reconstructor;
pub mod sample;

pub use config::Config;
pub use element::{Element, ElementInfo, ElementStats, registry::ElementRegistry};
pub use error::{Error, Result};
pub use packet::{Packet, PacketHeader};
pub use pipeline::Pipeline;
pub use publisher::Publisher;
pub use queue::{BoundedQueue, OverflowPolicy};
pub use reconstructor::Reconstructor;
pub use sample::{Sample, SampleKind};
