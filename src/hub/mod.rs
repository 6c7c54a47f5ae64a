//! Broadcast hub
//!
//! The hub routes messages from publishers to every connected subscriber.
//!
//! # Architecture
//!
//! ```text
//!   send() / try_send() / HubWriter
//!                │
//!                ▼
//!      inbound: mpsc::Sender<Message>   (bounded, send waits when full)
//!                │
//!                ▼
//!        ┌───────────────┐   retention: RetentionBuffer
//!        │  broadcaster  │──► (replayed to late joiners)
//!        │  (one task)   │
//!        └───────┬───────┘   keep-alive ticks ──► Message::ping()
//!                │ try_send (never waits)
//!     ┌──────────┼──────────┐
//!     ▼          ▼          ▼
//! [queue 1]  [queue 2]  [queue N]   full queue ⇒ subscriber evicted
//!     │          │          │
//!     ▼          ▼          ▼
//! SubscriberHandle::recv() ──► write + flush ──► transport
//! ```
//!
//! Frames are encoded once per message and shared between subscribers as
//! reference-counted `Bytes`.

pub mod config;
pub mod message;
pub mod retention;
pub mod stats;
pub mod store;
pub mod subscriber;
pub mod writer;

pub use config::HubConfig;
pub use message::Message;
pub use retention::RetentionBuffer;
pub use stats::HubStats;
pub use store::Hub;
pub use subscriber::SubscriberHandle;
pub use writer::HubWriter;
