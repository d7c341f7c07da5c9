//! Outbound notification delivery.
//!
//! The workflow engine only appends to the outbox; this crate owns the
//! other half of that contract:
//! - **Senders** (`email`) - the mail-relay seam plus an in-memory fake
//! - **Rendering** (`render`) - tera HTML bodies from outbox fields
//! - **Dispatch** (`dispatcher`) - drains pending events with bounded
//!   retry; a delivery failure is retried or parked, never propagated
//!   back to the transition that caused it

pub mod dispatcher;
pub mod email;
pub mod render;

pub use dispatcher::{DispatchReport, OutboxDispatcher};
pub use email::{EmailMessage, EmailSender, HttpApiSender, InMemoryEmailSender, SendError};
pub use render::render_html;
