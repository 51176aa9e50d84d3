//! Logical subscribers and envelope fan-out.
//!
//! Each subscriber registers a callback and a filter under a caller-chosen
//! id. A dispatch pass delivers one envelope to every subscriber whose
//! filter matches:
//! - Filtering by channel type and by user id
//! - Failing or panicking callbacks are isolated from the rest
//! - Subscribers removed mid-pass never see the in-flight envelope
//!
//! # Example
//!
//! ```ignore
//! let registry = SubscriptionRegistry::new();
//!
//! registry.subscribe(
//!     "xp_header_1700000000000".into(),
//!     SubscriptionFilter::users(["u1"]).with_types([ChannelType::XpUpdate]),
//!     |envelope| println!("new xp: {:?}", envelope.data),
//! );
//! ```

mod registry;
mod types;

pub use registry::SubscriptionRegistry;
pub use types::{CallbackResult, DispatchOutcome, SubscriberId, SubscriptionFilter};
