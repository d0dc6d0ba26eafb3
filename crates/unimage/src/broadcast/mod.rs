//! Broadcasting of studio events (notices, progress snapshots, view changes)
//! to any front end that subscribes.

pub mod studio_events;

pub use studio_events::{NoticeLevel, StudioEvent, StudioEventBroadcaster};
