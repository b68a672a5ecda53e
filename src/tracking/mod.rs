//! # Tracking Contracts
//!
//! Types exchanged with the external camera-tracking subsystem, the
//! [`TrackingSession`] and [`ArViewDelegate`] collaborator traits, and the
//! [`AnchorSynchronizer`] that mirrors live anchors as scene nodes.

pub mod anchor;
pub mod delegate;
pub mod frame;
pub mod session;
pub mod synchronizer;

pub use anchor::{Anchor, AnchorEvent, AnchorEventKind, AnchorId, AnchorKind};
pub use delegate::{ArViewDelegate, DefaultDelegate};
pub use frame::{ImagePlane, LimitedReason, TrackingCamera, TrackingFrame, TrackingState, VideoFrame};
pub use session::{HitResult, HitTestTypes, ScriptedSession, SessionEvent, TrackingSession};
pub use synchronizer::AnchorSynchronizer;
