//! Message normalization: WCF relay events in, OneBot v11 message events
//! out.
//!
//! The engine dispatches on the inbound message kind, substitutes CQ-code
//! markup for mentions and attachments (downloading media through
//! [`onebridge_media::MediaCache`]), and maps string identities into the
//! integer id space the target protocol requires.

pub mod error;
pub mod event;
pub mod ident;
pub mod markup;
pub mod normalize;

pub use {
    error::{ConvertError, Result},
    event::{InboundEvent, MessageKind, OutboundEvent, Scope, SenderProfile},
    normalize::Normalizer,
};
