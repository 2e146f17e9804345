pub mod entities;
pub mod errors;
pub mod events;
pub mod value_objects;

pub use entities::{token_prefix, ConsumedToken, NewPaymentSession, PaymentSession, SESSION_TTL_HOURS};
pub use errors::{DomainError, DomainResult};
pub use events::*;
pub use value_objects::{
    EntityKind, EntityReference, FlowKind, HostedPage, LineItem, Money, PayerContact,
};
