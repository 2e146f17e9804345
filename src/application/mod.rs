pub mod checkout_service;
pub mod dto;
pub mod session_service;

pub use checkout_service::{CheckoutService, CheckoutSettings};
pub use dto::*;
pub use session_service::PaymentSessionService;
