pub mod clock;
pub mod crm_port;
pub mod mailer_port;
pub mod payment_processor_port;
pub mod session_store_port;

pub use clock::Clock;
pub use crm_port::{CrmContact, CrmDeal, CrmPort};
pub use mailer_port::{EmailTemplate, MailerPort};
pub use payment_processor_port::{
    CardDetails, ChargeRequest, HostedPageRequest, HostedPageResult, PaymentProcessorPort,
    ProcessorOrder, TransactionStatus,
};
pub use session_store_port::SessionStorePort;
