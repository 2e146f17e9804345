pub mod authorize_net_adapter;
pub mod bitrix24_crm_adapter;
pub mod http_mailer_adapter;
pub mod in_memory_session_store;
pub mod system_clock;

pub use authorize_net_adapter::AuthorizeNetAdapter;
pub use bitrix24_crm_adapter::Bitrix24CrmAdapter;
pub use http_mailer_adapter::{HttpMailerAdapter, LogOnlyMailer};
pub use in_memory_session_store::InMemorySessionStore;
pub use system_clock::SystemClock;
