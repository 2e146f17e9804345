pub mod app_config;
pub mod authorize_net_config;

pub use app_config::{AppConfig, Bitrix24Config, MailConfig};
pub use authorize_net_config::AuthorizeNetConfig;
