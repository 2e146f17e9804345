use chrono::{DateTime, Utc};

/// 时间来源，测试中可替换为手动时钟
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
