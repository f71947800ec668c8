mod callback_log;
mod refund;
mod status_inquiry;
mod transaction;

pub use callback_log::CallbackLog;
pub use refund::RefundRecord;
pub use status_inquiry::StatusInquiryRecord;
pub use transaction::{Subject, Transaction};
