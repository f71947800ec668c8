pub mod locks;
pub mod payment;
pub mod registration;

pub use payment::PaymentService;
