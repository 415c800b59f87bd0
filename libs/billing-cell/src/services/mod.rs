pub mod checkout;
pub mod invoice;
pub mod payment;
pub mod webhook;

pub use checkout::CheckoutClient;
pub use invoice::InvoiceService;
pub use payment::PaymentService;
