pub mod address;
pub mod booking;
pub mod contacts;
pub mod notification;
pub mod query;
pub mod reminder;
pub mod status;
pub mod validation;

pub use booking::AppointmentBookingService;
pub use contacts::ContactService;
pub use notification::NotificationService;
pub use query::AppointmentQueryService;
pub use reminder::{run_reminder_loop, ReminderService};
pub use status::AppointmentStatusService;
