pub mod notification;
pub mod qr_image;

pub use notification::{NotificationEventType, NotificationService};
pub use qr_image::render_qr_data_url;
