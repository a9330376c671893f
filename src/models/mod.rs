pub mod logs;
pub mod sos_alert;
pub mod system_alert;
pub mod user;

pub use logs::{AnalysisLogEntry, NewAnalysisLog, NewNotificationLog, NotificationLogEntry};
pub use sos_alert::{AnalysisResult, AnalysisVerdict, GeoPoint, NewSosAlert, SosAlert};
pub use system_alert::{NewSystemAlert, Severity, SystemAlert};
pub use user::UserProfile;
