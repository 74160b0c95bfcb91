//! Tool execution layer for the Skipper booking assistant.
//!
//! The model requests side effects by name; this crate declares those tools,
//! executes them, and owns the small pieces of state they need (calendar
//! access, the order counter and owner e-mail).

pub mod booking;
pub mod calendar;
pub mod declarations;
pub mod error;
pub mod executor;
pub mod mail;
pub mod orders;

pub use booking::{wa_me_link, BookingSettings, BookingTools};
pub use calendar::{Calendar, CalendarEvent, FreeSlot, InMemoryCalendar};
pub use declarations::{tool_declarations, ToolDeclaration};
pub use error::ToolError;
pub use executor::ToolExecutor;
pub use mail::{EmailConfig, Mailer, OrderNotice, SmtpMailer};
pub use orders::OrderCounter;
