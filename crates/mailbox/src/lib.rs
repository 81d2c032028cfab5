//! Remote mailbox and calendar access.

pub mod auth;
pub mod calendar;
pub mod client;
pub mod mime;

pub use calendar::{CalendarClient, GoogleCalendarClient, RemoteEventInput};
pub use client::{GmailClient, MailboxClient};
