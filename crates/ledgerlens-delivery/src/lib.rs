//! # LedgerLens Delivery
//!
//! Hands rendered artifacts to their audience. Each delivery method is a
//! [`DeliveryChannel`]; the [`Dispatcher`] picks one by the schedule's
//! [`DeliveryMethod`](ledgerlens_core::DeliveryMethod).

pub mod channel;
pub mod dispatcher;
pub mod email;
pub mod slack;
pub mod webhook;

pub use channel::{DeliveryChannel, DeliveryPayload, human_size};
pub use dispatcher::Dispatcher;
pub use email::{EmailChannel, Mailer, SmtpMailer};
pub use slack::SlackChannel;
pub use webhook::WebhookChannel;
