pub mod client;
pub mod dispatcher;
pub mod templates;
pub mod worker;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("unknown email template: {0}")]
    UnknownTemplate(String),

    #[error("email provider error: {0}")]
    Provider(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub use client::{EmailClient, EmailMessage, ResendClient};
pub use dispatcher::{DispatchOutcome, EmailDispatcher, EmailJob, EmailJobData};
