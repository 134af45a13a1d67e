use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::email::dispatcher::EmailJobData;

/// One entry of the template registry: fixed subject and sender, plus the
/// body renderer.
pub struct EmailTemplate {
    pub subject: &'static str,
    pub from: &'static str,
    pub render: fn(&EmailJobData) -> String,
}

const SUPPORT_SENDER: &str = "AbegHelp <support@abeghelp.me>";

fn greeting(data: &EmailJobData) -> &str {
    data.name.as_deref().unwrap_or("there")
}

fn render_welcome(data: &EmailJobData) -> String {
    format!(
        "<h1>Welcome to AbegHelp, {name}!</h1>\
         <p>Your account is ready. Complete your profile to start creating \
         and supporting campaigns.</p>",
        name = greeting(data)
    )
}

fn render_verify_email(data: &EmailJobData) -> String {
    let link = data.verification_link.as_deref().unwrap_or("#");
    format!(
        "<h1>Hi {name},</h1>\
         <p>Confirm your email address to keep your account secure.</p>\
         <p><a href=\"{link}\">Verify my email</a></p>",
        name = greeting(data)
    )
}

fn render_reset_password(data: &EmailJobData) -> String {
    let link = data.reset_link.as_deref().unwrap_or("#");
    let expiry = data.expires_in_minutes.unwrap_or(10);
    format!(
        "<h1>Hi {name},</h1>\
         <p>We received a request to reset your password. This link expires \
         in {expiry} minutes.</p>\
         <p><a href=\"{link}\">Reset my password</a></p>\
         <p>If you did not ask for this, you can ignore this email.</p>",
        name = greeting(data)
    )
}

fn render_reset_successful(data: &EmailJobData) -> String {
    format!(
        "<h1>Hi {name},</h1>\
         <p>Your password was changed. If this wasn't you, contact support \
         immediately.</p>",
        name = greeting(data)
    )
}

lazy_static! {
    static ref REGISTRY: HashMap<&'static str, EmailTemplate> = {
        let mut map = HashMap::new();
        map.insert(
            "welcomeEmail",
            EmailTemplate {
                subject: "Welcome to AbegHelp",
                from: SUPPORT_SENDER,
                render: render_welcome,
            },
        );
        map.insert(
            "verifyEmail",
            EmailTemplate {
                subject: "Verify your AbegHelp email",
                from: SUPPORT_SENDER,
                render: render_verify_email,
            },
        );
        map.insert(
            "resetPassword",
            EmailTemplate {
                subject: "Reset your AbegHelp password",
                from: SUPPORT_SENDER,
                render: render_reset_password,
            },
        );
        map.insert(
            "passwordResetSuccessful",
            EmailTemplate {
                subject: "Your AbegHelp password was reset",
                from: SUPPORT_SENDER,
                render: render_reset_successful,
            },
        );
        map
    };
}

/// Looks up a template by its job-type key. The set is closed at process
/// start; an absent key is the caller's error to surface.
pub fn lookup(kind: &str) -> Option<&'static EmailTemplate> {
    REGISTRY.get(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_contains_the_fixed_template_set() {
        for kind in [
            "welcomeEmail",
            "verifyEmail",
            "resetPassword",
            "passwordResetSuccessful",
        ] {
            let template = lookup(kind).expect("registered template");
            assert_eq!(template.from, SUPPORT_SENDER);
        }
        assert!(lookup("campaignUpdate").is_none());
    }

    #[test]
    fn welcome_template_uses_the_pinned_subject() {
        let template = lookup("welcomeEmail").expect("registered");
        assert_eq!(template.subject, "Welcome to AbegHelp");
    }

    #[test]
    fn reset_template_interpolates_link_and_expiry() {
        let template = lookup("resetPassword").expect("registered");
        let data = EmailJobData {
            to: "ada@example.com".into(),
            name: Some("Ada".into()),
            verification_link: None,
            reset_link: Some("https://abeghelp.me/reset?token=abc".into()),
            expires_in_minutes: Some(15),
        };
        let html = (template.render)(&data);
        assert!(html.contains("Hi Ada"));
        assert!(html.contains("https://abeghelp.me/reset?token=abc"));
        assert!(html.contains("15 minutes"));
    }
}
