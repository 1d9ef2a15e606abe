//! Sign-up and sign-in input checks, applied before any backend call.

use super::AuthError;
use crate::model::Role;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub email: String,
    pub password: SecretString,
    pub password_confirmation: Option<SecretString>,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct SignInRequest {
    pub email: String,
    pub password: SecretString,
}

/// Sign-up input after normalization.
#[derive(Debug, Clone)]
pub(crate) struct ValidSignUp {
    pub email: String,
    pub password: SecretString,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

fn required(value: &str, field: &str) -> Result<String, AuthError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AuthError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn checked_email(raw: &str) -> Result<String, AuthError> {
    let email = normalize_email(raw);
    if email.is_empty() {
        return Err(AuthError::validation("Email is required"));
    }
    if !valid_email(&email) {
        return Err(AuthError::validation("Please enter a valid email address"));
    }
    Ok(email)
}

fn checked_password(password: &SecretString) -> Result<(), AuthError> {
    if password.expose_secret().trim().is_empty() {
        return Err(AuthError::validation("Password is required"));
    }
    Ok(())
}

impl SignUpRequest {
    pub(crate) fn validate(&self) -> Result<ValidSignUp, AuthError> {
        let email = checked_email(&self.email)?;
        checked_password(&self.password)?;
        if let Some(confirmation) = &self.password_confirmation {
            if confirmation.expose_secret() != self.password.expose_secret() {
                return Err(AuthError::validation("Passwords do not match"));
            }
        }
        let first_name = required(&self.first_name, "First name")?;
        let last_name = required(&self.last_name, "Last name")?;
        if !matches!(self.role, Role::Parent | Role::Teacher) {
            return Err(AuthError::validation(format!(
                "Cannot sign up with role {}",
                self.role
            )));
        }

        Ok(ValidSignUp {
            email,
            password: self.password.clone(),
            first_name,
            last_name,
            role: self.role,
        })
    }
}

impl SignInRequest {
    pub(crate) fn validate(&self) -> Result<String, AuthError> {
        let email = checked_email(&self.email)?;
        checked_password(&self.password)?;
        Ok(email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SignUpRequest {
        SignUpRequest {
            email: "  Parent@Example.COM ".to_string(),
            password: SecretString::from("hunter22".to_string()),
            password_confirmation: Some(SecretString::from("hunter22".to_string())),
            first_name: " Pat ".to_string(),
            last_name: "Doe".to_string(),
            role: Role::Parent,
        }
    }

    #[test]
    fn valid_sign_up_is_normalized() -> Result<(), AuthError> {
        let valid = request().validate()?;
        assert_eq!(valid.email, "parent@example.com");
        assert_eq!(valid.first_name, "Pat");
        assert_eq!(valid.role, Role::Parent);
        Ok(())
    }

    #[test]
    fn email_format() {
        assert!(valid_email("a@b.co"));
        assert!(!valid_email("a@b"));
        assert!(!valid_email("a b@c.com"));
        assert!(!valid_email(""));

        let mut bad = request();
        bad.email = "not-an-email".to_string();
        assert_eq!(
            bad.validate().err(),
            Some(AuthError::validation("Please enter a valid email address"))
        );
    }

    #[test]
    fn blank_fields_are_rejected() {
        let mut blank_name = request();
        blank_name.last_name = "   ".to_string();
        assert_eq!(
            blank_name.validate().err(),
            Some(AuthError::validation("Last name is required"))
        );

        let mut blank_password = request();
        blank_password.password = SecretString::from(String::new());
        blank_password.password_confirmation = None;
        assert_eq!(
            blank_password.validate().err(),
            Some(AuthError::validation("Password is required"))
        );
    }

    #[test]
    fn confirmation_must_match_when_present() {
        let mut mismatch = request();
        mismatch.password_confirmation = Some(SecretString::from("other".to_string()));
        assert_eq!(
            mismatch.validate().err(),
            Some(AuthError::validation("Passwords do not match"))
        );

        let mut absent = request();
        absent.password_confirmation = None;
        assert!(absent.validate().is_ok());
    }

    #[test]
    fn only_parent_and_teacher_can_sign_up() {
        for (role, ok) in [
            (Role::Parent, true),
            (Role::Teacher, true),
            (Role::Student, false),
            (Role::Admin, false),
        ] {
            let mut req = request();
            req.role = role;
            assert_eq!(req.validate().is_ok(), ok, "{role}");
        }
    }

    #[test]
    fn sign_in_normalizes_email() -> Result<(), AuthError> {
        let req = SignInRequest {
            email: " A@X.com".to_string(),
            password: SecretString::from("pw".to_string()),
        };
        assert_eq!(req.validate()?, "a@x.com");
        Ok(())
    }
}
