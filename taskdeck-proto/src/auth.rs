//! Account creation and sign-in bodies.

use serde::{Deserialize, Serialize};

use crate::error::{FieldError, InputError};

/// Body of `POST /users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateAccount {
    /// Chosen username.
    pub username: String,
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl CreateAccount {
    /// Checks that every field is filled in and the email looks like one.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] naming each invalid field.
    pub fn validate(&self) -> Result<(), InputError> {
        let mut fields = Vec::new();
        if self.username.trim().is_empty() {
            fields.push(FieldError::new("username", "Username is required"));
        }
        check_email(&self.email, &mut fields);
        check_password(&self.password, &mut fields);
        InputError::check(fields)
    }
}

/// Body of `POST /auth/sign-in`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignIn {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl SignIn {
    /// Checks that both fields are filled in.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] naming each invalid field.
    pub fn validate(&self) -> Result<(), InputError> {
        let mut fields = Vec::new();
        check_email(&self.email, &mut fields);
        check_password(&self.password, &mut fields);
        InputError::check(fields)
    }
}

/// Response of `POST /auth/sign-in`.
///
/// The token is optional here so that a 2xx without one can be reported
/// as its own failure instead of a decode error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SignInResponse {
    /// Bearer token for subsequent requests.
    #[serde(default, alias = "accessToken", alias = "access_token")]
    pub token: Option<String>,
}

fn check_email(email: &str, fields: &mut Vec<FieldError>) {
    let email = email.trim();
    if email.is_empty() {
        fields.push(FieldError::new("email", "Email is required"));
    } else if !email.contains('@') {
        fields.push(FieldError::new("email", "Invalid email address"));
    }
}

fn check_password(password: &str, fields: &mut Vec<FieldError>) {
    if password.is_empty() {
        fields.push(FieldError::new("password", "Password is required"));
    }
}
