/// Field rules for account input
///
/// Custom checks plugged into the `validator` derives on the request types,
/// plus conversion of their failures into a single BAD_INPUT message.
use crate::error::AuthError;
use validator::{ValidationError, ValidationErrors};

const PASSWORD_SPECIALS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";
const RESERVED_WORDS: [&str; 2] = ["admin", "superadmin"];

fn rule(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// At least one capital letter, one digit and one special character
pub fn password_strength(password: &str) -> Result<(), ValidationError> {
    let upper = password.chars().any(|c| c.is_ascii_uppercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    let special = password.chars().any(|c| PASSWORD_SPECIALS.contains(c));

    if upper && digit && special {
        Ok(())
    } else {
        Err(rule(
            "password_strength",
            "Password must contain at least one capital letter, one number, and one special character",
        ))
    }
}

pub fn letters_and_spaces(name: &str) -> Result<(), ValidationError> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphabetic() || c == ' ') {
        Ok(())
    } else {
        Err(rule("letters_and_spaces", "Name can only contain letters and spaces"))
    }
}

pub fn alphanumeric(username: &str) -> Result<(), ValidationError> {
    if !username.is_empty() && username.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(rule(
            "alphanumeric",
            "Username can only contain letters and numbers (no spaces)",
        ))
    }
}

pub fn six_digit_code(code: &str) -> Result<(), ValidationError> {
    if code.len() == 6 && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(rule("six_digit_code", "Verification code must be 6 digits"))
    }
}

/// Reserved word contained in a name or username, case-insensitive
pub fn reserved_word(value: &str) -> Option<&'static str> {
    let lowered = value.to_lowercase();
    RESERVED_WORDS.iter().copied().find(|w| lowered.contains(w))
}

/// Flatten derive failures into one client-facing message
pub fn into_bad_input(errors: ValidationErrors) -> AuthError {
    let field_errors = errors.field_errors();
    let mut fields: Vec<_> = field_errors.keys().collect();
    fields.sort();

    let messages: Vec<String> = fields
        .into_iter()
        .filter_map(|field| field_errors.get(field))
        .flat_map(|errs| errs.iter())
        .map(|e| {
            e.message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("Invalid value ({})", e.code))
        })
        .collect();

    if messages.is_empty() {
        AuthError::BadInput("Invalid input".to_string())
    } else {
        AuthError::BadInput(messages.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::SignUpRequest;
    use validator::Validate;

    #[test]
    fn test_password_strength() {
        assert!(password_strength("Abcd123!").is_ok());
        assert!(password_strength("abcd123!").is_err());
        assert!(password_strength("Abcdefg!").is_err());
        assert!(password_strength("Abcd1234").is_err());
    }

    #[test]
    fn test_name_and_username_rules() {
        assert!(letters_and_spaces("Ann Lee").is_ok());
        assert!(letters_and_spaces("Ann-Lee").is_err());
        assert!(alphanumeric("ann1").is_ok());
        assert!(alphanumeric("ann 1").is_err());
        assert!(six_digit_code("123456").is_ok());
        assert!(six_digit_code("12345a").is_err());
        assert!(six_digit_code("1234567").is_err());
    }

    #[test]
    fn test_reserved_words() {
        assert_eq!(reserved_word("SiteAdmin"), Some("admin"));
        assert_eq!(reserved_word("ann"), None);
    }

    #[test]
    fn test_signup_errors_flatten() {
        let request = SignUpRequest {
            email: "not-an-email".into(),
            password: "Abcd123!".into(),
            name: "Ann".into(),
            username: "ann1".into(),
            avatar: None,
        };
        let err = into_bad_input(request.validate().unwrap_err());
        match err {
            AuthError::BadInput(msg) => assert_eq!(msg, "Please enter a valid email address"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
