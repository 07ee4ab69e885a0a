//! Input rules shared by request DTOs and the identity service

use validator::ValidationError;

pub const MIN_PASSWORD_LEN: usize = 8;

fn rule(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// 3-50 characters of ASCII letters, digits and underscore.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len_ok = (3..=50).contains(&username.len());
    let chars_ok = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if len_ok && chars_ok {
        Ok(())
    } else {
        Err(rule(
            "username",
            "username must be 3-50 characters of letters, digits or underscore",
        ))
    }
}

/// At least 8 characters with an upper-case letter, a lower-case letter, a
/// digit and a printable special character.
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let mut upper = false;
    let mut lower = false;
    let mut digit = false;
    let mut special = false;
    for c in password.chars() {
        match c {
            'A'..='Z' => upper = true,
            'a'..='z' => lower = true,
            '0'..='9' => digit = true,
            '!'..='~' => special = true,
            _ => {}
        }
    }

    if password.chars().count() >= MIN_PASSWORD_LEN && upper && lower && digit && special {
        Ok(())
    } else {
        Err(rule(
            "password_strength",
            "password must be at least 8 characters with uppercase, lowercase, digit, and special character",
        ))
    }
}

/// Human-readable message of a validation error.
pub fn message_of(err: &ValidationError) -> String {
    err.message
        .as_ref()
        .map(|m| m.to_string())
        .unwrap_or_else(|| err.code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        assert!(validate_username("admin").is_ok());
        assert!(validate_username("ops_team_2").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("dash-name").is_err());
        assert!(validate_username(&"x".repeat(51)).is_err());
    }

    #[test]
    fn password_strength() {
        assert!(validate_password_strength("Str0ng!pass").is_ok());
        assert!(validate_password_strength("Sh0rt!").is_err());
        assert!(validate_password_strength("alllower1!").is_err());
        assert!(validate_password_strength("ALLUPPER1!").is_err());
        assert!(validate_password_strength("NoDigits!!").is_err());
        assert!(validate_password_strength("NoSpecial12").is_err());
    }

    #[test]
    fn message_falls_back_to_code() {
        let err = ValidationError::new("custom");
        assert_eq!(message_of(&err), "custom");
        let err = validate_username("a").unwrap_err();
        assert!(message_of(&err).starts_with("username must be"));
    }
}
