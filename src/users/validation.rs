use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationErrors;
use crate::users::repo_types::UserRecord;

pub const NAME_MAX: usize = 50;
pub const BIO_MAX: usize = 500;
pub const PASSWORD_MIN: usize = 6;

pub const BLANK: &str = "can't be blank";
pub const INVALID: &str = "is invalid";
pub const TAKEN: &str = "has already been taken";
pub const CONFIRMATION_MISMATCH: &str = "doesn't match Password";
pub const MUST_EXIST: &str = "must exist";

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"(?i)^[a-z0-9_+\-.]+@[a-z0-9\-.]+\.[a-z]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn too_long(max: usize) -> String {
    format!("is too long (maximum is {} characters)", max)
}

fn too_short(min: usize) -> String {
    format!("is too short (minimum is {} characters)", min)
}

/// Field rules that need no storage access. Email uniqueness is checked by
/// the save pipeline against the repository.
pub fn validate(user: &UserRecord) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    if user.name.trim().is_empty() {
        errors.add("name", BLANK);
    }
    if user.name.chars().count() > NAME_MAX {
        errors.add("name", too_long(NAME_MAX));
    }

    if user.email.trim().is_empty() {
        errors.add("email", BLANK);
    } else if !is_valid_email(&user.email) {
        errors.add("email", INVALID);
    }

    match &user.password {
        Some(password) => {
            if password.expose().chars().count() < PASSWORD_MIN {
                errors.add("password", too_short(PASSWORD_MIN));
            }
            match &user.password_confirmation {
                Some(confirmation) if !confirmation.is_blank() => {
                    if confirmation.expose() != password.expose() {
                        errors.add("password_confirmation", CONFIRMATION_MISMATCH);
                    }
                }
                _ => errors.add("password_confirmation", BLANK),
            }
        }
        None if user.password_digest.is_empty() => errors.add("password", BLANK),
        None => {}
    }

    if let Some(bio) = &user.bio {
        if bio.chars().count() > BIO_MAX {
            errors.add("bio", too_long(BIO_MAX));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Secret;
    use crate::users::repo_types::NewUser;

    fn valid_user() -> UserRecord {
        UserRecord::new(NewUser {
            name: "Example User".into(),
            email: "user@example.com".into(),
            password: Some(Secret::from("foobar")),
            password_confirmation: Some(Secret::from("foobar")),
            ..Default::default()
        })
    }

    #[test]
    fn valid_user_has_no_errors() {
        assert!(validate(&valid_user()).is_empty());
    }

    #[test]
    fn name_must_be_present() {
        let mut user = valid_user();
        user.name = " ".into();
        assert!(validate(&user).contains("name", BLANK));
    }

    #[test]
    fn name_is_limited_to_50_chars() {
        let mut user = valid_user();
        user.name = "a".repeat(50);
        assert!(validate(&user).is_empty());
        user.name = "a".repeat(51);
        assert!(validate(&user).contains("name", &too_long(50)));
    }

    #[test]
    fn email_must_be_present() {
        let mut user = valid_user();
        user.email = String::new();
        let errors = validate(&user);
        assert!(errors.contains("email", BLANK));
        assert!(!errors.contains("email", INVALID));
    }

    #[test]
    fn accepts_valid_email_formats() {
        for email in [
            "user@foo.COM",
            "A_US-ER@f.b.org",
            "frst.lst@foo.jp",
            "a+b@baz.cn",
        ] {
            assert!(is_valid_email(email), "{} should be valid", email);
        }
    }

    #[test]
    fn rejects_invalid_email_formats() {
        for email in [
            "user@foo,com",
            "user_at_foo.org",
            "example.user@foo.",
            "foo@bar_baz.com",
            "foo@bar+baz.com",
            "foo@bar.c0m",
            "user@example.com\n",
        ] {
            assert!(!is_valid_email(email), "{:?} should be invalid", email);
        }
    }

    #[test]
    fn password_minimum_length_is_six() {
        let mut user = valid_user();
        user.password = Some(Secret::from("ab123"));
        user.password_confirmation = Some(Secret::from("ab123"));
        assert!(validate(&user).contains("password", &too_short(6)));

        user.password = Some(Secret::from("abc123"));
        user.password_confirmation = Some(Secret::from("abc123"));
        assert!(validate(&user).get("password").is_empty());
    }

    #[test]
    fn new_user_requires_password() {
        let mut user = valid_user();
        user.password = None;
        user.password_confirmation = None;
        assert!(validate(&user).contains("password", BLANK));
    }

    #[test]
    fn stored_digest_allows_saving_without_password() {
        let mut user = valid_user();
        user.password = None;
        user.password_confirmation = None;
        user.password_digest = "$argon2id$existing".into();
        assert!(validate(&user).is_empty());
    }

    #[test]
    fn confirmation_must_be_present_and_match() {
        let mut user = valid_user();
        user.password_confirmation = None;
        assert!(validate(&user).contains("password_confirmation", BLANK));

        user.password_confirmation = Some(Secret::from(""));
        assert!(validate(&user).contains("password_confirmation", BLANK));

        user.password_confirmation = Some(Secret::from("mismatch"));
        assert!(validate(&user).contains("password_confirmation", CONFIRMATION_MISMATCH));
    }

    #[test]
    fn bio_is_limited_to_500_chars() {
        let mut user = valid_user();
        user.bio = Some("x".repeat(500));
        assert!(validate(&user).is_empty());
        user.bio = Some("x".repeat(501));
        assert!(validate(&user).contains("bio", &too_long(500)));
    }
}
