//! Forms posted to the signup, login and password pages.

use serde::{Deserialize, Serialize};

use crate::config::PasswordConfig;
use crate::forms::validator::{EMAIL_RX, equal, matches, max_chars, min_chars, not_blank};
use crate::forms::{Validated, Validator};

pub const BLANK: &str = "This field cannot be blank";
pub const INVALID_EMAIL: &str = "This field must be a valid email address";
pub const DUPLICATE_EMAIL: &str = "Email address is already in use";
pub const INVALID_CREDENTIALS: &str = "Email or password is incorrect";
pub const PASSWORD_MISMATCH: &str = "New password and confirm password do not match";
pub const WRONG_CURRENT_PASSWORD: &str = "Current password is incorrect";

pub fn too_short(n: usize) -> String {
    format!("This field must be at least {n} characters long")
}

pub fn too_long(n: usize) -> String {
    format!("This field cannot be more than {n} characters long")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSignupForm {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl Validated for UserSignupForm {
    fn validator(&self) -> &Validator {
        &self.validator
    }

    fn validator_mut(&mut self) -> &mut Validator {
        &mut self.validator
    }
}

impl UserSignupForm {
    pub fn validate(&mut self, rules: &PasswordConfig) {
        self.check_field(not_blank(&self.name), "name", BLANK);
        self.check_field(max_chars(&self.name, 255), "name", too_long(255));
        self.check_field(not_blank(&self.email), "email", BLANK);
        self.check_field(matches(&self.email, &EMAIL_RX), "email", INVALID_EMAIL);
        self.check_field(not_blank(&self.password), "password", BLANK);
        self.check_field(min_chars(&self.password, rules.min_length), "password", too_short(rules.min_length));
        self.check_field(max_chars(&self.password, rules.max_length), "password", too_long(rules.max_length));
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserLoginForm {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl Validated for UserLoginForm {
    fn validator(&self) -> &Validator {
        &self.validator
    }

    fn validator_mut(&mut self) -> &mut Validator {
        &mut self.validator
    }
}

impl UserLoginForm {
    pub fn validate(&mut self) {
        self.check_field(not_blank(&self.email), "email", BLANK);
        self.check_field(matches(&self.email, &EMAIL_RX), "email", INVALID_EMAIL);
        self.check_field(not_blank(&self.password), "password", BLANK);
    }
}

/// None of the fields are ever rendered back; only the errors are.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountPasswordUpdateForm {
    #[serde(skip_serializing)]
    pub current_password: String,
    #[serde(skip_serializing)]
    pub new_password: String,
    #[serde(skip_serializing)]
    pub confirm_password: String,
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl Validated for AccountPasswordUpdateForm {
    fn validator(&self) -> &Validator {
        &self.validator
    }

    fn validator_mut(&mut self) -> &mut Validator {
        &mut self.validator
    }
}

impl AccountPasswordUpdateForm {
    pub fn validate(&mut self, rules: &PasswordConfig) {
        self.check_field(not_blank(&self.current_password), "currentPassword", BLANK);
        self.check_field(not_blank(&self.new_password), "newPassword", BLANK);
        self.check_field(not_blank(&self.confirm_password), "confirmPassword", BLANK);
        self.check_field(
            min_chars(&self.new_password, rules.min_length),
            "newPassword",
            too_short(rules.min_length),
        );
        self.check_field(
            max_chars(&self.new_password, rules.max_length),
            "newPassword",
            too_long(rules.max_length),
        );
        self.check_field(
            equal(self.confirm_password.as_str(), self.new_password.as_str()),
            "confirmPassword",
            PASSWORD_MISMATCH,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(name: &str, email: &str, password: &str) -> UserSignupForm {
        UserSignupForm {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn valid_signup_has_no_errors() {
        let mut form = signup("Bob", "bob@example.com", "validPa$$word");
        form.validate(&PasswordConfig::default());
        assert!(form.valid());
    }

    #[test]
    fn signup_errors_attach_to_fields() {
        let mut form = signup("", "not-an-email", "short");
        form.validate(&PasswordConfig::default());

        let errors = &form.validator.field_errors;
        assert_eq!(errors["name"], vec![BLANK.to_string()]);
        assert_eq!(errors["email"], vec![INVALID_EMAIL.to_string()]);
        assert_eq!(errors["password"], vec![too_short(8)]);
        assert!(form.validator.non_field_errors.is_empty());
    }

    #[test]
    fn password_never_serialized() {
        let form = signup("Bob", "bob@example.com", "validPa$$word");
        let value = serde_json::to_value(&form).unwrap();
        assert_eq!(value["email"], "bob@example.com");
        assert!(value.get("password").is_none());
        assert!(value.get("validator").is_some());
    }

    #[test]
    fn login_requires_both_fields() {
        let mut form = UserLoginForm::default();
        form.validate();
        assert!(form.validator.field_errors.contains_key("email"));
        assert!(form.validator.field_errors.contains_key("password"));
    }

    #[test]
    fn password_update_uses_camel_case_fields() {
        let form: AccountPasswordUpdateForm =
            serde_urlencoded::from_str("currentPassword=old-password&newPassword=new-password&confirmPassword=new-password")
                .unwrap();
        assert_eq!(form.current_password, "old-password");
        assert_eq!(form.new_password, "new-password");
        assert_eq!(form.confirm_password, "new-password");
    }

    #[test]
    fn confirmation_must_equal_new_password() {
        let mut form = AccountPasswordUpdateForm {
            current_password: "old-password".to_string(),
            new_password: "new-password".to_string(),
            confirm_password: "new-passw0rd".to_string(),
            ..Default::default()
        };
        form.validate(&PasswordConfig::default());
        assert_eq!(form.validator.field_errors["confirmPassword"], vec![PASSWORD_MISMATCH.to_string()]);
        assert!(!form.validator.field_errors.contains_key("newPassword"));
    }
}
