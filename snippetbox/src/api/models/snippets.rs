use serde::{Deserialize, Serialize};

use crate::api::models::users::{BLANK, too_long};
use crate::forms::validator::{max_chars, not_blank, permitted_value};
use crate::forms::{Validated, Validator};

pub const EXPIRES_CHOICES: [i64; 3] = [1, 7, 365];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnippetCreateForm {
    pub title: String,
    pub content: String,
    /// Days until the snippet expires
    pub expires: i64,
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl Default for SnippetCreateForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            content: String::new(),
            expires: 365,
            validator: Validator::default(),
        }
    }
}

impl Validated for SnippetCreateForm {
    fn validator(&self) -> &Validator {
        &self.validator
    }

    fn validator_mut(&mut self) -> &mut Validator {
        &mut self.validator
    }
}

impl SnippetCreateForm {
    pub fn validate(&mut self) {
        self.check_field(not_blank(&self.title), "title", BLANK);
        self.check_field(max_chars(&self.title, 100), "title", too_long(100));
        self.check_field(not_blank(&self.content), "content", BLANK);
        self.check_field(
            permitted_value(&self.expires, &EXPIRES_CHOICES),
            "expires",
            "This field must equal 1, 7 or 365",
        );
    }
}
