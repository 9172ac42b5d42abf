//! Page templates, compiled once at startup.

use chrono::{DateTime, Datelike, Utc};
use minijinja::Environment;
use serde::Serialize;

use crate::db::models::users::UserDBResponse;
use crate::snippets::Snippet;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../ui/html/base.html")),
    ("partials/nav.html", include_str!("../ui/html/partials/nav.html")),
    ("partials/errors.html", include_str!("../ui/html/partials/errors.html")),
    ("home.html", include_str!("../ui/html/pages/home.html")),
    ("about.html", include_str!("../ui/html/pages/about.html")),
    ("view.html", include_str!("../ui/html/pages/view.html")),
    ("create.html", include_str!("../ui/html/pages/create.html")),
    ("signup.html", include_str!("../ui/html/pages/signup.html")),
    ("login.html", include_str!("../ui/html/pages/login.html")),
    ("account.html", include_str!("../ui/html/pages/account.html")),
    ("password.html", include_str!("../ui/html/pages/password.html")),
];

/// Everything a page may render. Handlers fill in the parts they need.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateData {
    pub current_year: i32,
    pub flash: String,
    pub is_authenticated: bool,
    pub csrf_token: String,
    pub form: Option<serde_json::Value>,
    pub snippet: Option<Snippet>,
    pub snippets: Vec<Snippet>,
    pub user: Option<UserDBResponse>,
}

impl TemplateData {
    pub fn new() -> Self {
        Self {
            current_year: Utc::now().year(),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_filter("human_date", human_date);
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    pub fn render<S: Serialize>(&self, name: &str, data: &S) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(data)
    }
}

/// Format an RFC 3339 timestamp as `02 Jan 2006 at 15:04` in UTC. Empty or unparseable input
/// renders as nothing.
pub fn human_date(value: String) -> String {
    match DateTime::parse_from_rfc3339(&value) {
        Ok(t) => t.with_timezone(&Utc).format("%d %b %Y at %H:%M").to_string(),
        Err(_) => String::new(),
    }
}
