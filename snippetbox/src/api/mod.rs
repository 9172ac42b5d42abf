//! HTTP handlers and the forms they accept.
//!
//! - **[`handlers`]**: Axum route handlers, one module per area
//! - **[`models`]**: Form structures posted by the pages
//!
//! # Routes
//!
//! - **Pages** (`/`, `/about`, `/ping`): Home listing, static about page, liveness probe
//! - **Snippets** (`/snippet/*`): Viewing is open to everyone, creating needs a login
//! - **Users** (`/user/*`): Signup, login and logout
//! - **Account** (`/account/*`): Profile and password change, login required

pub mod handlers;
pub mod models;
