use super::handlers::{app, auth, health, teachers};
use utoipa::{
    openapi::{Contact, License},
    OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::signup,
        auth::signin,
        auth::signout,
        auth::session,
        app::dashboard,
        app::parent_dashboard,
        app::teacher_dashboard,
        app::list_students,
        app::add_student,
        app::update_profile,
        teachers::find_teachers,
        teachers::teacher_detail,
    ),
    tags(
        (name = "health", description = "Service health"),
        (name = "auth", description = "Sign-up, sign-in and sessions"),
        (name = "app", description = "Signed-in dashboards and account data"),
        (name = "teachers", description = "Teacher directory")
    )
)]
struct ApiDoc;

/// Generated document with the title, version and contact taken from Cargo
/// metadata.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc.info.description = optional_str(env!("CARGO_PKG_DESCRIPTION")).map(str::to_string);
    doc.info.contact = cargo_contact();
    doc.info.license = cargo_license();
    doc
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match (author.find('<'), author.rfind('>')) {
        (Some(start), Some(end)) if start < end => {
            let name = optional_str(&author[..start]);
            let email = optional_str(&author[start + 1..end]);
            (name, email)
        }
        _ => (optional_str(author), None),
    }
}
