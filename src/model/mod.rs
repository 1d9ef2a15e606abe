//! Domain records shared by the auth workflow, the session context and the
//! HTTP surface. Field names follow the managed database's column names so
//! rows and JSON payloads line up without renames.

mod identity;
mod profile;
mod student;
mod teacher;

pub use identity::{Identity, Session, UserMetadata};
pub use profile::{NewProfile, Profile, ProfileChanges, Role};
pub use student::{NewStudent, PlayingLevel, Student};
pub use teacher::{NewTeacher, TeacherChanges, TeacherListing, TeacherRow};

/// Trim a free-text field and collapse blank input to `None`.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_blank_trims_and_drops_empty() {
        assert_eq!(non_blank(Some("  Austin ")), Some("Austin".to_string()));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
