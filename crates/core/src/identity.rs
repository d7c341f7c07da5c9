use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::roles::Role;

/// The authenticated caller of a workflow action: directory identity
/// (work email) plus the role set granted by the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub roles: BTreeSet<Role>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self { user_id: user_id.into(), roles: roles.into_iter().collect() }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    /// Whether any held role satisfies `required`, including elevation
    /// scoping (see [`Role::satisfies`]).
    pub fn has_role(&self, required: Role) -> bool {
        self.roles.iter().any(|role| role.satisfies(required))
    }

    pub fn has_any_role(&self, required: &[Role]) -> bool {
        required.iter().any(|role| self.has_role(*role))
    }

    pub fn is_same_user(&self, other_user_id: &str) -> bool {
        normalize_user_id(&self.user_id) == normalize_user_id(other_user_id)
    }

    pub fn display_name(&self) -> String {
        display_name_from_email(&self.user_id)
    }
}

pub fn normalize_user_id(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Derives a human name from the local part of a work email:
/// `jan.kowalski@plant.example` becomes `Jan Kowalski`. Identifiers
/// without an `@` are title-cased the same way.
pub fn display_name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    let words: Vec<String> = local
        .split(|ch: char| ch == '.' || ch == '_' || ch == '-')
        .filter(|part| !part.is_empty())
        .map(capitalize)
        .collect();

    if words.is_empty() {
        return email.trim().to_string();
    }
    words.join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}
