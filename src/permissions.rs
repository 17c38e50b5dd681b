use std::collections::BTreeSet;

use serde::Serialize;

use crate::models::User;

/**
 * Object permissions which can be granted on a poll
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Permission {
    Add,
    Edit,
    View,
    Vote,
    Delete,
}

impl Permission {
    pub const ALL: [Permission; 5] = [
        Permission::Add,
        Permission::Edit,
        Permission::View,
        Permission::Vote,
        Permission::Delete,
    ];

    /// Name used for storage
    pub fn codename(self) -> &'static str {
        match self {
            Permission::Add => "add_poll",
            Permission::Edit => "change_poll",
            Permission::View => "view_poll",
            Permission::Vote => "vote_poll",
            Permission::Delete => "delete_poll",
        }
    }

    pub fn from_codename(codename: &str) -> Option<Self> {
        Permission::ALL
            .iter()
            .copied()
            .find(|perm| perm.codename() == codename)
    }
}

/**
 * Whoever a permission is granted to
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subject {
    User(i32),
    Group(i32),
    /// Granted to everybody, signed in or not
    Anonymous,
}

impl Subject {
    pub fn kind(self) -> &'static str {
        match self {
            Subject::User(_) => "user",
            Subject::Group(_) => "group",
            Subject::Anonymous => "anonymous",
        }
    }

    pub fn id(self) -> i32 {
        match self {
            Subject::User(id) | Subject::Group(id) => id,
            Subject::Anonymous => 0,
        }
    }

    /**
     * Every subject whose permissions apply to the given user: the user, their groups and the
     * anonymous subject
     */
    pub fn all_for(user: Option<&User>) -> Vec<Subject> {
        let mut subjects = Vec::new();
        if let Some(user) = user {
            subjects.push(Subject::User(user.id));
            subjects.extend(user.groups.iter().map(|id| Subject::Group(*id)));
        }
        subjects.push(Subject::Anonymous);
        subjects
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn all() -> Self {
        Permission::ALL.iter().copied().collect()
    }

    pub fn contains(&self, perm: Permission) -> bool {
        self.0.contains(&perm)
    }

    pub fn remove(&mut self, perm: Permission) -> bool {
        self.0.remove(&perm)
    }

    pub fn union_with(&mut self, other: &PermissionSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl std::iter::FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
