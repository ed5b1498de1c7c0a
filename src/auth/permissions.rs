use serde::{Deserialize, Serialize};

/// Capability bitmask stored on a role as a plain integer column.
///
/// Each capability is a distinct power of two so a role's grant set is the
/// bitwise union of its flags.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default,
)]
#[sqlx(transparent)]
pub struct Permissions(pub i32);

impl Permissions {
    pub const FOLLOW: Permissions = Permissions(1);
    pub const COMMENT: Permissions = Permissions(2);
    pub const WRITE: Permissions = Permissions(4);
    pub const MODERATE: Permissions = Permissions(8);
    pub const ADMIN: Permissions = Permissions(16);

    pub const fn empty() -> Self {
        Permissions(0)
    }

    pub fn contains(self, perm: Permissions) -> bool {
        self.0 & perm.0 == perm.0
    }

    pub fn insert(&mut self, perm: Permissions) {
        self.0 |= perm.0;
    }

    pub fn remove(&mut self, perm: Permissions) {
        self.0 &= !perm.0;
    }

    pub fn union(self, perm: Permissions) -> Self {
        Permissions(self.0 | perm.0)
    }
}

/// The three built-in roles. `default` marks the role assigned to fresh
/// registrations; exactly one definition carries it.
pub struct RoleDef {
    pub name: &'static str,
    pub permissions: &'static [Permissions],
    pub default: bool,
}

pub const ROLE_DEFS: &[RoleDef] = &[
    RoleDef {
        name: "User",
        permissions: &[Permissions::FOLLOW, Permissions::COMMENT, Permissions::WRITE],
        default: true,
    },
    RoleDef {
        name: "Moderator",
        permissions: &[
            Permissions::FOLLOW,
            Permissions::COMMENT,
            Permissions::WRITE,
            Permissions::MODERATE,
        ],
        default: false,
    },
    RoleDef {
        name: "Administrator",
        permissions: &[
            Permissions::FOLLOW,
            Permissions::COMMENT,
            Permissions::WRITE,
            Permissions::MODERATE,
            Permissions::ADMIN,
        ],
        default: false,
    },
];

impl RoleDef {
    pub fn mask(&self) -> Permissions {
        self.permissions
            .iter()
            .fold(Permissions::empty(), |acc, p| acc.union(*p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_of(name: &str) -> Permissions {
        ROLE_DEFS
            .iter()
            .find(|d| d.name == name)
            .expect("role def exists")
            .mask()
    }

    #[test]
    fn user_role_grants_and_denies() {
        let user = mask_of("User");
        assert!(user.contains(Permissions::FOLLOW));
        assert!(user.contains(Permissions::COMMENT));
        assert!(user.contains(Permissions::WRITE));
        assert!(!user.contains(Permissions::MODERATE));
        assert!(!user.contains(Permissions::ADMIN));
    }

    #[test]
    fn moderator_role_grants_moderate_but_not_admin() {
        let moderator = mask_of("Moderator");
        assert!(moderator.contains(Permissions::FOLLOW));
        assert!(moderator.contains(Permissions::COMMENT));
        assert!(moderator.contains(Permissions::WRITE));
        assert!(moderator.contains(Permissions::MODERATE));
        assert!(!moderator.contains(Permissions::ADMIN));
    }

    #[test]
    fn administrator_role_grants_everything() {
        let admin = mask_of("Administrator");
        for perm in [
            Permissions::FOLLOW,
            Permissions::COMMENT,
            Permissions::WRITE,
            Permissions::MODERATE,
            Permissions::ADMIN,
        ] {
            assert!(admin.contains(perm));
        }
    }

    #[test]
    fn exactly_one_default_role() {
        assert_eq!(ROLE_DEFS.iter().filter(|d| d.default).count(), 1);
        assert_eq!(ROLE_DEFS.len(), 3);
    }

    #[test]
    fn insert_is_idempotent_on_combined_masks() {
        let mut perms = Permissions::FOLLOW.union(Permissions::COMMENT);
        perms.insert(Permissions::FOLLOW);
        assert_eq!(perms, Permissions::FOLLOW.union(Permissions::COMMENT));
    }

    #[test]
    fn remove_clears_only_the_named_flag() {
        let mut perms = mask_of("Administrator");
        perms.remove(Permissions::ADMIN);
        assert!(!perms.contains(Permissions::ADMIN));
        assert!(perms.contains(Permissions::MODERATE));
        perms.remove(Permissions::ADMIN);
        assert!(perms.contains(Permissions::WRITE));
    }
}
