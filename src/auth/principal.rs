use crate::auth::permissions::Permissions;
use crate::auth::repo_types::User;
use crate::error::AppError;

/// The acting party for a request: a resolved user plus the permission mask
/// of their role, or nobody at all.
#[derive(Debug, Clone)]
pub enum Principal {
    Anonymous,
    Authenticated { user: User, permissions: Permissions },
}

impl Principal {
    /// Anonymous callers hold no permissions, without any role lookup.
    pub fn can(&self, perm: Permissions) -> bool {
        match self {
            Principal::Anonymous => false,
            Principal::Authenticated { permissions, .. } => permissions.contains(perm),
        }
    }

    pub fn is_administrator(&self) -> bool {
        self.can(Permissions::ADMIN)
    }

    /// Capability guard: refuse before the protected operation runs.
    pub fn authorize(&self, perm: Permissions) -> Result<(), AppError> {
        if self.can(perm) {
            Ok(())
        } else {
            Err(AppError::AccessDenied)
        }
    }

    pub fn authorize_admin(&self) -> Result<(), AppError> {
        self.authorize(Permissions::ADMIN)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::Anonymous => None,
            Principal::Authenticated { user, .. } => Some(user),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permissions::ROLE_DEFS;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn authenticated_with(mask: Permissions) -> Principal {
        Principal::Authenticated {
            user: User {
                id: Uuid::new_v4(),
                email: "member@example.com".into(),
                name: "Member".into(),
                location: None,
                about_me: None,
                member_since: OffsetDateTime::now_utc(),
                last_seen: OffsetDateTime::now_utc(),
                role_id: 1,
                password_hash: "hash".into(),
                confirmed: true,
            },
            permissions: mask,
        }
    }

    #[test]
    fn anonymous_denies_every_flag() {
        let anon = Principal::Anonymous;
        for perm in [
            Permissions::FOLLOW,
            Permissions::COMMENT,
            Permissions::WRITE,
            Permissions::MODERATE,
            Permissions::ADMIN,
        ] {
            assert!(!anon.can(perm));
        }
        assert!(!anon.is_administrator());
        assert!(anon.authorize(Permissions::FOLLOW).is_err());
    }

    #[test]
    fn moderator_can_moderate_but_is_not_administrator() {
        let mask = ROLE_DEFS.iter().find(|d| d.name == "Moderator").unwrap().mask();
        let principal = authenticated_with(mask);
        assert!(principal.can(Permissions::MODERATE));
        assert!(!principal.is_administrator());
        assert!(principal.authorize(Permissions::WRITE).is_ok());
        assert!(principal.authorize_admin().is_err());
    }

    #[test]
    fn user_accessor_exposes_only_authenticated_callers() {
        // The reset endpoints turn logged-in callers away on exactly this check.
        assert!(Principal::Anonymous.user().is_none());
        let principal = authenticated_with(Permissions::empty());
        assert!(principal.user().is_some());
    }

    #[test]
    fn administrator_passes_the_admin_guard() {
        let mask = ROLE_DEFS
            .iter()
            .find(|d| d.name == "Administrator")
            .unwrap()
            .mask();
        let principal = authenticated_with(mask);
        assert!(principal.is_administrator());
        assert!(principal.authorize_admin().is_ok());
    }
}
