use super::{Team, UserId};

/// The already-verified identity of the caller: an optional user id plus an
/// admin flag. An anonymous requester means token verification is disabled
/// (deployments without configured secrets) and is granted access.
#[derive(Debug, Clone, Default)]
pub struct Requester {
    id: Option<UserId>,
    is_admin: bool,
}

impl Requester {
    pub fn new(id: UserId, is_admin: bool) -> Self {
        Self {
            id: Some(id),
            is_admin,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.id.as_ref()
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn can_view_team(&self, team: &Team) -> bool {
        if self.is_admin {
            return true;
        }
        match &self.id {
            None => true,
            Some(id) => team.is_member(id),
        }
    }

    pub fn can_view_assignments_of(&self, user_id: &UserId) -> bool {
        if self.is_admin {
            return true;
        }
        match &self.id {
            None => true,
            Some(id) => id == user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::User;

    fn team_with(ids: &[&str]) -> Team {
        let members = ids
            .iter()
            .map(|id| User::new((*id).into(), *id, "backend".into(), true).unwrap())
            .collect();
        Team::new("backend".into(), members).unwrap()
    }

    #[test]
    fn admin_views_any_team() {
        let requester = Requester::new("admin".into(), true);
        assert!(requester.can_view_team(&team_with(&["u1"])));
    }

    #[test]
    fn member_views_own_team_only() {
        let requester = Requester::new("u1".into(), false);
        assert!(requester.can_view_team(&team_with(&["u1", "u2"])));
        assert!(!requester.can_view_team(&team_with(&["u2"])));
    }

    #[test]
    fn non_admin_views_only_own_assignments() {
        let requester = Requester::new("u1".into(), false);
        assert!(requester.can_view_assignments_of(&"u1".into()));
        assert!(!requester.can_view_assignments_of(&"u2".into()));
    }
}
