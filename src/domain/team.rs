use std::collections::HashMap;

use super::{validate_team_name, DomainError, TeamName, User, UserId};

/// A team roster: user id → member, unique per id.
///
/// Insertion order is irrelevant; read order is a contract — members are
/// sorted by (username, user id) on every read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    name: TeamName,
    members: HashMap<UserId, User>,
}

impl Team {
    pub fn new(name: TeamName, members: Vec<User>) -> Result<Self, DomainError> {
        validate_team_name(&name)?;
        let mut team = Self {
            name,
            members: HashMap::with_capacity(members.len()),
        };
        for member in members {
            team.upsert_member(member)?;
        }
        Ok(team)
    }

    pub fn name(&self) -> &TeamName {
        &self.name
    }

    /// Insert or replace a member. Every member must carry this team's name.
    pub fn upsert_member(&mut self, user: User) -> Result<(), DomainError> {
        if user.team_name() != &self.name {
            return Err(DomainError::TeamMismatch {
                user: user.id().clone(),
                expected: self.name.clone(),
                actual: user.team_name().clone(),
            });
        }
        self.members.insert(user.id().clone(), user);
        Ok(())
    }

    pub fn member(&self, id: &UserId) -> Option<&User> {
        self.members.get(id)
    }

    pub fn is_member(&self, id: &UserId) -> bool {
        self.members.contains_key(id)
    }

    /// All members, sorted by (username, user id).
    pub fn members(&self) -> Vec<User> {
        let mut members: Vec<User> = self.members.values().cloned().collect();
        members.sort_by(|a, b| {
            a.username()
                .cmp(b.username())
                .then_with(|| a.id().cmp(b.id()))
        });
        members
    }

    /// Active members minus `exclude`, in the same deterministic order as
    /// [`Team::members`] so selection input does not depend on map order.
    pub fn active_members(&self, exclude: &UserId) -> Vec<User> {
        self.members()
            .into_iter()
            .filter(|m| m.is_active() && m.id() != exclude)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, username: &str, active: bool) -> User {
        User::new(id.into(), username, "backend".into(), active).unwrap()
    }

    #[test]
    fn members_sorted_by_username_then_id() {
        let team = Team::new(
            "backend".into(),
            vec![
                member("u3", "bob", true),
                member("u2", "alice", true),
                member("u1", "bob", true),
            ],
        )
        .unwrap();
        let members = team.members();
        let order: Vec<&str> = members.iter().map(|m| m.id().as_str()).collect();
        assert_eq!(order, vec!["u2", "u1", "u3"]);
    }

    #[test]
    fn rejects_member_of_other_team() {
        let stranger = User::new("u9".into(), "eve", "frontend".into(), true).unwrap();
        let err = Team::new("backend".into(), vec![stranger]).unwrap_err();
        assert!(matches!(err, DomainError::TeamMismatch { .. }));
    }

    #[test]
    fn upsert_replaces_existing_member() {
        let mut team = Team::new("backend".into(), vec![member("u1", "alice", true)]).unwrap();
        team.upsert_member(member("u1", "alice", false)).unwrap();
        assert_eq!(team.members().len(), 1);
        assert!(!team.member(&"u1".into()).unwrap().is_active());
    }

    #[test]
    fn active_members_excludes_inactive_and_excluded() {
        let team = Team::new(
            "backend".into(),
            vec![
                member("author", "alice", true),
                member("rev1", "bob", true),
                member("rev2", "carol", false),
            ],
        )
        .unwrap();
        let active = team.active_members(&"author".into());
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id().as_str(), "rev1");
    }
}
