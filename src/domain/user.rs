use super::{validate_team_name, validate_user_id, validate_username, DomainError, TeamName, UserId};

/// A team member. Immutable except for the active flag, which
/// [`User::with_activity`] replaces on a copy (value semantics).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: UserId,
    username: String,
    team_name: TeamName,
    is_active: bool,
}

impl User {
    pub fn new(
        id: UserId,
        username: &str,
        team_name: TeamName,
        is_active: bool,
    ) -> Result<Self, DomainError> {
        validate_user_id(&id)?;
        validate_username(username)?;
        validate_team_name(&team_name)?;
        Ok(Self {
            id,
            username: username.trim().to_string(),
            team_name,
            is_active,
        })
    }

    pub fn id(&self) -> &UserId {
        &self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn team_name(&self) -> &TeamName {
        &self.team_name
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn with_activity(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }
}
