use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Role an agent may declare when registering with the hub.
///
/// The set is fixed; registration with any other role string is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Coder,
    Reviewer,
    Tester,
    Architect,
    Security,
    Devops,
    General,
}

impl AgentRole {
    /// All roles, in a stable order (used for status breakdowns).
    pub const ALL: [AgentRole; 7] = [
        AgentRole::Coder,
        AgentRole::Reviewer,
        AgentRole::Tester,
        AgentRole::Architect,
        AgentRole::Security,
        AgentRole::Devops,
        AgentRole::General,
    ];
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentRole::Coder => "coder",
            AgentRole::Reviewer => "reviewer",
            AgentRole::Tester => "tester",
            AgentRole::Architect => "architect",
            AgentRole::Security => "security",
            AgentRole::Devops => "devops",
            AgentRole::General => "general",
        };
        write!(f, "{s}")
    }
}

impl FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coder" => Ok(AgentRole::Coder),
            "reviewer" => Ok(AgentRole::Reviewer),
            "tester" => Ok(AgentRole::Tester),
            "architect" => Ok(AgentRole::Architect),
            "security" => Ok(AgentRole::Security),
            "devops" => Ok(AgentRole::Devops),
            "general" => Ok(AgentRole::General),
            other => Err(format!("unknown agent role: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in AgentRole::ALL {
            let parsed: AgentRole = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn test_unknown_role_rejected() {
        assert!("wizard".parse::<AgentRole>().is_err());
    }
}
