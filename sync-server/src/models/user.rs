use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    pub token: String,
    #[serde(default, alias = "allowedResources")]
    pub allowed_resources: BTreeSet<String>,
}

impl User {
    pub fn may_access(&self, resource: &str) -> bool {
        self.allowed_resources.contains(resource)
    }
}

// tokens stay out of logs
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("login", &self.login)
            .field("token", &"***")
            .field("allowed_resources", &self.allowed_resources)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_token() {
        let user = User {
            login: "alice".into(),
            token: "s3cret".into(),
            allowed_resources: BTreeSet::from(["photos".to_string()]),
        };
        let shown = format!("{:?}", user);
        assert!(shown.contains("alice"));
        assert!(!shown.contains("s3cret"));
        assert!(user.may_access("photos"));
        assert!(!user.may_access("docs"));
    }
}
