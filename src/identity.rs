use rand::Rng;
use serde::{Deserialize, Serialize};

/// Credentials of one simulated visitor. Created once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Synthesizes emails of the form `{prefix}_{k}@{domain}` with `k` drawn
/// uniformly from `1..=suffix_bound`.
///
/// Uniqueness is only probabilistic. A collision simply means the target
/// rejects the registration as a duplicate, which onboarding tolerates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityGenerator {
    pub prefix: String,
    pub domain: String,
    pub suffix_bound: u32,
    pub password: String,
    pub display_name: String,
}

impl Default for IdentityGenerator {
    fn default() -> Self {
        Self {
            prefix: "loadgen".to_string(),
            domain: "example.com".to_string(),
            suffix_bound: 10_000,
            password: "Passw0rd!".to_string(),
            display_name: "LoadUser".to_string(),
        }
    }
}

impl IdentityGenerator {
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Identity {
        let suffix = rng.random_range(1..=self.suffix_bound.max(1));
        Identity {
            name: self.display_name.clone(),
            email: format!("{}_{suffix}@{}", self.prefix, self.domain),
            password: self.password.clone(),
        }
    }
}
