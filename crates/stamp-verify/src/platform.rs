//! Platform index
//!
//! Maps each provider type to the platform that owns it. Providers of one
//! platform share a context and run one after another; platforms run in
//! parallel.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Platform used for types no platform claims
pub const GENERIC_PLATFORM: &str = "generic";

/// A platform and the provider types it owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDefinition {
    pub name: String,
    pub providers: Vec<String>,
}

impl PlatformDefinition {
    pub fn new(name: &str, providers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            providers: providers.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Static provider type → platform lookup, built once at startup
#[derive(Debug, Clone, Default)]
pub struct PlatformIndex {
    by_type: HashMap<String, String>,
}

impl PlatformIndex {
    /// Build the index. A type claimed by two platforms stays with the first.
    pub fn new(platforms: &[PlatformDefinition]) -> Self {
        let mut by_type = HashMap::new();
        for platform in platforms {
            for provider in &platform.providers {
                match by_type.get(provider) {
                    Some(owner) if owner != &platform.name => {
                        warn!(
                            provider = %provider,
                            owner = %owner,
                            claimed_by = %platform.name,
                            "Provider type claimed by more than one platform"
                        );
                    }
                    Some(_) => {}
                    None => {
                        by_type.insert(provider.clone(), platform.name.clone());
                    }
                }
            }
        }
        Self { by_type }
    }

    /// Owning platform of a type
    pub fn platform_of(&self, provider_type: &str) -> &str {
        self.by_type
            .get(provider_type)
            .map(String::as_str)
            .unwrap_or(GENERIC_PLATFORM)
    }

    /// Group types by platform.
    ///
    /// Groups appear in order of first occurrence and keep the caller's order
    /// inside each group. `key` maps a requested type to the type used for
    /// the platform lookup.
    pub fn group_by<F>(&self, types: &[String], key: F) -> Vec<Vec<String>>
    where
        F: Fn(&str) -> String,
    {
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<String>> = HashMap::new();

        for t in types {
            let platform = self.platform_of(&key(t));
            let group = groups.entry(platform).or_insert_with(|| {
                order.push(platform);
                Vec::new()
            });
            group.push(t.clone());
        }

        order
            .into_iter()
            .filter_map(|platform| groups.remove(platform))
            .collect()
    }

    /// Group types by platform using the types themselves as lookup keys
    pub fn group(&self, types: &[String]) -> Vec<Vec<String>> {
        self.group_by(types, str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> PlatformIndex {
        PlatformIndex::new(&[
            PlatformDefinition::new("Github", &["GithubAccountCreation", "GithubContribution"]),
            PlatformDefinition::new("Google", &["Google"]),
        ])
    }

    fn types(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_grouping_preserves_order() {
        let groups = index().group(&types(&[
            "GithubContribution",
            "Google",
            "Unknown",
            "GithubAccountCreation",
        ]));

        assert_eq!(
            groups,
            vec![
                types(&["GithubContribution", "GithubAccountCreation"]),
                types(&["Google"]),
                types(&["Unknown"]),
            ]
        );
    }

    #[test]
    fn test_unknown_types_are_generic() {
        let index = index();
        assert_eq!(index.platform_of("Nope"), GENERIC_PLATFORM);
        assert_eq!(index.platform_of("Google"), "Google");
    }

    #[test]
    fn test_duplicate_claim_keeps_first() {
        let index = PlatformIndex::new(&[
            PlatformDefinition::new("First", &["Shared"]),
            PlatformDefinition::new("Second", &["Shared", "Own"]),
        ]);
        assert_eq!(index.platform_of("Shared"), "First");
        assert_eq!(index.platform_of("Own"), "Second");
    }
}
