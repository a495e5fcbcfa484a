//! Annotation-based options resolution
//!
//! Each option is read from `<option>.version-checker.io/<container-name>`.

use super::{AnnotationIssue, Options, OptionsError, OptionsResolver, ResolverFactory};
use regex::Regex;
use std::collections::BTreeMap;

/// Annotation key prefixes
pub mod keys {
    pub const ENABLE: &str = "enable.version-checker.io";
    pub const USE_SHA: &str = "use-sha.version-checker.io";
    pub const USE_METADATA: &str = "use-metadata.version-checker.io";
    pub const MATCH_REGEX: &str = "match-regex.version-checker.io";
    pub const PIN_MAJOR: &str = "pin-major.version-checker.io";
    pub const PIN_MINOR: &str = "pin-minor.version-checker.io";
    pub const PIN_PATCH: &str = "pin-patch.version-checker.io";
    pub const OVERRIDE_URL: &str = "override-url.version-checker.io";
    pub const RESOLVE_SHA_TO_TAGS: &str = "resolve-sha-to-tags.version-checker.io";

    /// Full annotation key for a container
    pub fn for_container(option: &str, container: &str) -> String {
        format!("{}/{}", option, container)
    }
}

/// Resolver over a snapshot of one pod's annotations
#[derive(Debug, Clone, Default)]
pub struct AnnotationResolver {
    annotations: BTreeMap<String, String>,
}

impl AnnotationResolver {
    pub fn new(annotations: BTreeMap<String, String>) -> Self {
        Self { annotations }
    }

    fn lookup(&self, option: &str, container: &str) -> Option<(String, &str)> {
        let key = keys::for_container(option, container);
        let value = self.annotations.get(&key)?;
        Some((key, value.as_str()))
    }

    fn read_bool(
        &self,
        option: &str,
        container: &str,
        issues: &mut Vec<AnnotationIssue>,
    ) -> bool {
        match self.lookup(option, container) {
            Some((key, value)) => parse_bool(value).unwrap_or_else(|| {
                issues.push(AnnotationIssue::InvalidBool {
                    key,
                    value: value.to_string(),
                });
                false
            }),
            None => false,
        }
    }

    fn read_pin(
        &self,
        option: &str,
        container: &str,
        issues: &mut Vec<AnnotationIssue>,
    ) -> Option<u64> {
        let (key, value) = self.lookup(option, container)?;
        match value.trim().parse::<u64>() {
            Ok(pin) => Some(pin),
            Err(_) => {
                issues.push(AnnotationIssue::InvalidPin {
                    key,
                    value: value.to_string(),
                });
                None
            }
        }
    }

    fn has(&self, option: &str, container: &str) -> bool {
        self.lookup(option, container).is_some()
    }
}

impl OptionsResolver for AnnotationResolver {
    fn is_enabled(&self, default_enabled: bool, container: &str) -> bool {
        match self.lookup(keys::ENABLE, container) {
            Some((_, value)) => value == "true",
            None => default_enabled,
        }
    }

    fn options(&self, container: &str) -> Result<Options, OptionsError> {
        let mut issues = Vec::new();

        let use_sha = self.read_bool(keys::USE_SHA, container, &mut issues);
        let use_metadata = self.read_bool(keys::USE_METADATA, container, &mut issues);
        let resolve_sha_to_tags =
            self.read_bool(keys::RESOLVE_SHA_TO_TAGS, container, &mut issues);

        let match_regex = match self.lookup(keys::MATCH_REGEX, container) {
            Some((key, value)) => match Regex::new(value) {
                Ok(re) => Some(re),
                Err(source) => {
                    issues.push(AnnotationIssue::InvalidRegex { key, source });
                    None
                }
            },
            None => None,
        };

        let pin_major = self.read_pin(keys::PIN_MAJOR, container, &mut issues);
        let pin_minor = self.read_pin(keys::PIN_MINOR, container, &mut issues);
        let pin_patch = self.read_pin(keys::PIN_PATCH, container, &mut issues);

        if use_sha {
            let mut conflicting = [
                keys::MATCH_REGEX,
                keys::PIN_MAJOR,
                keys::PIN_MINOR,
                keys::PIN_PATCH,
            ]
            .into_iter()
            .filter(|option| self.has(option, container))
            .collect::<Vec<_>>();
            if use_metadata {
                conflicting.insert(0, keys::USE_METADATA);
            }
            for option in conflicting {
                issues.push(AnnotationIssue::Conflict {
                    key: keys::for_container(keys::USE_SHA, container),
                    conflicts_with: keys::for_container(option, container),
                });
            }
        }

        for (option, requires) in [
            (keys::PIN_MINOR, keys::PIN_MAJOR),
            (keys::PIN_PATCH, keys::PIN_MINOR),
        ] {
            if self.has(option, container) && !self.has(requires, container) {
                issues.push(AnnotationIssue::MissingDependency {
                    key: keys::for_container(option, container),
                    requires: keys::for_container(requires, container),
                });
            }
        }

        if !issues.is_empty() {
            return Err(OptionsError::new(issues));
        }

        Ok(Options {
            override_url: self
                .lookup(keys::OVERRIDE_URL, container)
                .map(|(_, value)| value.to_string()),
            use_sha,
            use_metadata,
            match_regex,
            pin_major,
            pin_minor,
            pin_patch,
            resolve_sha_to_tags,
        })
    }
}

/// Builds an [`AnnotationResolver`] per pod
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnotationResolverFactory;

impl ResolverFactory for AnnotationResolverFactory {
    fn resolver(&self, annotations: &BTreeMap<String, String>) -> Box<dyn OptionsResolver> {
        Box::new(AnnotationResolver::new(annotations.clone()))
    }
}

/// Accepts the usual boolean spellings (`true`, `T`, `1`, `FALSE`, ...)
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
