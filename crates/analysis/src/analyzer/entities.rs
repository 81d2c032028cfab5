use mailroom_core::types::EntityGroups;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use super::dates;

/// Named-entity recognizer seam. Failures are absorbed by the analyzer.
pub trait EntityTagger: Send + Sync {
    fn tag(&self, text: &str) -> Result<EntityGroups, String>;
}

/// Capitalization and cue-word tagger; needs no model files.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleTagger;

const ORG_SUFFIXES: &str = "Inc|Corp|Corporation|LLC|Ltd|Company|Co|Group|University|Bank|Labs";

const NOT_A_PLACE: &[&str] = &[
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday",
    "Saturday", "Sunday", "The", "This", "That", "Our", "Your",
];

fn honorific_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:Mr|Mrs|Ms|Dr|Prof)\.?\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)").unwrap()
    })
}

fn greeting_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*(?:Hi|Hello|Dear|Hey)\s+([A-Z][a-z]+)").unwrap())
}

fn signoff_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^\s*(?:Regards|Best regards|Kind regards|Thanks|Best|Cheers|Sincerely),?\s*\n\s*([A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+)?)",
        )
        .unwrap()
    })
}

fn org_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"\b((?:[A-Z][A-Za-z&]+\s+){{1,3}}(?:{})\b)",
            ORG_SUFFIXES
        ))
        .unwrap()
    })
}

fn place_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:in|at|from)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)").unwrap()
    })
}

impl EntityTagger for RuleTagger {
    fn tag(&self, text: &str) -> Result<EntityGroups, String> {
        let captures = |re: &Regex| -> Vec<String> {
            re.captures_iter(text)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .collect()
        };

        let mut people = captures(honorific_re());
        people.extend(captures(greeting_re()));
        people.extend(captures(signoff_re()));

        let organizations = captures(org_re());

        let locations = captures(place_re())
            .into_iter()
            .filter(|place| {
                let first = place.split_whitespace().next().unwrap_or_default();
                !NOT_A_PLACE.contains(&first)
                    && !organizations.iter().any(|org| org.starts_with(place.as_str()))
                    && !people.contains(place)
            })
            .collect();

        Ok(EntityGroups {
            people,
            organizations,
            dates: dates::phrases(text),
            locations,
        })
    }
}

/// Sorted, duplicate-free groups.
pub fn dedupe(groups: EntityGroups) -> EntityGroups {
    let unique = |items: Vec<String>| -> Vec<String> {
        items
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    };

    EntityGroups {
        people: unique(groups.people),
        organizations: unique(groups.organizations),
        dates: unique(groups.dates),
        locations: unique(groups.locations),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_people_orgs_and_places() {
        let text = "Hi Maria,\n\nDr. Alan Turing from Acme Corp will visit us in Berlin \
                    on March 3, 2027.\n\nThanks,\nJonas Weber";
        let groups = dedupe(RuleTagger.tag(text).unwrap());

        assert_eq!(groups.people, vec!["Alan Turing", "Jonas Weber", "Maria"]);
        assert_eq!(groups.organizations, vec!["Acme Corp"]);
        assert_eq!(groups.locations, vec!["Berlin"]);
        assert_eq!(groups.dates, vec!["March 3, 2027"]);
    }

    #[test]
    fn weekday_after_preposition_is_not_a_place() {
        let groups = RuleTagger.tag("See you at Monday standup").unwrap();
        assert!(groups.locations.is_empty());
    }

    #[test]
    fn dedupe_sorts_and_removes_repeats() {
        let groups = dedupe(EntityGroups {
            people: vec!["Zoe".into(), "Adam".into(), "Zoe".into()],
            ..Default::default()
        });
        assert_eq!(groups.people, vec!["Adam", "Zoe"]);
    }
}
