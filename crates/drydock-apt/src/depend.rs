//! Parser for `Depends`-style fields.
//!
//! Drydock never solves constraints itself, so parenthesized version
//! constraints and `:architecture` qualifiers are stripped and only names
//! survive. A `|`-joined entry stays together as an alternatives group; each
//! alternative is cleaned on its own, so `a (>= 1) | b:any` keeps both `a`
//! and `b`.

/// One comma-separated entry from a dependency field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// A plain `package-name` entry.
    Specific(String),
    /// A `name | name | ...` group; any one member satisfies the entry.
    Alternatives(Vec<String>),
}

impl Dependency {
    /// Whether `candidate` satisfies this entry by name.
    pub fn satisfied_by(&self, candidate: &str) -> bool {
        match self {
            Dependency::Specific(name) => name == candidate,
            Dependency::Alternatives(names) => names.iter().any(|n| n == candidate),
        }
    }

    /// The package names this entry can be satisfied by.
    pub fn names(&self) -> &[String] {
        match self {
            Dependency::Specific(name) => std::slice::from_ref(name),
            Dependency::Alternatives(names) => names,
        }
    }
}

/// Parse a comma-separated dependency field into name-only entries,
/// de-duplicated while preserving first-seen order.
pub fn parse_dependency_list(field: &str) -> Vec<Dependency> {
    let mut seen = std::collections::HashSet::new();
    let mut entries = Vec::new();
    for entry in field.split(',') {
        let mut names: Vec<String> = entry
            .split('|')
            .map(clean_name)
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            continue;
        }
        if !seen.insert(names.join("|")) {
            continue;
        }
        if names.len() == 1 {
            entries.push(Dependency::Specific(names.remove(0)));
        } else {
            entries.push(Dependency::Alternatives(names));
        }
    }
    entries
}

/// Strip the version constraint and architecture qualifier from one name.
fn clean_name(raw: &str) -> String {
    let mut name = raw;
    if let Some(open) = name.find('(') {
        name = &name[..open];
    }
    if let Some(colon) = name.find(':') {
        name = &name[..colon];
    }
    name.trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_become_specific_entries() {
        let parsed = parse_dependency_list("libc6, zlib1g");
        assert_eq!(
            parsed,
            vec![
                Dependency::Specific("libc6".to_owned()),
                Dependency::Specific("zlib1g".to_owned()),
            ]
        );
    }

    #[test]
    fn version_constraints_are_discarded() {
        let parsed = parse_dependency_list("libc6 (>= 2.28), dpkg (>= 1.19.1)");
        assert_eq!(
            parsed,
            vec![
                Dependency::Specific("libc6".to_owned()),
                Dependency::Specific("dpkg".to_owned()),
            ]
        );
    }

    #[test]
    fn architecture_qualifiers_are_discarded() {
        let parsed = parse_dependency_list("python3:any, libfoo:amd64 (>= 1.0)");
        assert_eq!(
            parsed,
            vec![
                Dependency::Specific("python3".to_owned()),
                Dependency::Specific("libfoo".to_owned()),
            ]
        );
    }

    #[test]
    fn alternatives_keep_every_member() {
        let parsed = parse_dependency_list("debconf (>= 0.5) | debconf-2.0, awk");
        assert_eq!(
            parsed,
            vec![
                Dependency::Alternatives(vec![
                    "debconf".to_owned(),
                    "debconf-2.0".to_owned()
                ]),
                Dependency::Specific("awk".to_owned()),
            ]
        );
    }

    #[test]
    fn each_alternative_is_cleaned_independently() {
        let parsed = parse_dependency_list("a (>= 1) | b:any | c (<< 2)");
        assert_eq!(
            parsed,
            vec![Dependency::Alternatives(vec![
                "a".to_owned(),
                "b".to_owned(),
                "c".to_owned(),
            ])]
        );
    }

    #[test]
    fn duplicate_entries_collapse_in_order() {
        let parsed = parse_dependency_list("libc6, zlib1g, libc6 (>= 2.28)");
        assert_eq!(
            parsed,
            vec![
                Dependency::Specific("libc6".to_owned()),
                Dependency::Specific("zlib1g".to_owned()),
            ]
        );
    }

    #[test]
    fn empty_field_parses_to_nothing() {
        assert!(parse_dependency_list("").is_empty());
        assert!(parse_dependency_list("  ,  ").is_empty());
    }

    #[test]
    fn satisfied_by_matches_any_alternative() {
        let entry = Dependency::Alternatives(vec!["mawk".to_owned(), "gawk".to_owned()]);
        assert!(entry.satisfied_by("gawk"));
        assert!(!entry.satisfied_by("awk"));
        let plain = Dependency::Specific("dash".to_owned());
        assert!(plain.satisfied_by("dash"));
        assert!(!plain.satisfied_by("bash"));
    }
}
