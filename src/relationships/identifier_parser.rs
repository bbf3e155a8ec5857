//! Classifies a group-membership identifier as a user, a group, or
//! unknown, from its raw string form (a DN or a bare account name), and
//! extracts the short id (uniqname or group cn) that the link tables store.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    User,
    Group,
    Unknown,
}

/// Bare-string prefixes known to name groups rather than users — data, not
/// branching logic, so a new prefix convention is a one-line addition.
const KNOWN_GROUP_PREFIXES: &[&str] = &["lsa-", "grp-", "svc-grp-"];

/// Leading `uid=` or `cn=` RDN value of a DN.
static LEADING_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:uid|cn)=([^,]+)").expect("static pattern"));

/// Any `OU=` component naming a user-container OU.
static USER_OU: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ou=(people|accounts|privileged)(,|$)").expect("static pattern"));

/// Any `OU=` component naming a group-container OU.
static GROUP_OU: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)ou=(groups|user groups|mcommadsync)(,|$)").expect("static pattern")
});

/// `classify` returns the identifier's short id (the `uid=`/`cn=` attribute
/// value for a DN, the bare string otherwise) and its kind. DN
/// classification inspects the OU path rather than the leading RDN, since
/// both users and groups use `CN=` as their own RDN attribute.
pub fn classify(identifier: &str) -> (String, MemberKind) {
    let trimmed = identifier.trim();
    if trimmed.contains('=') {
        let short_id = LEADING_ATTRIBUTE
            .captures(trimmed)
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| trimmed.to_string());

        let kind = if GROUP_OU.is_match(trimmed) {
            MemberKind::Group
        } else if USER_OU.is_match(trimmed) || trimmed.to_lowercase().starts_with("cn=") {
            MemberKind::User
        } else {
            MemberKind::Unknown
        };
        return (short_id, kind);
    }

    let lowered = trimmed.to_lowercase();
    let kind = if KNOWN_GROUP_PREFIXES.iter().any(|prefix| lowered.starts_with(prefix)) {
        MemberKind::Group
    } else if trimmed.is_empty() {
        MemberKind::Unknown
    } else {
        MemberKind::User
    };
    (trimmed.to_string(), kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dn_in_groups_ou_classifies_as_group_and_extracts_cn() {
        let (id, kind) = classify("CN=lsa-research,OU=Groups,OU=LSA,DC=umich,DC=edu");
        assert_eq!(kind, MemberKind::Group);
        assert_eq!(id, "lsa-research");
    }

    #[test]
    fn dn_in_people_ou_classifies_as_user_and_extracts_uid() {
        let (id, kind) = classify("uid=jdoe,OU=People,OU=LSA,DC=umich,DC=edu");
        assert_eq!(kind, MemberKind::User);
        assert_eq!(id, "jdoe");
    }

    #[test]
    fn dn_in_user_groups_ou_classifies_as_group() {
        let (_, kind) = classify("CN=lsa-chem-staff,OU=User Groups,DC=umich,DC=edu");
        assert_eq!(kind, MemberKind::Group);
    }

    #[test]
    fn dn_in_privileged_ou_classifies_as_user() {
        let (id, kind) = classify("CN=jdoe-admin,OU=Privileged,DC=umich,DC=edu");
        assert_eq!(kind, MemberKind::User);
        assert_eq!(id, "jdoe-admin");
    }

    #[test]
    fn bare_string_with_known_group_prefix_classifies_as_group() {
        let (_, kind) = classify("lsa-chem-staff");
        assert_eq!(kind, MemberKind::Group);
    }

    #[test]
    fn bare_string_without_group_prefix_defaults_to_user() {
        let (_, kind) = classify("jdoe");
        assert_eq!(kind, MemberKind::User);
    }

    #[test]
    fn empty_identifier_is_unknown() {
        let (_, kind) = classify("   ");
        assert_eq!(kind, MemberKind::Unknown);
    }
}
