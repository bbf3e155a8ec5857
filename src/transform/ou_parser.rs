//! Organizational-unit hierarchy parsing from LDAP distinguished names
//! Pure string parsing — no directory calls.

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct OuPath {
    pub root: Option<String>,
    pub organization_type: Option<String>,
    pub organization: Option<String>,
    pub category: Option<String>,
    pub division: Option<String>,
    pub department: Option<String>,
    pub subdepartment: Option<String>,
    pub immediate_parent: Option<String>,
    pub full_path: Vec<String>,
    pub depth: usize,
}

/// Parses a DN into a leaf-to-root OU array and derives the named levels.
/// `is_ou_object` distinguishes an OU-typed directory entry (whose own
/// leading component is itself an OU, so `immediate_parent` is the *second*
/// component) from a leaf object such as a user or group (whose
/// `immediate_parent` is the *first* OU component).
pub fn parse_ou_path(dn: &str, is_ou_object: bool) -> OuPath {
    let without_leaf = match dn.find(',') {
        Some(idx) if dn[..idx].starts_with("CN=") => &dn[idx + 1..],
        _ => dn,
    };

    let without_dc: String = without_leaf
        .split(',')
        .take_while(|component| !component.starts_with("DC="))
        .collect::<Vec<_>>()
        .join(",");

    let full_path: Vec<String> = without_dc
        .split(',')
        .filter_map(|component| component.strip_prefix("OU="))
        .map(str::to_string)
        .collect();

    let depth = full_path.len();
    let at = |idx: usize| full_path.get(idx).cloned();

    let immediate_parent = if is_ou_object { at(1) } else { at(0) };

    OuPath {
        root: full_path.last().cloned(),
        organization_type: at(depth.saturating_sub(2)),
        organization: at(depth.saturating_sub(3)),
        category: at(depth.saturating_sub(4)),
        division: at(depth.saturating_sub(5)),
        department: at(depth.saturating_sub(6)),
        subdepartment: at(depth.saturating_sub(7)),
        immediate_parent,
        full_path,
        depth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_user_dn_parses_levels_leaf_to_root() {
        let dn = "CN=Jane Doe,OU=Chemistry,OU=Departments,OU=LSA,OU=UM,DC=umich,DC=edu";
        let path = parse_ou_path(dn, false);
        assert_eq!(
            path.full_path,
            vec!["Chemistry", "Departments", "LSA", "UM"]
        );
        assert_eq!(path.root, Some("UM".to_string()));
        assert_eq!(path.immediate_parent, Some("Chemistry".to_string()));
    }

    #[test]
    fn ou_object_dn_uses_second_component_as_immediate_parent() {
        let dn = "OU=Chemistry,OU=Departments,OU=LSA,OU=UM,DC=umich,DC=edu";
        let path = parse_ou_path(dn, true);
        assert_eq!(path.immediate_parent, Some("Departments".to_string()));
    }

    #[test]
    fn dn_without_ou_components_has_zero_depth() {
        let dn = "CN=Jane Doe,DC=umich,DC=edu";
        let path = parse_ou_path(dn, false);
        assert_eq!(path.depth, 0);
        assert_eq!(path.root, None);
    }
}
