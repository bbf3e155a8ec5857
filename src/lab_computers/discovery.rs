//! The six discovery methods, each a pure function over the
//! in-memory caches producing zero or more [`Candidate`]s. Kept as six
//! separate small functions (not one branching loop) so each is testable in
//! isolation and the base-confidence table lives next to the method that
//! earns it.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::lab_computers::cache::{ComputersCache, LabMembersCache, LabsCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AssociationMethod {
    AdOuNested,
    OwnerIsPi,
    FinancialOwnerIsPi,
    NameContainsPi,
    OwnerInLabMembers,
    LastUserInLabMembers,
}

impl AssociationMethod {
    pub fn tier(self) -> Tier {
        match self {
            AssociationMethod::AdOuNested
            | AssociationMethod::OwnerIsPi
            | AssociationMethod::FinancialOwnerIsPi
            | AssociationMethod::NameContainsPi => Tier::One,
            AssociationMethod::OwnerInLabMembers | AssociationMethod::LastUserInLabMembers => Tier::Two,
        }
    }

    pub fn base_confidence(self) -> Decimal {
        match self {
            AssociationMethod::AdOuNested => dec!(0.80),
            AssociationMethod::OwnerIsPi => dec!(0.85),
            AssociationMethod::FinancialOwnerIsPi => dec!(0.80),
            AssociationMethod::NameContainsPi => dec!(0.70),
            AssociationMethod::OwnerInLabMembers => dec!(0.35),
            AssociationMethod::LastUserInLabMembers => dec!(0.30),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssociationMethod::AdOuNested => "ad_ou_nested",
            AssociationMethod::OwnerIsPi => "owner_is_pi",
            AssociationMethod::FinancialOwnerIsPi => "financial_owner_is_pi",
            AssociationMethod::NameContainsPi => "name_contains_pi",
            AssociationMethod::OwnerInLabMembers => "owner_in_lab_members",
            AssociationMethod::LastUserInLabMembers => "last_user_in_lab_members",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub computer_id: String,
    pub lab_id: String,
    pub method: AssociationMethod,
    pub base_confidence: Decimal,
}

fn candidate(computer_id: &str, lab_id: &str, method: AssociationMethod) -> Candidate {
    Candidate {
        computer_id: computer_id.to_string(),
        lab_id: lab_id.to_string(),
        method,
        base_confidence: method.base_confidence(),
    }
}

pub fn discover_by_ad_ou(computers: &ComputersCache, labs: &LabsCache) -> Vec<Candidate> {
    let mut out = Vec::new();
    for computer in &computers.0 {
        let Some(dn) = &computer.ad_dn else { continue };
        for lab in &labs.0 {
            if let Some(ou) = &lab.ad_ou_dn {
                if dn.contains(ou.as_str()) {
                    out.push(candidate(&computer.computer_id, &lab.lab_id, AssociationMethod::AdOuNested));
                }
            }
        }
    }
    out
}

pub fn discover_by_owner_pi(computers: &ComputersCache, labs: &LabsCache) -> Vec<Candidate> {
    let mut out = Vec::new();
    for computer in &computers.0 {
        let Some(owner) = &computer.owner_uniqname else { continue };
        for lab in &labs.0 {
            if owner == &lab.pi_uniqname {
                out.push(candidate(&computer.computer_id, &lab.lab_id, AssociationMethod::OwnerIsPi));
            }
        }
    }
    out
}

pub fn discover_by_financial_owner_pi(computers: &ComputersCache, labs: &LabsCache) -> Vec<Candidate> {
    let mut out = Vec::new();
    for computer in &computers.0 {
        let Some(owner) = &computer.financial_owner_uniqname else { continue };
        for lab in &labs.0 {
            if owner == &lab.pi_uniqname {
                out.push(candidate(&computer.computer_id, &lab.lab_id, AssociationMethod::FinancialOwnerIsPi));
            }
        }
    }
    out
}

pub fn discover_by_name_pattern_pi(computers: &ComputersCache, labs: &LabsCache) -> Vec<Candidate> {
    let mut out = Vec::new();
    for computer in &computers.0 {
        let Some(name) = &computer.name else { continue };
        let name_lower = name.to_lowercase();
        for lab in &labs.0 {
            if name_lower.contains(&lab.pi_uniqname.to_lowercase()) {
                out.push(candidate(&computer.computer_id, &lab.lab_id, AssociationMethod::NameContainsPi));
            }
        }
    }
    out
}

pub fn discover_by_owner_member(
    computers: &ComputersCache,
    labs: &LabsCache,
    members: &LabMembersCache,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    for computer in &computers.0 {
        let Some(owner) = &computer.owner_uniqname else { continue };
        for lab in &labs.0 {
            if owner == &lab.pi_uniqname {
                continue;
            }
            if members.0.get(&lab.lab_id).is_some_and(|set| set.contains(owner)) {
                out.push(candidate(&computer.computer_id, &lab.lab_id, AssociationMethod::OwnerInLabMembers));
            }
        }
    }
    out
}

pub fn discover_by_last_user_member(
    computers: &ComputersCache,
    labs: &LabsCache,
    members: &LabMembersCache,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    for computer in &computers.0 {
        let Some(last_user) = &computer.last_user_uniqname else { continue };
        for lab in &labs.0 {
            if members.0.get(&lab.lab_id).is_some_and(|set| set.contains(last_user)) {
                out.push(candidate(&computer.computer_id, &lab.lab_id, AssociationMethod::LastUserInLabMembers));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab_computers::cache::{ComputerInfo, LabInfo};
    use std::collections::{HashMap, HashSet};

    fn computer(id: &str, owner: Option<&str>, fin_owner: Option<&str>, name: Option<&str>) -> ComputerInfo {
        ComputerInfo {
            computer_id: id.to_string(),
            name: name.map(str::to_string),
            ad_dn: None,
            owner_uniqname: owner.map(str::to_string),
            financial_owner_uniqname: fin_owner.map(str::to_string),
            function_id: None,
            last_user_uniqname: None,
        }
    }

    fn lab(id: &str, pi: &str) -> LabInfo {
        LabInfo { lab_id: id.to_string(), pi_uniqname: pi.to_string(), ad_ou_dn: None }
    }

    #[test]
    fn owner_matching_pi_is_tier_one_at_base_085() {
        let computers = ComputersCache(vec![computer("c1", Some("jsmith"), None, None)]);
        let labs = LabsCache(vec![lab("lab-a", "jsmith")]);
        let candidates = discover_by_owner_pi(&computers, &labs);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].base_confidence, dec!(0.85));
        assert_eq!(candidates[0].method.tier(), Tier::One);
    }

    #[test]
    fn owner_in_members_excludes_the_pi_themselves() {
        let computers = ComputersCache(vec![computer("c1", Some("jsmith"), None, None)]);
        let labs = LabsCache(vec![lab("lab-a", "jsmith")]);
        let mut set = HashSet::new();
        set.insert("jsmith".to_string());
        let mut map = HashMap::new();
        map.insert("lab-a".to_string(), set);
        let candidates = discover_by_owner_member(&computers, &labs, &LabMembersCache(map));
        assert!(candidates.is_empty());
    }

    #[test]
    fn name_pattern_match_is_case_insensitive() {
        let computers = ComputersCache(vec![computer("c1", None, None, Some("JSMITH-LAB-PC-01"))]);
        let labs = LabsCache(vec![lab("lab-a", "jsmith")]);
        let candidates = discover_by_name_pattern_pi(&computers, &labs);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].method, AssociationMethod::NameContainsPi);
    }
}
