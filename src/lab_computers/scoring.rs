//! Additive bonus/penalty scoring. Starts from the discovery
//! method's base confidence, adds supporting-evidence bonuses not already
//! counted by the base method, subtracts penalties, then clamps to the
//! method's tier band — the exact constants are reproduced verbatim, not
//! reinterpreted.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::lab_computers::cache::{ComputerInfo, LabInfo, LabMembersCache};
use crate::lab_computers::discovery::{AssociationMethod, Candidate, Tier};
use crate::quality::clamp_band;

/// TDX custom-attribute values for `function_id` this pipeline recognizes.
/// Representative placeholders, same convention as `transform::tdx_assets`.
mod function_ids {
    pub const RESEARCH: &str = "20001";
    pub const CLASSROOM: &str = "20002";
    pub const ADMINISTRATIVE: &str = "20003";
    pub const DEVELOPMENT: &str = "20004";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionCategory {
    Research,
    Classroom,
    Administrative,
    Development,
    OtherOrNone,
}

fn classify_function(function_id: &Option<String>) -> FunctionCategory {
    match function_id.as_deref() {
        Some(id) if id == function_ids::RESEARCH => FunctionCategory::Research,
        Some(id) if id == function_ids::CLASSROOM => FunctionCategory::Classroom,
        Some(id) if id == function_ids::ADMINISTRATIVE => FunctionCategory::Administrative,
        Some(id) if id == function_ids::DEVELOPMENT => FunctionCategory::Development,
        _ => FunctionCategory::OtherOrNone,
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CriteriaFlags {
    pub owner_is_pi: bool,
    pub fin_owner_is_pi: bool,
    pub owner_is_member: bool,
    pub fin_owner_is_member: bool,
    pub function_is_research: bool,
    pub function_is_classroom: bool,
}

pub fn score(
    candidate: &Candidate,
    computer: &ComputerInfo,
    lab: &LabInfo,
    members: &LabMembersCache,
) -> (Decimal, CriteriaFlags) {
    let owner_is_pi = computer.owner_uniqname.as_deref() == Some(lab.pi_uniqname.as_str());
    let fin_owner_is_pi = computer.financial_owner_uniqname.as_deref() == Some(lab.pi_uniqname.as_str());
    let member_set = members.0.get(&lab.lab_id);
    let owner_is_member = computer
        .owner_uniqname
        .as_ref()
        .is_some_and(|u| member_set.is_some_and(|set| set.contains(u)));
    let fin_owner_is_member = computer
        .financial_owner_uniqname
        .as_ref()
        .is_some_and(|u| member_set.is_some_and(|set| set.contains(u)));
    let in_ad_ou = computer
        .ad_dn
        .as_deref()
        .zip(lab.ad_ou_dn.as_deref())
        .is_some_and(|(dn, ou)| dn.contains(ou));
    let name_contains_pi = computer
        .name
        .as_deref()
        .is_some_and(|name| name.to_lowercase().contains(&lab.pi_uniqname.to_lowercase()));
    let function_category = classify_function(&computer.function_id);
    let function_is_research = function_category == FunctionCategory::Research;
    let function_is_classroom = function_category == FunctionCategory::Classroom;

    let mut value = candidate.base_confidence;

    if fin_owner_is_pi && candidate.method != AssociationMethod::FinancialOwnerIsPi {
        value += dec!(0.15);
    }
    if owner_is_pi && candidate.method != AssociationMethod::OwnerIsPi {
        value += dec!(0.12);
    }
    if in_ad_ou && candidate.method != AssociationMethod::AdOuNested {
        value += dec!(0.10);
    }
    if name_contains_pi && candidate.method != AssociationMethod::NameContainsPi {
        value += dec!(0.08);
    }
    match function_category {
        FunctionCategory::Research => value += dec!(0.05),
        FunctionCategory::Classroom => value += dec!(0.03),
        _ => {}
    }

    if computer.owner_uniqname.is_some() && !owner_is_pi && !owner_is_member {
        value -= dec!(0.10);
    }
    if computer.financial_owner_uniqname.is_some() && !fin_owner_is_pi && !fin_owner_is_member {
        value -= dec!(0.08);
    }
    match function_category {
        FunctionCategory::Administrative => value -= dec!(0.12),
        FunctionCategory::Development => value -= dec!(0.12),
        FunctionCategory::Research | FunctionCategory::Classroom => {}
        FunctionCategory::OtherOrNone => value -= dec!(0.05),
    }

    let (floor, ceiling) = match candidate.method.tier() {
        Tier::One => (dec!(0.70), dec!(1.00)),
        Tier::Two => (dec!(0.20), dec!(0.50)),
    };
    let clamped = clamp_band(value, floor, ceiling);

    (
        clamped,
        CriteriaFlags {
            owner_is_pi,
            fin_owner_is_pi,
            owner_is_member,
            fin_owner_is_member,
            function_is_research,
            function_is_classroom,
        },
    )
}

#[derive(Debug, Default, Clone)]
pub struct QualityFlags {
    pub low_confidence: bool,
    pub high_confidence: bool,
    pub fully_pi_owned: bool,
    pub owner_not_affiliated: bool,
    pub fin_owner_not_affiliated: bool,
    pub admin_function: bool,
    pub dev_function: bool,
    pub no_function: bool,
}

pub fn quality_flags(
    confidence: Decimal,
    computer: &ComputerInfo,
    criteria: &CriteriaFlags,
) -> QualityFlags {
    let function_category = classify_function(&computer.function_id);
    QualityFlags {
        low_confidence: confidence < dec!(0.40),
        high_confidence: confidence >= dec!(0.90),
        fully_pi_owned: criteria.owner_is_pi && criteria.fin_owner_is_pi,
        owner_not_affiliated: computer.owner_uniqname.is_some() && !criteria.owner_is_pi && !criteria.owner_is_member,
        fin_owner_not_affiliated: computer.financial_owner_uniqname.is_some()
            && !criteria.fin_owner_is_pi
            && !criteria.fin_owner_is_member,
        admin_function: function_category == FunctionCategory::Administrative,
        dev_function: function_category == FunctionCategory::Development,
        no_function: computer.function_id.is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab_computers::discovery::AssociationMethod;
    use std::collections::{HashMap, HashSet};

    fn computer(owner: Option<&str>, fin_owner: Option<&str>) -> ComputerInfo {
        ComputerInfo {
            computer_id: "c1".to_string(),
            name: None,
            ad_dn: None,
            owner_uniqname: owner.map(str::to_string),
            financial_owner_uniqname: fin_owner.map(str::to_string),
            function_id: None,
            last_user_uniqname: None,
        }
    }

    fn lab() -> LabInfo {
        LabInfo { lab_id: "lab-a".to_string(), pi_uniqname: "jsmith".to_string(), ad_ou_dn: None }
    }

    #[test]
    fn owner_is_pi_with_unaffiliated_financial_owner_gets_penalty_and_stays_in_tier_one_band() {
        let candidate = Candidate {
            computer_id: "c1".to_string(),
            lab_id: "lab-a".to_string(),
            method: AssociationMethod::OwnerIsPi,
            base_confidence: dec!(0.85),
        };
        let computer = computer(Some("jsmith"), Some("someone-else"));
        let members = LabMembersCache(HashMap::new());
        let (confidence, criteria) = score(&candidate, &computer, &lab(), &members);
        assert!(criteria.owner_is_pi);
        assert!(!criteria.fin_owner_is_pi);
        // 0.85 + 0 bonuses - 0.08 fin-owner penalty = 0.77, within [0.70, 1.00].
        assert_eq!(confidence, dec!(0.77));
    }

    #[test]
    fn tier_two_method_never_escalates_past_ceiling_even_with_every_bonus() {
        let candidate = Candidate {
            computer_id: "c1".to_string(),
            lab_id: "lab-a".to_string(),
            method: AssociationMethod::OwnerInLabMembers,
            base_confidence: dec!(0.35),
        };
        let mut computer = computer(Some("jsmith"), Some("jsmith"));
        computer.name = Some("jsmith-workstation".to_string());
        computer.function_id = Some(function_ids::RESEARCH.to_string());
        let members = LabMembersCache(HashMap::new());
        let (confidence, _) = score(&candidate, &computer, &lab(), &members);
        assert_eq!(confidence, dec!(0.50));
    }

    #[test]
    fn quality_flags_mark_low_confidence_below_040() {
        let flags = quality_flags(
            dec!(0.20),
            &computer(None, None),
            &CriteriaFlags {
                owner_is_pi: false,
                fin_owner_is_pi: false,
                owner_is_member: false,
                fin_owner_is_member: false,
                function_is_research: false,
                function_is_classroom: false,
            },
        );
        assert!(flags.low_confidence);
        assert!(flags.no_function);
    }
}
