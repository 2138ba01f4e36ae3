//! In-memory rule model seam.
//!
//! The enforcement engine owns the model; the adapter only appends decoded
//! rules to it and reads rules back out of it. [`PolicyModel`] is that narrow
//! surface. [`RuleModel`] is a plain implementation that keeps rules in
//! storage order without deduplication.
use std::collections::BTreeMap;

/// Section holding policy rules (`p`, `p2`, ...).
pub const POLICY_SECTION: &str = "p";
/// Section holding grouping/role rules (`g`, `g2`, ...).
pub const GROUPING_SECTION: &str = "g";
/// Sections persisted by a full save.
pub const PERSISTED_SECTIONS: [&str; 2] = [POLICY_SECTION, GROUPING_SECTION];

pub trait PolicyModel: Send + Sync {
    /// Append `rule` to `section`/`ptype`.
    fn append_rule(&mut self, section: &str, ptype: &str, rule: Vec<String>);

    /// Every rule in `section` as `(ptype, fields)` pairs.
    fn section_rules(&self, section: &str) -> Vec<(&str, &[String])>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleModel {
    sections: BTreeMap<String, BTreeMap<String, Vec<Vec<String>>>>,
}

impl RuleModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules stored under `section`/`ptype`, in append order.
    pub fn rules(&self, section: &str, ptype: &str) -> &[Vec<String>] {
        self.sections
            .get(section)
            .and_then(|types| types.get(ptype))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.sections
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.sections.clear();
    }
}

impl PolicyModel for RuleModel {
    fn append_rule(&mut self, section: &str, ptype: &str, rule: Vec<String>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .entry(ptype.to_string())
            .or_default()
            .push(rule);
    }

    fn section_rules(&self, section: &str) -> Vec<(&str, &[String])> {
        let Some(types) = self.sections.get(section) else {
            return Vec::new();
        };
        types
            .iter()
            .flat_map(|(ptype, rules)| {
                rules
                    .iter()
                    .map(move |rule| (ptype.as_str(), rule.as_slice()))
            })
            .collect()
    }
}
