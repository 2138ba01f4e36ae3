//! `casbin::Adapter` implementation for [`RuleAdapter`].
//!
//! # Purpose and responsibility
//! Lets a `casbin::Enforcer` persist its policy in a rule collection: the
//! enforcer loads through the adapter at startup and, with auto-save on, mirrors
//! every policy edit into storage.
//!
//! # Key invariants and assumptions
//! - Casbin's model ignores duplicate rules and cannot enforce a rule with no
//!   fields, so zero-arity documents are skipped when loading into it.
//! - A `casbin::Filter` becomes one selector per type tag of the section it
//!   constrains. A section whose filter values are all empty loads every rule
//!   of that section. A filter with no values at all is a full load.
use crate::adapter::RuleAdapter;
use crate::collection::RuleCollection;
use crate::errors::AdapterError;
use crate::model::{GROUPING_SECTION, POLICY_SECTION, PolicyModel};
use crate::selector::Selector;
use async_trait::async_trait;
use casbin::{Adapter, Filter, Model, Result};

struct CasbinModel<'m>(&'m mut dyn Model);

impl PolicyModel for CasbinModel<'_> {
    fn append_rule(&mut self, section: &str, ptype: &str, rule: Vec<String>) {
        if rule.is_empty() {
            tracing::warn!(section, ptype, "skipping stored rule with no fields");
            return;
        }
        self.0.add_policy(section, ptype, rule);
    }

    fn section_rules(&self, section: &str) -> Vec<(&str, &[String])> {
        let Some(assertions) = self.0.get_model().get(section) else {
            return Vec::new();
        };
        assertions
            .iter()
            .flat_map(|(ptype, assertion)| {
                assertion
                    .get_policy()
                    .iter()
                    .map(move |rule| (ptype.as_str(), rule.as_slice()))
            })
            .collect()
    }
}

fn into_casbin(err: AdapterError) -> casbin::Error {
    casbin::error::AdapterError(Box::new(err)).into()
}

/// Translate a casbin filter into selectors over the model's type tags.
///
/// Returns no selectors when the filter constrains nothing.
fn filter_selectors(model: &dyn Model, filter: &Filter<'_>) -> Vec<Selector> {
    if filter.p.iter().chain(filter.g.iter()).all(|value| value.is_empty()) {
        return Vec::new();
    }

    let mut selectors = Vec::new();
    for (section, values) in [(POLICY_SECTION, &filter.p), (GROUPING_SECTION, &filter.g)] {
        let Some(assertions) = model.get_model().get(section) else {
            continue;
        };
        let values: Vec<String> = values.iter().map(|value| value.to_string()).collect();
        let mut ptypes: Vec<&String> = assertions.keys().collect();
        ptypes.sort();
        for ptype in ptypes {
            selectors.push(Selector::field_range(ptype.as_str(), 0, &values));
        }
    }
    selectors
}

#[async_trait]
impl<C: RuleCollection> Adapter for RuleAdapter<C> {
    async fn load_policy(&mut self, m: &mut dyn Model) -> Result<()> {
        self.load(&mut CasbinModel(m)).await.map_err(into_casbin)
    }

    async fn load_filtered_policy<'a>(&mut self, m: &mut dyn Model, f: Filter<'a>) -> Result<()> {
        let selectors = filter_selectors(m, &f);
        if selectors.is_empty() {
            return self.load(&mut CasbinModel(m)).await.map_err(into_casbin);
        }
        for selector in &selectors {
            self.load_filtered(&mut CasbinModel(&mut *m), selector)
                .await
                .map_err(into_casbin)?;
        }
        Ok(())
    }

    async fn save_policy(&mut self, m: &mut dyn Model) -> Result<()> {
        self.save(&CasbinModel(m)).await.map_err(into_casbin)
    }

    async fn clear_policy(&mut self) -> Result<()> {
        RuleAdapter::clear_policy(self).await.map_err(into_casbin)
    }

    fn is_filtered(&self) -> bool {
        RuleAdapter::is_filtered(self)
    }

    async fn add_policy(&mut self, sec: &str, ptype: &str, rule: Vec<String>) -> Result<bool> {
        RuleAdapter::add_policy(self, sec, ptype, &rule)
            .await
            .map_err(into_casbin)?;
        Ok(true)
    }

    async fn add_policies(
        &mut self,
        sec: &str,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> Result<bool> {
        RuleAdapter::add_policies(self, sec, ptype, &rules)
            .await
            .map_err(into_casbin)?;
        Ok(true)
    }

    async fn remove_policy(&mut self, sec: &str, ptype: &str, rule: Vec<String>) -> Result<bool> {
        RuleAdapter::remove_policy(self, sec, ptype, &rule)
            .await
            .map_err(into_casbin)
    }

    async fn remove_policies(
        &mut self,
        sec: &str,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> Result<bool> {
        let deleted = RuleAdapter::remove_policies(self, sec, ptype, &rules)
            .await
            .map_err(into_casbin)?;
        Ok(deleted > 0)
    }

    async fn remove_filtered_policy(
        &mut self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<bool> {
        let deleted =
            RuleAdapter::remove_filtered_policy(self, sec, ptype, field_index, &field_values)
                .await
                .map_err(into_casbin)?;
        Ok(deleted > 0)
    }
}
