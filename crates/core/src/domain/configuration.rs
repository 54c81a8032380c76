use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;

use crate::catalog::CatalogIndex;
use crate::domain::catalog::{Level, Service, ServiceId, Tier};
use crate::domain::quote::Selection;
use crate::domain::step::Step;
use crate::errors::DomainError;

/// The in-progress selection owned by the wizard controller.
///
/// Mutators are crate-private so every change goes through a controller
/// transition. `level` is only ever set when it belongs to `tier`, and
/// switching to another tier drops the level and the optional services.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Configuration {
    tier: Option<Tier>,
    level: Option<Level>,
    optional_services: BTreeMap<ServiceId, Service>,
    completed_steps: BTreeSet<Step>,
    current_step: Step,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tier(&self) -> Option<&Tier> {
        self.tier.as_ref()
    }

    pub fn level(&self) -> Option<&Level> {
        self.level.as_ref()
    }

    pub fn optional_services(&self) -> impl Iterator<Item = &Service> {
        self.optional_services.values()
    }

    pub fn has_service(&self, id: &ServiceId) -> bool {
        self.optional_services.contains_key(id)
    }

    pub fn service_ids(&self) -> Vec<ServiceId> {
        self.optional_services.keys().cloned().collect()
    }

    pub fn completed_steps(&self) -> &BTreeSet<Step> {
        &self.completed_steps
    }

    pub fn is_completed(&self, step: Step) -> bool {
        self.completed_steps.contains(&step)
    }

    pub fn current_step(&self) -> Step {
        self.current_step
    }

    pub fn selection(&self) -> Selection {
        Selection {
            tier_id: self.tier.as_ref().map(|tier| tier.id.clone()),
            level_id: self.level.as_ref().map(|level| level.id.clone()),
            service_ids: self.service_ids(),
        }
    }

    /// Level price plus every selected optional service.
    pub fn total_price(&self) -> Decimal {
        let level = self.level.as_ref().map(|level| level.price).unwrap_or(Decimal::ZERO);
        level + self.optional_services.values().map(|service| service.price).sum::<Decimal>()
    }

    pub fn has_placeholders(&self) -> bool {
        self.tier.as_ref().is_some_and(Tier::is_placeholder)
            || self.level.as_ref().is_some_and(Level::is_placeholder)
            || self.optional_services.values().any(Service::is_placeholder)
    }

    /// Returns true when a previous level or service selection was dropped.
    pub(crate) fn set_tier(&mut self, tier: Tier) -> bool {
        let same_tier = self.tier.as_ref().is_some_and(|current| current.id == tier.id);
        self.tier = Some(tier);
        if same_tier {
            return false;
        }

        let had_dependents = self.level.is_some() || !self.optional_services.is_empty();
        self.level = None;
        self.optional_services.clear();
        had_dependents
    }

    pub(crate) fn set_level(&mut self, level: Level) -> Result<(), DomainError> {
        let Some(tier) = self.tier.as_ref() else {
            return Err(DomainError::LevelWithoutTier { level: level.id });
        };
        if !tier.owns(&level) {
            return Err(DomainError::LevelOutsideTier { tier: tier.id.clone(), level: level.id });
        }
        self.level = Some(level);
        Ok(())
    }

    pub(crate) fn set_services(&mut self, services: impl IntoIterator<Item = Service>) {
        self.optional_services =
            services.into_iter().map(|service| (service.id.clone(), service)).collect();
    }

    /// Returns whether the service is selected after the toggle.
    pub(crate) fn toggle_service(&mut self, service: Service) -> bool {
        if self.optional_services.remove(&service.id).is_some() {
            return false;
        }
        self.optional_services.insert(service.id.clone(), service);
        true
    }

    pub(crate) fn mark_completed(&mut self, step: Step) {
        self.completed_steps.insert(step);
    }

    pub(crate) fn set_current_step(&mut self, step: Step) {
        self.current_step = step;
    }

    /// Rebuilds a configuration from restored parts, bypassing the
    /// tier-change clearing rule. A level that does not belong to the tier
    /// is dropped.
    pub(crate) fn restore(
        tier: Option<Tier>,
        level: Option<Level>,
        services: Vec<Service>,
        current_step: Step,
    ) -> Self {
        let level = match (&tier, level) {
            (Some(tier), Some(level)) if tier.owns(&level) => Some(level),
            _ => None,
        };
        let mut configuration = Self {
            tier,
            level,
            optional_services: BTreeMap::new(),
            completed_steps: current_step.predecessors().collect(),
            current_step,
        };
        configuration.set_services(services);
        configuration
    }

    /// Clears the selection and step history. Only a discard may do this.
    pub(crate) fn clear(&mut self) {
        self.tier = None;
        self.level = None;
        self.optional_services.clear();
        self.completed_steps.clear();
    }

    /// Swaps placeholder entries for their catalog counterparts in place and
    /// returns how many were replaced. Unmatched placeholders stay.
    pub(crate) fn reconcile(&mut self, index: &CatalogIndex) -> usize {
        let mut replaced = 0;

        if let Some(tier) = self.tier.as_mut().filter(|tier| tier.is_placeholder()) {
            if let Some(found) = index.tier(&tier.id) {
                *tier = found.clone();
                replaced += 1;
            }
        }

        if let (Some(tier), Some(level)) = (self.tier.as_ref(), self.level.as_mut()) {
            if level.is_placeholder() {
                if let Some(found) = tier.level(&level.id).filter(|found| !found.is_placeholder()) {
                    *level = found.clone();
                    replaced += 1;
                }
            }
        }

        for service in self.optional_services.values_mut().filter(|s| s.is_placeholder()) {
            if let Some(found) = index.service(&service.id) {
                *service = found.clone();
                replaced += 1;
            }
        }

        replaced
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::Configuration;
    use crate::catalog::{fixtures, CatalogIndex};
    use crate::domain::catalog::{Level, LevelId, Service, ServiceId, Tier, TierId};
    use crate::domain::step::Step;
    use crate::errors::DomainError;

    fn tier(id: &str) -> Tier {
        fixtures::default_tiers()
            .into_iter()
            .find(|tier| tier.id.0 == id)
            .expect("fixture tier exists")
    }

    fn service(id: &str) -> Service {
        fixtures::default_services()
            .into_iter()
            .find(|service| service.id.0 == id)
            .expect("fixture service exists")
    }

    #[test]
    fn changing_tier_clears_level_and_services() {
        let mut configuration = Configuration::new();
        let pro = tier("pro");
        configuration.set_tier(pro.clone());
        configuration.set_level(pro.levels[1].clone()).expect("pro level");
        configuration.toggle_service(service("seo-setup"));
        configuration.toggle_service(service("copywriting"));

        let cleared = configuration.set_tier(tier("starter"));

        assert!(cleared);
        assert!(configuration.level().is_none());
        assert_eq!(configuration.optional_services().count(), 0);
        assert_eq!(configuration.tier().map(|tier| tier.id.0.as_str()), Some("starter"));
    }

    #[test]
    fn reselecting_the_same_tier_keeps_dependents() {
        let mut configuration = Configuration::new();
        let pro = tier("pro");
        configuration.set_tier(pro.clone());
        configuration.set_level(pro.levels[0].clone()).expect("pro level");

        assert!(!configuration.set_tier(pro));
        assert!(configuration.level().is_some());
    }

    #[test]
    fn level_must_belong_to_selected_tier() {
        let mut configuration = Configuration::new();
        let starter_level = tier("starter").levels[0].clone();

        let error = configuration.set_level(starter_level.clone()).expect_err("no tier yet");
        assert!(matches!(error, DomainError::LevelWithoutTier { .. }));

        configuration.set_tier(tier("pro"));
        let error = configuration.set_level(starter_level).expect_err("foreign level");
        assert!(matches!(error, DomainError::LevelOutsideTier { .. }));
    }

    #[test]
    fn toggling_keeps_services_unique() {
        let mut configuration = Configuration::new();
        assert!(configuration.toggle_service(service("seo-setup")));
        configuration.set_services(vec![service("seo-setup"), service("seo-setup")]);
        assert_eq!(configuration.service_ids(), vec![ServiceId("seo-setup".to_string())]);
        assert!(!configuration.toggle_service(service("seo-setup")));
        assert!(configuration.service_ids().is_empty());
    }

    #[test]
    fn total_price_sums_level_and_services() {
        let mut configuration = Configuration::new();
        let pro = tier("pro");
        let level = pro.levels[0].clone();
        configuration.set_tier(pro);
        configuration.set_level(level.clone()).expect("level");
        configuration.toggle_service(service("seo-setup"));

        assert_eq!(configuration.total_price(), level.price + service("seo-setup").price);
    }

    #[test]
    fn restore_marks_predecessors_completed() {
        let configuration = Configuration::restore(
            Some(Tier::placeholder(TierId("pro".to_string()))),
            Some(Level::placeholder(TierId("pro".to_string()), LevelId("pro-base".to_string()))),
            vec![Service::placeholder(ServiceId("seo-setup".to_string()))],
            Step::Quote,
        );

        assert_eq!(configuration.current_step(), Step::Quote);
        assert!(configuration.is_completed(Step::Browse));
        assert!(configuration.is_completed(Step::Optional));
        assert!(!configuration.is_completed(Step::Quote));
        assert!(configuration.has_placeholders());
        assert_eq!(configuration.total_price(), Decimal::ZERO);
    }

    #[test]
    fn reconcile_replaces_placeholders_in_place() {
        let mut configuration = Configuration::restore(
            Some(Tier::placeholder(TierId("pro".to_string()))),
            Some(Level::placeholder(TierId("pro".to_string()), LevelId("pro-standard".to_string()))),
            vec![
                Service::placeholder(ServiceId("seo-setup".to_string())),
                Service::placeholder(ServiceId("retired-service".to_string())),
            ],
            Step::Quote,
        );
        let index = CatalogIndex::new(fixtures::default_tiers(), fixtures::default_services());

        let replaced = configuration.reconcile(&index);

        assert_eq!(replaced, 3);
        assert_eq!(configuration.tier().map(|tier| tier.name.as_str()), Some("Pro"));
        assert!(configuration.level().is_some_and(|level| !level.is_placeholder()));
        let unresolved: Vec<_> = configuration
            .optional_services()
            .filter(|service| service.is_placeholder())
            .map(|service| service.id.0.clone())
            .collect();
        assert_eq!(unresolved, vec!["retired-service".to_string()]);
        assert_eq!(configuration.service_ids().len(), 2);
    }
}
