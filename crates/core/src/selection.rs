//! Groups the optional-service catalog by category for the Optional step.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::{Service, ServiceId};

/// One category's services, split by selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub category: String,
    pub open: bool,
    pub selected: Vec<Service>,
    pub unselected: Vec<Service>,
    pub subtotal: Decimal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionTotals {
    pub selected_count: usize,
    pub total_price: Decimal,
}

/// Selection keyed by service id. Category groups, counts and totals are
/// derived from the one map, so they cannot drift apart.
#[derive(Clone, Debug, Default)]
pub struct ServiceSelection {
    /// Catalog order, one entry per id.
    services: Vec<Service>,
    selected: BTreeMap<ServiceId, bool>,
    categories: Vec<String>,
    open: BTreeSet<String>,
}

impl ServiceSelection {
    /// Categories keep the order in which the catalog first lists them.
    /// Ids that are not in the catalog are ignored.
    pub fn new(
        services: impl IntoIterator<Item = Service>,
        selected: impl IntoIterator<Item = ServiceId>,
    ) -> Self {
        let mut selection = Self::default();
        for service in services {
            if selection.selected.contains_key(&service.id) {
                continue;
            }
            if !selection.categories.contains(&service.category) {
                selection.categories.push(service.category.clone());
            }
            selection.selected.insert(service.id.clone(), false);
            selection.services.push(service);
        }

        for id in selected {
            if let Some(flag) = selection.selected.get_mut(&id) {
                *flag = true;
            }
        }
        selection
    }

    pub fn with_open_categories<S>(mut self, open: impl IntoIterator<Item = S>) -> Self
    where
        S: AsRef<str>,
    {
        for category in open {
            let category = category.as_ref();
            if self.has_category(category) {
                self.open.insert(category.to_string());
            }
        }
        self
    }

    pub fn groups(&self) -> Vec<CategoryGroup> {
        self.categories.iter().map(|category| self.view(category)).collect()
    }

    pub fn group(&self, category: &str) -> Option<CategoryGroup> {
        self.has_category(category).then(|| self.view(category))
    }

    /// Flips one service and returns whether it is selected afterwards, or
    /// `None` when the service is not offered.
    pub fn toggle(&mut self, id: &ServiceId) -> Option<bool> {
        let flag = self.selected.get_mut(id)?;
        *flag = !*flag;
        Some(*flag)
    }

    pub fn is_selected(&self, id: &ServiceId) -> bool {
        self.selected.get(id).copied().unwrap_or(false)
    }

    /// Opens or closes a category panel; returns the new state.
    pub fn toggle_category(&mut self, category: &str) -> Option<bool> {
        if !self.has_category(category) {
            return None;
        }
        if self.open.remove(category) {
            return Some(false);
        }
        self.open.insert(category.to_string());
        Some(true)
    }

    pub fn selected_services(&self) -> Vec<Service> {
        self.categories
            .iter()
            .flat_map(|category| self.in_category(category))
            .filter(|service| self.is_selected(&service.id))
            .cloned()
            .collect()
    }

    pub fn selected_count(&self) -> usize {
        self.selected.values().filter(|selected| **selected).count()
    }

    pub fn total_price(&self) -> Decimal {
        self.services
            .iter()
            .filter(|service| self.is_selected(&service.id))
            .map(|service| service.price)
            .sum()
    }

    pub fn totals(&self) -> SelectionTotals {
        SelectionTotals { selected_count: self.selected_count(), total_price: self.total_price() }
    }

    fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|known| known == category)
    }

    fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Service> + 'a {
        self.services.iter().filter(move |service| service.category == category)
    }

    fn view(&self, category: &str) -> CategoryGroup {
        let (selected, unselected): (Vec<Service>, Vec<Service>) =
            self.in_category(category).cloned().partition(|service| self.is_selected(&service.id));
        let subtotal = selected.iter().map(|service| service.price).sum();
        CategoryGroup {
            category: category.to_string(),
            open: self.open.contains(category),
            selected,
            unselected,
            subtotal,
        }
    }
}
