use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TierId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LevelId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(pub String);

/// A top-level service package such as Starter, Pro or Ecommerce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub id: TierId,
    pub name: String,
    pub description: String,
    pub levels: Vec<Level>,
}

/// A sub-variant of a tier that determines feature depth and price.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub id: LevelId,
    pub tier_id: TierId,
    pub name: String,
    pub price: Decimal,
    pub features: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub category: String,
    pub description: String,
    pub price: Decimal,
}

impl Tier {
    /// Id-only stand-in used while the catalog has not resolved the reference.
    pub fn placeholder(id: TierId) -> Self {
        Self { id, name: String::new(), description: String::new(), levels: Vec::new() }
    }

    pub fn is_placeholder(&self) -> bool {
        self.name.is_empty()
    }

    pub fn level(&self, id: &LevelId) -> Option<&Level> {
        self.levels.iter().find(|level| &level.id == id)
    }

    pub fn owns(&self, level: &Level) -> bool {
        level.tier_id == self.id
    }
}

impl Level {
    pub fn placeholder(tier_id: TierId, id: LevelId) -> Self {
        Self { id, tier_id, name: String::new(), price: Decimal::ZERO, features: Vec::new() }
    }

    pub fn is_placeholder(&self) -> bool {
        self.name.is_empty()
    }
}

impl Service {
    pub fn placeholder(id: ServiceId) -> Self {
        Self {
            id,
            name: String::new(),
            category: String::new(),
            description: String::new(),
            price: Decimal::ZERO,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{Level, LevelId, Service, ServiceId, Tier, TierId};

    #[test]
    fn placeholders_carry_only_the_id() {
        let service = Service::placeholder(ServiceId("seo-setup".to_string()));
        assert!(service.is_placeholder());
        assert_eq!(service.price, Decimal::ZERO);

        let tier = Tier::placeholder(TierId("pro".to_string()));
        assert!(tier.is_placeholder());
        assert!(tier.levels.is_empty());
    }

    #[test]
    fn tier_owns_only_its_levels() {
        let tier = Tier {
            id: TierId("pro".to_string()),
            name: "Pro".to_string(),
            description: String::new(),
            levels: vec![Level {
                id: LevelId("pro-base".to_string()),
                tier_id: TierId("pro".to_string()),
                name: "Base".to_string(),
                price: Decimal::new(2_400_00, 2),
                features: Vec::new(),
            }],
        };
        let foreign = Level::placeholder(TierId("starter".to_string()), LevelId("x".to_string()));

        assert!(tier.level(&LevelId("pro-base".to_string())).is_some());
        assert!(tier.owns(&tier.levels[0]));
        assert!(!tier.owns(&foreign));
    }
}
