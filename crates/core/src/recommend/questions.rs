//! Typed questionnaire schema. Option weights live on the enum variants, so
//! an unknown question or option fails to deserialize instead of scoring zero.

use serde::{Deserialize, Serialize};

/// Highest weight any option carries.
pub const MAX_WEIGHT: u32 = 3;

pub trait Weighted {
    fn weight(&self) -> u32;
}

macro_rules! weighted_options {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $weight:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl Weighted for $name {
            fn weight(&self) -> u32 {
                match self {
                    $(Self::$variant => $weight),+
                }
            }
        }
    };
}

weighted_options!(BusinessStage {
    JustStarting => 1,
    Growing => 2,
    Established => 3,
});

weighted_options!(SiteSize {
    OnePage => 1,
    Handful => 2,
    Large => 3,
});

weighted_options!(OnlineSales {
    NotPlanned => 1,
    Secondary => 2,
    Core => 3,
});

weighted_options!(UpdateFrequency {
    Rarely => 1,
    Monthly => 2,
    Weekly => 3,
});

weighted_options!(Feature {
    ContactForm => 1,
    Gallery => 1,
    Testimonials => 1,
    Blog => 2,
    Booking => 2,
    Newsletter => 2,
    Memberships => 3,
    ProductCatalog => 3,
    Payments => 3,
});

weighted_options!(
    /// Shared by the level and service questionnaires.
    Budget {
        Minimal => 1,
        Moderate => 2,
        Significant => 3,
        Premium => 3,
    }
);

weighted_options!(Timeline {
    Flexible => 1,
    Standard => 2,
    Urgent => 3,
});

weighted_options!(DesignDepth {
    Template => 1,
    Tailored => 2,
    Bespoke => 3,
});

weighted_options!(SupportNeed {
    SelfManaged => 1,
    Occasional => 2,
    Ongoing => 3,
});

weighted_options!(Integration {
    Newsletter => 1,
    Analytics => 1,
    Crm => 2,
    Booking => 2,
    Payments => 3,
    Erp => 3,
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Visibility,
    Conversion,
    Branding,
    Maintenance,
    Performance,
    Content,
    Marketing,
}

impl Budget {
    /// How many service suggestions fit the budget; `None` is unlimited.
    pub fn service_allowance(self) -> Option<usize> {
        match self {
            Self::Minimal => Some(2),
            Self::Moderate => Some(4),
            Self::Significant | Self::Premium => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierResponses {
    pub stage: Option<BusinessStage>,
    pub site_size: Option<SiteSize>,
    pub online_sales: Option<OnlineSales>,
    pub update_frequency: Option<UpdateFrequency>,
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl TierResponses {
    pub const QUESTIONS: usize = 5;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelResponses {
    pub budget: Option<Budget>,
    pub timeline: Option<Timeline>,
    pub design_depth: Option<DesignDepth>,
    pub support: Option<SupportNeed>,
    #[serde(default)]
    pub integrations: Vec<Integration>,
}

impl LevelResponses {
    pub const QUESTIONS: usize = 5;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceResponses {
    /// Free text describing what is not working today.
    pub pain_points: Option<String>,
    #[serde(default)]
    pub priorities: Vec<Priority>,
    pub budget: Option<Budget>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Responses {
    Tier(TierResponses),
    Level(LevelResponses),
    Services(ServiceResponses),
}
