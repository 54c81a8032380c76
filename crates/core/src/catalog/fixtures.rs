use rust_decimal::Decimal;

use crate::domain::catalog::{Level, LevelId, Service, ServiceId, Tier, TierId};

const TIERS: &[(&str, &str, &str)] = &[
    ("starter", "Starter", "A focused brochure site for getting online quickly."),
    ("pro", "Pro", "A multi-page marketing site with room to grow."),
    ("ecommerce", "Ecommerce", "A storefront with catalog, checkout and integrations."),
];

/// Level prices per tier in whole currency units: base, standard, premium.
const LEVEL_PRICES: &[(&str, [i64; 3])] = &[
    ("starter", [1_200, 1_800, 2_600]),
    ("pro", [2_400, 3_600, 5_200]),
    ("ecommerce", [4_200, 6_200, 8_800]),
];

const LEVELS: [(&str, &str, &[&str]); 3] = [
    ("base", "Base", &["Template design", "Up to 5 pages", "Contact form"]),
    ("standard", "Standard", &["Tailored design", "Up to 12 pages", "Blog", "Basic SEO"]),
    ("premium", "Premium", &[
        "Bespoke design",
        "Unlimited pages",
        "Priority support",
        "Advanced integrations",
    ]),
];

const SERVICES: &[(&str, &str, &str, &str, i64)] = &[
    ("seo-setup", "SEO Setup", "Marketing", "Keyword research and on-page optimisation.", 450),
    ("google-business-profile", "Google Business Profile", "Marketing", "Profile setup and verification.", 150),
    ("email-marketing", "Email Marketing", "Marketing", "Newsletter templates and list setup.", 350),
    ("social-media-kit", "Social Media Kit", "Marketing", "Branded post and cover templates.", 300),
    ("copywriting", "Copywriting", "Content", "Conversion-focused page copy.", 600),
    ("photography", "Photography", "Content", "Half-day product or team shoot.", 750),
    ("brand-identity", "Brand Identity", "Branding", "Palette, typography and usage guide.", 1_200),
    ("logo-design", "Logo Design", "Branding", "Three concepts and two revision rounds.", 500),
    ("analytics-setup", "Analytics Setup", "Technical", "Tracking plan, goals and dashboards.", 250),
    ("performance-optimization", "Performance Optimization", "Technical", "Core Web Vitals tuning.", 400),
    ("managed-hosting", "Managed Hosting", "Technical", "A year of monitored hosting.", 240),
    ("care-plan", "Care Plan", "Support", "Monthly updates, backups and security checks.", 480),
    ("payment-gateway", "Payment Gateway", "Commerce", "Payment provider integration.", 300),
    ("product-import", "Product Import", "Commerce", "Bulk import of up to 500 products.", 650),
];

const AVAILABILITY: &[(&str, &[&str])] =
    &[("payment-gateway", &["pro", "ecommerce"]), ("product-import", &["ecommerce"])];

pub fn default_tiers() -> Vec<Tier> {
    TIERS
        .iter()
        .map(|(id, name, description)| {
            let prices = LEVEL_PRICES
                .iter()
                .find(|(tier, _)| tier == id)
                .map(|(_, prices)| *prices)
                .unwrap_or_default();
            let levels = LEVELS
                .iter()
                .zip(prices)
                .map(|((slug, level_name, features), price)| Level {
                    id: LevelId(format!("{id}-{slug}")),
                    tier_id: TierId((*id).to_string()),
                    name: (*level_name).to_string(),
                    price: Decimal::from(price),
                    features: features.iter().map(|feature| (*feature).to_string()).collect(),
                })
                .collect();
            Tier {
                id: TierId((*id).to_string()),
                name: (*name).to_string(),
                description: (*description).to_string(),
                levels,
            }
        })
        .collect()
}

pub fn default_services() -> Vec<Service> {
    SERVICES
        .iter()
        .map(|(id, name, category, description, price)| Service {
            id: ServiceId((*id).to_string()),
            name: (*name).to_string(),
            category: (*category).to_string(),
            description: (*description).to_string(),
            price: Decimal::from(*price),
        })
        .collect()
}

pub fn default_availability() -> Vec<(ServiceId, Vec<TierId>)> {
    AVAILABILITY
        .iter()
        .map(|(service, tiers)| {
            (
                ServiceId((*service).to_string()),
                tiers.iter().map(|tier| TierId((*tier).to_string())).collect(),
            )
        })
        .collect()
}
