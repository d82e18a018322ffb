//! Storefront traffic profile.
//!
//! Every number that shapes the traffic lives here: funnel probabilities,
//! flow weights, the catalog bound used for fallback products, think time,
//! identity and payment details. A profile is plain data. It is built once
//! (defaults, or a JSON file) and then turned into an immutable
//! [`crate::Scenario`] by [`crate::storefront::scenario`].
//!
//! All fields have defaults, so a profile file only needs the keys it
//! changes:
//!
//! ```json
//! { "purchase_probability": 0.2, "weights": { "purchase": 10 } }
//! ```

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    identity::IdentityGenerator,
    session::ThinkTime,
};

/// How authentication-only flows are kept away from anonymous sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthGating {
    /// Not candidates for selection at all.
    #[default]
    Eligibility,
    /// Selected like any other flow, then aborted before the first request.
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowWeights {
    pub browse: u32,
    pub dashboard: u32,
    pub wishlist: u32,
    pub purchase: u32,
}

impl Default for FlowWeights {
    fn default() -> Self {
        Self {
            browse: 50,
            dashboard: 25,
            wishlist: 10,
            purchase: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentDetails {
    pub card_number: String,
    pub expiry: String,
    pub cvv: String,
    pub address: String,
}

impl Default for PaymentDetails {
    fn default() -> Self {
        Self {
            card_number: "4111111111111111".to_string(),
            expiry: "12/30".to_string(),
            cvv: "123".to_string(),
            address: "123 Main St".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorefrontProfile {
    /// Share of sessions that register and log in on arrival.
    pub register_probability: f64,
    /// Share of browse iterations that go past the landing page.
    pub browse_probability: f64,
    /// Share of purchase iterations that actually check out.
    pub purchase_probability: f64,
    /// Share of purchases followed by a review.
    pub review_probability: f64,
    /// Share of wishlist iterations that go past the landing page.
    pub wishlist_probability: f64,
    /// Product ids are assumed to live in `1..=catalog_bound`.
    pub catalog_bound: u32,
    pub weights: FlowWeights,
    pub auth_gating: AuthGating,
    /// Template for a product page, e.g. `/products/{product.id}`.
    pub product_path: String,
    pub review_templates: Vec<String>,
    pub payment: PaymentDetails,
    pub identity: IdentityGenerator,
    pub think_time_min_ms: u64,
    pub think_time_max_ms: u64,
}

impl Default for StorefrontProfile {
    fn default() -> Self {
        Self {
            register_probability: 0.25,
            browse_probability: 0.50,
            purchase_probability: 0.05,
            review_probability: 0.30,
            wishlist_probability: 0.50,
            catalog_bound: 7,
            weights: FlowWeights::default(),
            auth_gating: AuthGating::default(),
            product_path: "/product-page/{product.id}".to_string(),
            review_templates: [
                "Absolutely love this product!",
                "Pretty decent, does the job.",
                "Exceeded my expectations!",
                "Not what I expected, but okay.",
                "Could be better, but worth the price.",
                "Five stars! Will buy again.",
                "Terrible quality, do not buy!",
                "Solid purchase, highly recommend.",
            ]
            .map(String::from)
            .to_vec(),
            payment: PaymentDetails::default(),
            identity: IdentityGenerator::default(),
            think_time_min_ms: 1_000,
            think_time_max_ms: 3_000,
        }
    }
}

impl StorefrontProfile {
    pub fn from_json(json: &str) -> Result<Self> {
        let profile: Self = serde_json::from_str(json)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn think_time(&self) -> ThinkTime {
        ThinkTime::between(
            Duration::from_millis(self.think_time_min_ms),
            Duration::from_millis(self.think_time_max_ms),
        )
    }

    /// Checks what flow construction cannot see on its own.
    pub fn validate(&self) -> Result<()> {
        for (name, p) in [
            ("register_probability", self.register_probability),
            ("browse_probability", self.browse_probability),
            ("purchase_probability", self.purchase_probability),
            ("review_probability", self.review_probability),
            ("wishlist_probability", self.wishlist_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::config(format!("{name} must be within [0, 1], got {p}")));
            }
        }
        if self.catalog_bound == 0 {
            return Err(Error::config("catalog_bound must be at least 1"));
        }
        if self.review_templates.is_empty() {
            return Err(Error::config("review_templates must not be empty"));
        }
        if self.think_time_min_ms > self.think_time_max_ms {
            return Err(Error::config("think_time_min_ms exceeds think_time_max_ms"));
        }
        Ok(())
    }
}
