//! Per-category payload normalization, applied before fingerprinting.

use std::num::NonZeroU64;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};

use crate::category::Category;
use crate::error::DedupError;

/// Factor the game client multiplies market prices by before reporting them.
pub const UPSTREAM_PRICE_SCALE: u64 = 10_000;

/// One unit of deduplication produced from an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPayload {
    /// Bytes hashed into the fingerprint.
    pub fingerprint_payload: Bytes,
    /// Bytes republished on the deduped topic if the fingerprint is new.
    pub forward_payload: Bytes,
}

impl NormalizedPayload {
    /// A payload that is both hashed and forwarded as is.
    pub fn same(payload: Bytes) -> Self {
        Self {
            fingerprint_payload: payload.clone(),
            forward_payload: payload,
        }
    }
}

pub trait Normalizer: Send + Sync {
    /// Turn one raw message into zero or more independently deduplicated payloads.
    fn normalize(&self, raw: &Bytes) -> Result<Vec<NormalizedPayload>, DedupError>;
}

/// Gold prices and map data are deduplicated on their raw bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityNormalizer;

impl Normalizer for IdentityNormalizer {
    fn normalize(&self, raw: &Bytes) -> Result<Vec<NormalizedPayload>, DedupError> {
        Ok(vec![NormalizedPayload::same(raw.clone())])
    }
}

#[derive(Debug, Deserialize)]
struct MarketUpload {
    #[serde(rename = "Orders", default)]
    orders: Option<Vec<MarketOrder>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MarketOrder {
    /// Outer `None` when the field is absent, inner `None` for an explicit `null`.
    #[serde(
        rename = "UnitPriceSilver",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    price: Option<Option<Number>>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<Number>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Number>::deserialize(deserializer).map(Some)
}

/// Splits a market upload into single orders and undoes the upstream price scaling.
#[derive(Debug, Clone, Copy)]
pub struct MarketOrdersNormalizer {
    price_scale: NonZeroU64,
}

impl Default for MarketOrdersNormalizer {
    fn default() -> Self {
        Self::new(NonZeroU64::new(UPSTREAM_PRICE_SCALE).unwrap_or(NonZeroU64::MIN))
    }
}

impl MarketOrdersNormalizer {
    /// A scale of 1 leaves prices untouched.
    pub fn new(price_scale: NonZeroU64) -> Self {
        Self { price_scale }
    }

    fn scale_price(&self, price: &Number) -> Number {
        let scale = self.price_scale.get();
        if let Some(p) = price.as_u64() {
            return Number::from(p / scale);
        }
        if let (Some(p), Ok(scale)) = (price.as_i64(), i64::try_from(scale)) {
            return Number::from(p / scale);
        }
        price
            .as_f64()
            .and_then(|p| Number::from_f64(p / scale as f64))
            .unwrap_or_else(|| price.clone())
    }
}

impl Normalizer for MarketOrdersNormalizer {
    fn normalize(&self, raw: &Bytes) -> Result<Vec<NormalizedPayload>, DedupError> {
        let upload: MarketUpload =
            serde_json::from_slice(raw).map_err(|source| DedupError::Decode {
                category: Category::MarketOrders,
                source,
            })?;

        upload
            .orders
            .unwrap_or_default()
            .into_iter()
            .map(|mut order| {
                if let Some(Some(price)) = order.price.as_mut() {
                    *price = self.scale_price(price);
                }
                let encoded =
                    serde_json::to_vec(&order).map_err(|source| DedupError::Encode {
                        category: Category::MarketOrders,
                        source,
                    })?;
                Ok(NormalizedPayload::same(Bytes::from(encoded)))
            })
            .collect()
    }
}

/// The normalizer each category is deduplicated with.
pub fn for_category(category: Category, price_scale: NonZeroU64) -> Box<dyn Normalizer> {
    match category {
        Category::MarketOrders => Box::new(MarketOrdersNormalizer::new(price_scale)),
        Category::GoldPrices | Category::MapData => Box::new(IdentityNormalizer),
    }
}
