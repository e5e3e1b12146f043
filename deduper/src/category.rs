use std::fmt;

pub const MARKET_ORDERS_INGEST: &str = "marketorders.ingest";
pub const MARKET_ORDERS_DEDUPED: &str = "marketorders.deduped";
pub const GOLD_PRICES_INGEST: &str = "goldprices.ingest";
pub const GOLD_PRICES_DEDUPED: &str = "goldprices.deduped";
pub const MAP_DATA_INGEST: &str = "mapdata.ingest";
pub const MAP_DATA_DEDUPED: &str = "mapdata.deduped";

/// The independent message streams relayed by the deduper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    MarketOrders,
    GoldPrices,
    MapData,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::MarketOrders,
        Category::GoldPrices,
        Category::MapData,
    ];

    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::MarketOrders => "market_orders",
            Category::GoldPrices => "gold_prices",
            Category::MapData => "map_data",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a category is read from and where its first sightings are republished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPair {
    pub ingest: String,
    pub deduped: String,
}

impl TopicPair {
    pub fn new(ingest: impl Into<String>, deduped: impl Into<String>) -> Self {
        Self {
            ingest: ingest.into(),
            deduped: deduped.into(),
        }
    }

    pub fn defaults(category: Category) -> Self {
        match category {
            Category::MarketOrders => Self::new(MARKET_ORDERS_INGEST, MARKET_ORDERS_DEDUPED),
            Category::GoldPrices => Self::new(GOLD_PRICES_INGEST, GOLD_PRICES_DEDUPED),
            Category::MapData => Self::new(MAP_DATA_INGEST, MAP_DATA_DEDUPED),
        }
    }
}
