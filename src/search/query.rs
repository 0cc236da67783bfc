//! Search query construction for churn analytics
//!
//! Two query shapes cover everything the engine needs:
//!
//! - [`ChurnEventsQuery`]: a date histogram over subscription-deactivation
//!   events within a range, with a revenue sum per bucket, paginated as a
//!   composite aggregation
//! - [`ActiveSubscribersQuery`]: the cardinality of distinct subscriptions
//!   that existed and had not yet deactivated as of a cutoff instant
//!
//! Queries are plain structs so test backends can interpret them directly;
//! [`to_query_body`](ChurnEventsQuery::to_query_body) renders the structured
//! JSON a real search backend consumes.

use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::types::{DateRange, Granularity, ProductId, ProductSet, Seller, SellerId};

/// Flag marking the original purchase record of a subscription; follow-up
/// recurring charges carry the same subscription id but not this flag.
const ORIGINAL_SUBSCRIPTION_FLAG: &str = "is_original_subscription_purchase";

/// Query for the churn-event date histogram over a range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChurnEventsQuery {
    pub seller_id: SellerId,
    pub products: ProductSet,
    pub range: DateRange,
    pub granularity: Granularity,
    /// Seller's UTC offset (`±HH:MM`), applied to the histogram and the
    /// deactivation-date range filter
    pub timezone_offset: String,
    /// Composite-aggregation page size; a shorter page ends pagination
    pub page_size: usize,
}

impl ChurnEventsQuery {
    pub fn new(
        seller: &Seller,
        products: &ProductSet,
        range: DateRange,
        granularity: Granularity,
        page_size: usize,
    ) -> Self {
        Self {
            seller_id: seller.id,
            products: products.clone(),
            range,
            granularity,
            timezone_offset: seller.timezone_offset(),
            page_size,
        }
    }

    /// Renders the structured query body for the search backend
    ///
    /// Deactivated original-subscription purchases for this seller, within
    /// the range, bucketed by deactivation date with a `revenue_lost` sum
    /// per bucket. Pagination state (`after`) is supplied per call by the
    /// backend client, not baked into the body.
    pub fn to_query_body(&self) -> Value {
        let mut filter = vec![json!({ "term": { "seller_id": self.seller_id.0 } })];
        if let Some(terms) = product_terms(&self.products) {
            filter.push(terms);
        }
        filter.push(json!({
            "range": {
                "subscription_deactivated_at": {
                    "time_zone": self.timezone_offset,
                    "gte": self.range.start().to_string(),
                    "lte": self.range.end().to_string(),
                }
            }
        }));

        json!({
            "query": {
                "bool": {
                    "must": [
                        { "exists": { "field": "subscription_deactivated_at" } },
                        { "term": { "selected_flags": ORIGINAL_SUBSCRIPTION_FLAG } },
                    ],
                    "filter": filter,
                }
            },
            "size": 0,
            "aggs": {
                "composite_agg": {
                    "composite": {
                        "size": self.page_size,
                        "sources": [{
                            "date": {
                                "date_histogram": {
                                    "time_zone": self.timezone_offset,
                                    "field": "subscription_deactivated_at",
                                    "calendar_interval": self.granularity.calendar_interval(),
                                    "format": self.granularity.date_format(),
                                }
                            }
                        }],
                    },
                    "aggs": {
                        "revenue_lost": { "sum": { "field": "price_cents" } },
                    },
                }
            },
        })
    }
}

/// Query for the distinct active-subscriber count as of a cutoff date
///
/// Active means created before the cutoff's start-of-day instant and either
/// never deactivated or deactivated at/after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSubscribersQuery {
    pub seller_id: SellerId,
    pub products: ProductSet,
    /// Period start date; the cutoff instant is this date's start of day in
    /// the seller's timezone
    pub cutoff: NaiveDate,
    pub timezone_offset: String,
}

impl ActiveSubscribersQuery {
    pub fn new(seller: &Seller, products: &ProductSet, cutoff: NaiveDate) -> Self {
        Self {
            seller_id: seller.id,
            products: products.clone(),
            cutoff,
            timezone_offset: seller.timezone_offset(),
        }
    }

    /// The cutoff's start-of-day instant with the seller's offset, RFC 3339
    pub fn cutoff_instant(&self) -> String {
        format!("{}T00:00:00{}", self.cutoff, self.timezone_offset)
    }

    /// Renders the structured query body for the search backend
    pub fn to_query_body(&self) -> Value {
        let cutoff = self.cutoff_instant();

        let mut filter = vec![json!({ "term": { "seller_id": self.seller_id.0 } })];
        if let Some(terms) = product_terms(&self.products) {
            filter.push(terms);
        }
        filter.push(json!({ "range": { "created_at": { "lt": cutoff } } }));

        json!({
            "query": {
                "bool": {
                    "must": [
                        { "exists": { "field": "subscription_id" } },
                        { "term": { "selected_flags": ORIGINAL_SUBSCRIPTION_FLAG } },
                    ],
                    "filter": filter,
                    "should": [
                        { "bool": { "must_not": { "exists": { "field": "subscription_deactivated_at" } } } },
                        { "range": { "subscription_deactivated_at": { "gte": cutoff } } },
                    ],
                    "minimum_should_match": 1,
                }
            },
            "size": 0,
            "aggs": {
                "unique_subscriptions": {
                    "cardinality": { "field": "subscription_id" }
                }
            },
        })
    }
}

/// `terms` filter over the product set, or `None` when the set is
/// unconstrained
fn product_terms(products: &ProductSet) -> Option<Value> {
    if products.is_empty() {
        return None;
    }
    let ids: Vec<u64> = products.ids().iter().map(|ProductId(id)| *id).collect();
    Some(json!({ "terms": { "product_id": ids } }))
}
