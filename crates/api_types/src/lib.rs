use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod webhook {
    use super::*;

    /// A monetary value as the bank sends it: ISO currency code plus integer
    /// minor units (pence). Never a float.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Amount {
        pub currency: String,
        pub minor_units: i64,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RoundUp {
        pub goal_category_uid: String,
        pub amount: Amount,
    }

    /// A single feed-item event as delivered on the webhook.
    ///
    /// The core fields are strict; anything the bank adds later lands in
    /// `extra` and is dropped at persistence time rather than rejected.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct FeedItemContent {
        pub feed_item_uid: String,
        pub category_uid: String,
        pub account_uid: String,
        pub amount: Amount,
        pub source_amount: Amount,
        pub direction: String,
        pub updated_at: DateTime<Utc>,
        pub transaction_time: DateTime<Utc>,
        pub settlement_time: DateTime<Utc>,
        pub source: String,
        #[serde(default)]
        pub source_sub_type: Option<String>,
        pub status: String,
        pub transacting_application_user_uid: String,
        pub counter_party_type: String,
        pub counter_party_uid: String,
        pub counter_party_name: String,
        #[serde(default)]
        pub counter_party_sub_entity_uid: Option<String>,
        #[serde(default)]
        pub counter_party_sub_entity_name: Option<String>,
        #[serde(default)]
        pub counter_party_sub_entity_identifier: Option<String>,
        #[serde(default)]
        pub counter_party_sub_entity_sub_identifier: Option<String>,
        #[serde(default)]
        pub exchange_rate: Option<f64>,
        #[serde(default)]
        pub total_fee_amount: Option<Amount>,
        #[serde(default)]
        pub reference: Option<String>,
        #[serde(default)]
        pub country: Option<String>,
        #[serde(default)]
        pub spending_category: Option<String>,
        #[serde(default)]
        pub user_note: Option<String>,
        #[serde(default)]
        pub round_up: Option<RoundUp>,
        pub has_attachment: bool,
        pub receipt_present: bool,
        #[serde(default)]
        pub feed_item_failure_reason: Option<String>,
        #[serde(default)]
        pub source_uid: Option<String>,
        #[serde(flatten)]
        pub extra: serde_json::Map<String, serde_json::Value>,
    }

    /// The webhook envelope.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WebhookPayload {
        pub webhook_event_uid: String,
        pub event_timestamp: DateTime<Utc>,
        pub account_holder_uid: String,
        pub content: FeedItemContent,
        #[serde(flatten)]
        pub extra: serde_json::Map<String, serde_json::Value>,
    }

    /// One entry of the structured error list returned on 422.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct FieldError {
        pub field: String,
        pub message: String,
    }
}

pub mod reports {
    use super::*;
    use rust_decimal::Decimal;

    /// Aggregated spend for one (month, category, counterparty) cell.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct SpendingRow {
        pub year_month: String,
        pub spending_category: Option<String>,
        pub counter_party_name: Option<String>,
        pub total_amount: Decimal,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct TrendPoint {
        pub year_month: String,
        pub monthly_total: Decimal,
    }

    /// Total spend at one counterparty over the selected range.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct CounterpartySpend {
        pub counter_party_name: Option<String>,
        pub total_amount: Decimal,
    }

    /// Latest balance snapshot from staging.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct BalanceView {
        pub balance: Decimal,
        pub balance_with_spaces: Decimal,
        pub received_at: Option<DateTime<Utc>>,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct ShouldRefresh {
        pub refresh: bool,
    }
}
