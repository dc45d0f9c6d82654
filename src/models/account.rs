use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

named_enum! {
    pub enum AssetAccountType {
        Iban => "IBAN",
        BitCoinWallet => "BitCoinWallet",
        ColoredCoinWallet => "ColoredCoinWallet",
        DigitalWallet => "DigitalWallet",
        Lykke => "Lykke",
    }
}

named_enum! {
    pub enum AssetAccountStatus {
        Open => "Open",
        Active => "Active",
        Inactive => "Inactive",
        Closed => "Closed",
        Terminated => "Terminated",
        MarginCallReached => "MarginCallReached",
        LiquidationInProgress => "LiquidationInProgress",
        Liquidated => "Liquidated",
    }
}

/// New investor asset account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestorAssetAccount {
    pub asset_account_id: String,
    pub owner_id: String,
    #[serde(rename = "type")]
    pub account_type: AssetAccountType,
    pub intermediary_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_identification_margin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_identification_reference: Option<String>,
    pub withdrawal_allowed: bool,
}

/// Mutable part of an existing asset account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestorAssetAccountBasicInfo {
    pub asset_account_id: String,
    #[serde(rename = "type")]
    pub account_type: AssetAccountType,
    pub status: AssetAccountStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_identification_margin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_identification_reference: Option<String>,
    pub withdrawal_allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositAssetAccount {
    pub asset_account_id: String,
    pub settlement_currency: String,
    /// Digits after the decimal point in `amount`
    pub precision: u32,
    pub amount: serde_json::Number,
    pub reference_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawAssetAccount {
    pub asset_account_id: String,
    pub amount: serde_json::Number,
    pub reference_account_id: String,
    pub timestamp: DateTime<Utc>,
}
