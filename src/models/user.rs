use serde::{Deserialize, Serialize};

named_enum! {
    pub enum ClientTier {
        Tier1 => "TIER_1",
        Tier2 => "TIER_2",
        Tier3 => "TIER_3",
        Tier4 => "TIER_4",
        Tier5 => "TIER_5",
    }
}

named_enum! {
    pub enum UserRole {
        SuperUser => "Snow_SuperUser",
        MarketMaker => "Snow_MarketMaker",
        Intermediary => "Snow_Intermediary",
        Investor => "Snow_Investor",
        CustomerCare => "Snow_CustomerCare",
        Credit => "Snow_Credit",
        BackOfficeTrading => "Snow_BackOfficeTrading",
        BackOfficeAdmin => "Snow_BackOfficeAdmin",
    }
}

/// Platform user bound to a default asset account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub client_tier: ClientTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_asset_account_id: Option<String>,
}
