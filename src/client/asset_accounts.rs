use reqwest::Method;

use crate::client::service::ServiceClient;
use crate::error::AppResult;
use crate::models::{
    DepositAssetAccount, InvestorAssetAccount, InvestorAssetAccountBasicInfo, WithdrawAssetAccount,
};

const API: &str = "api";
const RESOURCE: &str = "assetAccount";

/// Asset account operations exposed by the gateway
#[derive(Clone)]
pub struct AssetAccountsClient {
    api: ServiceClient,
}

impl AssetAccountsClient {
    pub fn new(api: ServiceClient) -> Self {
        Self { api }
    }

    /// `POST /api/assetAccount/investor`
    pub async fn add_asset_account(&self, account: &InvestorAssetAccount) -> AppResult<()> {
        self.api
            .call::<_, serde_json::Value>(Method::POST, &[API, RESOURCE, "investor"], Some(account))
            .await?;
        Ok(())
    }

    /// `POST /api/assetAccount/investor/{id}`
    pub async fn update_asset_account(&self, info: &InvestorAssetAccountBasicInfo) -> AppResult<()> {
        self.api
            .call::<_, serde_json::Value>(
                Method::POST,
                &[API, RESOURCE, "investor", info.asset_account_id.as_str()],
                Some(info),
            )
            .await?;
        Ok(())
    }

    /// `PATCH /api/assetAccount/{id}/close`
    pub async fn close_asset_account(&self, asset_account_id: &str) -> AppResult<()> {
        self.api
            .call::<(), serde_json::Value>(
                Method::PATCH,
                &[API, RESOURCE, asset_account_id, "close"],
                None,
            )
            .await?;
        Ok(())
    }

    /// `DELETE /api/assetAccount/{id}`
    pub async fn terminate_asset_account(&self, asset_account_id: &str) -> AppResult<()> {
        self.api
            .call::<(), serde_json::Value>(Method::DELETE, &[API, RESOURCE, asset_account_id], None)
            .await?;
        Ok(())
    }

    /// `POST /api/assetAccount/{id}/deposit`
    pub async fn deposit(&self, deposit: &DepositAssetAccount) -> AppResult<()> {
        self.api
            .call::<_, serde_json::Value>(
                Method::POST,
                &[API, RESOURCE, deposit.asset_account_id.as_str(), "deposit"],
                Some(deposit),
            )
            .await?;
        Ok(())
    }

    /// `POST /api/assetAccount/{id}/withdraw`
    pub async fn withdraw(&self, withdraw: &WithdrawAssetAccount) -> AppResult<()> {
        self.api
            .call::<_, serde_json::Value>(
                Method::POST,
                &[API, RESOURCE, withdraw.asset_account_id.as_str(), "withdraw"],
                Some(withdraw),
            )
            .await?;
        Ok(())
    }
}
