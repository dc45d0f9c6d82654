use chrono::{DateTime, NaiveDateTime, Utc};

use crate::commands::CommandContext;
use crate::error::{AppError, AppResult};
use crate::models::{
    DepositAssetAccount, InvestorAssetAccount, InvestorAssetAccountBasicInfo, WithdrawAssetAccount,
};

/// Console timestamp format, read as UTC
const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M";

/// Digits an amount may carry and still be sent as an exact JSON number
const MAX_SIGNIFICANT_DIGITS: usize = 15;

/// Decimal places a withdrawal may carry, trailing zeros aside
const WITHDRAWAL_DECIMAL_PLACES: usize = 2;

/// Parse a positive decimal amount and count its fractional digits
pub fn parse_amount(value: &str) -> AppResult<(serde_json::Number, u32)> {
    let value = value.trim();
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));

    if whole.starts_with('-') {
        return Err(AppError::InvalidArgument(format!(
            "Amount must be positive, got `{}`",
            value
        )));
    }

    let well_formed = !whole.is_empty()
        && whole.chars().all(|c| c.is_ascii_digit())
        && fraction.chars().all(|c| c.is_ascii_digit());
    if !well_formed {
        return Err(AppError::InvalidArgument(format!(
            "`{}` is not a decimal amount",
            value
        )));
    }

    let significant = format!("{}{}", whole, fraction);
    let significant = significant.trim_start_matches('0').trim_end_matches('0');
    if significant.is_empty() {
        return Err(AppError::InvalidArgument(format!(
            "Amount must be positive, got `{}`",
            value
        )));
    }
    if significant.len() > MAX_SIGNIFICANT_DIGITS {
        return Err(AppError::InvalidArgument(format!(
            "`{}` has more than {} significant digits",
            value, MAX_SIGNIFICANT_DIGITS
        )));
    }

    let normalized = if fraction.is_empty() { whole } else { value };
    let number = normalized
        .parse::<serde_json::Number>()
        .map_err(|e| AppError::InvalidArgument(format!("`{}`: {}", value, e)))?;
    Ok((number, fraction.len() as u32))
}

/// RFC 3339, or `MM/dd/yyyy HH:mm` in UTC
pub fn parse_timestamp(value: &str) -> AppResult<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| {
            AppError::InvalidArgument(format!(
                "`{}` is neither RFC 3339 nor MM/dd/yyyy HH:mm",
                value
            ))
        })
}

fn required(value: &str, message: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidArgument(message.to_string()));
    }
    Ok(())
}

pub fn deposit_request(
    asset_account_id: String,
    reference_id: String,
    amount: &str,
    settlement_currency: String,
    reference_text: Option<String>,
) -> AppResult<DepositAssetAccount> {
    required(&asset_account_id, "Cannot deposit without an account id")?;
    required(&reference_id, "Cannot deposit without a reference id")?;
    required(&settlement_currency, "Cannot deposit without a settlement currency")?;
    let (amount, precision) = parse_amount(amount)?;

    Ok(DepositAssetAccount {
        asset_account_id,
        settlement_currency,
        precision,
        amount,
        reference_id,
        reference_text: reference_text.filter(|t| !t.trim().is_empty()),
    })
}

pub fn withdraw_request(
    asset_account_id: String,
    amount: &str,
    reference_account_id: String,
    timestamp: Option<&str>,
) -> AppResult<WithdrawAssetAccount> {
    required(&asset_account_id, "Cannot withdraw without an account id")?;
    required(&reference_account_id, "Cannot withdraw without a reference account")?;
    let places = amount
        .trim()
        .split_once('.')
        .map_or(0, |(_, fraction)| fraction.trim_end_matches('0').len());
    if places > WITHDRAWAL_DECIMAL_PLACES {
        return Err(AppError::InvalidArgument(format!(
            "Maximum two decimal places are allowed in withdrawal amount, got `{}`",
            amount.trim()
        )));
    }
    let (amount, _) = parse_amount(amount)?;
    let timestamp = match timestamp.filter(|t| !t.trim().is_empty()) {
        Some(value) => parse_timestamp(value)?,
        None => Utc::now(),
    };

    Ok(WithdrawAssetAccount {
        asset_account_id,
        amount,
        reference_account_id,
        timestamp,
    })
}

pub async fn add(ctx: &CommandContext, account: InvestorAssetAccount) -> AppResult<()> {
    required(&account.asset_account_id, "Cannot create an account without an account id")?;
    required(&account.owner_id, "Cannot create an account without an owner user id")?;
    required(
        &account.intermediary_id,
        "Cannot create an account without an intermediary account id",
    )?;
    ctx.verbose("Asset account", &account);

    ctx.asset_accounts.add_asset_account(&account).await?;
    println!("Asset account {} created", account.asset_account_id);
    Ok(())
}

pub async fn modify(ctx: &CommandContext, info: InvestorAssetAccountBasicInfo) -> AppResult<()> {
    required(&info.asset_account_id, "Cannot modify an account without an account id")?;
    ctx.verbose("Asset account", &info);

    ctx.asset_accounts.update_asset_account(&info).await?;
    println!("Asset account {} updated", info.asset_account_id);
    Ok(())
}

pub async fn close(ctx: &CommandContext, asset_account_id: &str) -> AppResult<()> {
    required(asset_account_id, "Cannot close an account without an account id")?;

    ctx.asset_accounts.close_asset_account(asset_account_id).await?;
    println!("Asset account {} closed", asset_account_id);
    Ok(())
}

pub async fn terminate(ctx: &CommandContext, asset_account_id: &str) -> AppResult<()> {
    required(asset_account_id, "Cannot terminate an account without an account id")?;

    ctx.asset_accounts.terminate_asset_account(asset_account_id).await?;
    println!("Asset account {} terminated", asset_account_id);
    Ok(())
}

pub async fn deposit(ctx: &CommandContext, deposit: DepositAssetAccount) -> AppResult<()> {
    ctx.verbose("Deposit", &deposit);

    ctx.asset_accounts.deposit(&deposit).await?;
    println!(
        "Deposited {} {} to {}",
        deposit.amount, deposit.settlement_currency, deposit.asset_account_id
    );
    Ok(())
}

pub async fn withdraw(ctx: &CommandContext, withdraw: WithdrawAssetAccount) -> AppResult<()> {
    ctx.verbose("Withdrawal", &withdraw);

    ctx.asset_accounts.withdraw(&withdraw).await?;
    println!(
        "Withdrew {} from {} to {}",
        withdraw.amount, withdraw.asset_account_id, withdraw.reference_account_id
    );
    Ok(())
}
