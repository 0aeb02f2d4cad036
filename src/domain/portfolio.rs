//! Portfolio documents written by the sync job.

use serde::{Deserialize, Serialize};

/// One holdings row, fully replaced on every successful sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingRecord {
    pub market: String,
    #[serde(rename = "assetType")]
    pub asset_type: String,
    pub name: String,
    pub ticker: String,
    pub quantity: f64,
    #[serde(rename = "avgPrice")]
    pub avg_price: f64,
    pub currency: String,
    #[serde(rename = "lastPrice")]
    pub last_price: f64,
    #[serde(rename = "valueKRW")]
    pub value_krw: f64,
    #[serde(rename = "pnlKRW")]
    pub pnl_krw: f64,
    /// Parsed from the sheet but not used to filter rows. The column exists
    /// in the source data with unclear intent; keep writing it through.
    pub enabled: bool,
    pub memo: String,
    pub timestamp: String,
}

impl HoldingRecord {
    /// Document id: the ticker when present, otherwise a composite of
    /// asset type, name, currency and the row ordinal.
    pub fn document_id(&self, ordinal: usize) -> String {
        if !self.ticker.trim().is_empty() {
            return sanitize_id(self.ticker.trim());
        }
        sanitize_id(&format!(
            "{}-{}-{}-{}",
            self.asset_type, self.name, self.currency, ordinal
        ))
    }
}

/// Replace runs of characters a document path cannot carry.
fn sanitize_id(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = false;
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_dash = false;
        } else if !last_dash && !out.is_empty() {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Exchange-rate snapshot (`market/fx`), merged on success and left alone
/// otherwise so the last good value survives a failed refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxSnapshot {
    #[serde(rename = "usdKrw")]
    pub usd_krw: f64,
    #[serde(rename = "eurKrw")]
    pub eur_krw: f64,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

/// Treasury-yield snapshot (`market/rates`), same merge policy as
/// [`FxSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatesSnapshot {
    #[serde(rename = "us10y")]
    pub us_10y: f64,
    #[serde(rename = "us2y")]
    pub us_2y: f64,
    /// 10-year minus 2-year.
    pub spread: f64,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

/// Result reported by the sync job to both the HTTP trigger and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub success: bool,
    #[serde(rename = "holdingsCount")]
    pub holdings_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(ticker: &str, name: &str) -> HoldingRecord {
        HoldingRecord {
            market: "KR".into(),
            asset_type: "STOCK".into(),
            name: name.into(),
            ticker: ticker.into(),
            quantity: 1.0,
            avg_price: 0.0,
            currency: "KRW".into(),
            last_price: 0.0,
            value_krw: 0.0,
            pnl_krw: 0.0,
            enabled: true,
            memo: String::new(),
            timestamp: String::new(),
        }
    }

    #[test]
    fn ticker_wins_as_identity() {
        assert_eq!(holding("005930.KS", "삼성전자").document_id(3), "005930-ks");
    }

    #[test]
    fn composite_identity_when_ticker_missing() {
        assert_eq!(
            holding("", "Money Market Fund").document_id(2),
            "stock-money-market-fund-krw-2"
        );
    }
}
