//! Payout CSV parsing.
//!
//! Expected columns: `recipientAddress, destinationChainId, preferredToken, amount`.
//! Invalid rows are collected instead of aborting the parse.

use std::str::FromStr;

use alloy_primitives::U256;
use serde::Serialize;

use crate::core::planner::AMOUNT_DECIMALS;

/// One validated payout row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRow {
    pub recipient_address: String,
    pub destination_chain_id: u64,
    /// Upper-cased token symbol
    pub preferred_token: String,
    /// Base units
    #[serde(with = "crate::domain::item::decimal_u256")]
    pub amount: U256,
}

/// A rejected row and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// 1-based line number in the input
    pub row: u64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedCsv {
    pub rows: Vec<PayoutRow>,
    pub errors: Vec<RowError>,
}

impl ParsedCsv {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// `0x` followed by exactly 40 hex digits
pub fn is_valid_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .map(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

/// Convert a decimal token amount to base units at `decimals` scale, exactly
pub fn parse_token_amount(raw: &str, decimals: u32) -> Result<U256, String> {
    let (whole, fraction) = match raw.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (raw, ""),
    };

    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(format!("Invalid amount '{}'", raw));
    }
    if fraction.len() > decimals as usize {
        return Err(format!(
            "Amount '{}' has more than {} decimal places",
            raw, decimals
        ));
    }

    let digits = format!("{}{:0<width$}", whole, fraction, width = decimals as usize);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str(digits).map_err(|_| format!("Amount '{}' is too large", raw))
}

fn parse_row(fields: &csv::StringRecord) -> Result<PayoutRow, String> {
    if fields.len() < 4 {
        return Err(format!("Expected 4 columns, found {}", fields.len()));
    }

    let address = &fields[0];
    if !is_valid_address(address) {
        return Err(format!("Invalid address '{}'", address));
    }

    let chain_id = fields[1]
        .parse::<u64>()
        .map_err(|_| format!("Invalid chain id '{}'", &fields[1]))?;

    let token = fields[2].to_ascii_uppercase();
    if token.is_empty() {
        return Err("Missing token".to_string());
    }

    let amount = parse_token_amount(&fields[3], AMOUNT_DECIMALS)?;

    Ok(PayoutRow {
        recipient_address: address.to_string(),
        destination_chain_id: chain_id,
        preferred_token: token,
        amount,
    })
}

/// Parse payout CSV text
pub fn parse_payout_csv(text: &str) -> ParsedCsv {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut parsed = ParsedCsv::default();

    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                let row = e.position().map(|p| p.line()).unwrap_or(index as u64 + 1);
                parsed.errors.push(RowError {
                    row,
                    message: e.to_string(),
                });
                continue;
            }
        };

        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        // Header row
        if index == 0 && record.iter().any(|f| f.to_ascii_lowercase().contains("address")) {
            continue;
        }

        let row = record.position().map(|p| p.line()).unwrap_or(index as u64 + 1);
        match parse_row(&record) {
            Ok(payout) => parsed.rows.push(payout),
            Err(message) => parsed.errors.push(RowError { row, message }),
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "0x1111111111111111111111111111111111111111";

    #[test]
    fn test_parse_token_amount() {
        assert_eq!(parse_token_amount("100", 6).unwrap(), U256::from(100_000_000u64));
        assert_eq!(parse_token_amount("100.5", 6).unwrap(), U256::from(100_500_000u64));
        assert_eq!(parse_token_amount("0.000001", 6).unwrap(), U256::from(1u64));
        assert_eq!(parse_token_amount(".5", 6).unwrap(), U256::from(500_000u64));
        assert_eq!(parse_token_amount("0", 6).unwrap(), U256::ZERO);

        assert!(parse_token_amount("1.0000001", 6).is_err());
        assert!(parse_token_amount("-5", 6).is_err());
        assert!(parse_token_amount("1e6", 6).is_err());
        assert!(parse_token_amount("", 6).is_err());
        assert!(parse_token_amount(".", 6).is_err());
    }

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address(ALICE));
        assert!(is_valid_address("0xAbCdEf0123456789abcdef0123456789ABCDEF01"));
        assert!(!is_valid_address("1111111111111111111111111111111111111111"));
        assert!(!is_valid_address("0x111"));
        assert!(!is_valid_address("0xZZ11111111111111111111111111111111111111"));
    }

    #[test]
    fn test_parse_with_header() {
        let text = format!(
            "recipientAddress,destinationChainId,preferredToken,amount\n{},42161,usdc,250.75\n\n{},137,USDC,10\n",
            ALICE, ALICE
        );
        let parsed = parse_payout_csv(&text);

        assert!(parsed.is_clean());
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].preferred_token, "USDC");
        assert_eq!(parsed.rows[0].amount, U256::from(250_750_000u64));
        assert_eq!(parsed.rows[1].destination_chain_id, 137);
    }

    #[test]
    fn test_parse_without_header() {
        let parsed = parse_payout_csv(&format!("{}, 8453, USDC, 1\n", ALICE));
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].destination_chain_id, 8453);
    }

    #[test]
    fn test_invalid_rows_are_collected() {
        let text = format!(
            "address,chain,token,amount\n0xbad,42161,USDC,1\n{},arb,USDC,1\n{},42161,USDC\n{},42161,USDC,5\n",
            ALICE, ALICE, ALICE
        );
        let parsed = parse_payout_csv(&text);

        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.errors.len(), 3);
        assert_eq!(parsed.errors[0].row, 2);
        assert!(parsed.errors[0].message.contains("Invalid address"));
        assert!(parsed.errors[1].message.contains("chain id"));
        assert!(parsed.errors[2].message.contains("Expected 4 columns"));
    }
}
