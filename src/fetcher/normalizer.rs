//! FIPE payload normalization
//!
//! Stateless, tolerant parsing of raw API payloads into typed records.
//! Nothing here fails on bad input except where a record cannot exist at all
//! (a reference table without an identifier, a model-year value that cannot
//! be split); everything else degrades to documented defaults.

use crate::config::Dictionaries;
use crate::{ReferenceTable, VehiclePriceRecord, VehicleType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// Placeholder for labels that could not be resolved through a dictionary.
pub const UNKNOWN: &str = "unknown";

/// Placeholder for payload fields that were absent.
pub const NOT_AVAILABLE: &str = "N/A";

/// Month code used when a month name is not in the dictionary.
pub const UNKNOWN_MONTH_CODE: &str = "00";

const CURRENCY_PREFIX: &str = "R$";

/// Normalization errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// Model-year value does not split into exactly two parts on `-`
    #[error("malformed model-year value: {0:?}")]
    MalformedModelYear(String),

    /// Reference table entry is unusable
    #[error("malformed reference table entry: {0}")]
    MalformedReferenceTable(String),
}

/// Request context of a price fetch, used where the payload is silent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuery {
    /// Reference table requested
    pub table_id: i64,
    /// Vehicle type requested
    pub vehicle_type: VehicleType,
    /// Model year requested (`anoModelo`)
    pub model_year: String,
    /// Fuel code requested (`codigoTipoCombustivel`)
    pub fuel_code: String,
}

/// Parse one raw reference table entry (`{"Codigo": 7, "Mes": "janeiro/2024 "}`).
///
/// The month name is looked up case-insensitively; unknown names get the
/// month code "00". The returned month name is capitalized.
///
/// # Errors
/// Returns [`NormalizeError::MalformedReferenceTable`] when `Codigo` is missing
/// or `Mes` has no `/` separator.
pub fn parse_reference_table(raw: &Value, dictionaries: &Dictionaries) -> Result<ReferenceTable, NormalizeError> {
    let id = raw
        .get("Codigo")
        .and_then(value_as_i64)
        .ok_or_else(|| NormalizeError::MalformedReferenceTable(format!("missing Codigo in {raw}")))?;

    let mes = raw.get("Mes").and_then(Value::as_str).unwrap_or_default();
    let mut parts = mes.split('/');
    let (month, year) = match (parts.next(), parts.next()) {
        (Some(month), Some(year)) => (month.trim(), year.trim()),
        _ => {
            return Err(NormalizeError::MalformedReferenceTable(format!(
                "table {id} has unusable Mes {mes:?}"
            )))
        }
    };

    let month_code = dictionaries
        .month_code(month)
        .unwrap_or(UNKNOWN_MONTH_CODE)
        .to_string();

    Ok(ReferenceTable {
        id,
        year: year.to_string(),
        month_code,
        month_name: capitalize(month),
    })
}

/// Parse a BRL currency string such as `"R$ 1.234,56"`.
///
/// Returns zero for anything that is not a non-negative number once the
/// currency prefix and thousands separators are removed. Use
/// [`try_parse_price`] to tell a zero price from an unparsable one.
pub fn parse_price(raw: &str) -> Decimal {
    try_parse_price(raw).unwrap_or(Decimal::ZERO)
}

/// Parse a BRL currency string, returning `None` when unparsable.
pub fn try_parse_price(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix(CURRENCY_PREFIX).unwrap_or(trimmed).trim();
    let normalized = digits.replace('.', "").replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    Decimal::from_str(&normalized)
        .ok()
        .filter(|value| !value.is_sign_negative())
}

/// Parse a reference month phrase such as `"janeiro de 2024"`.
///
/// Splits on whitespace; token 0 is the month name and token 2 the year.
/// Missing tokens and unknown month names yield empty strings.
///
/// # Returns
/// `(month_code, year)`
pub fn parse_reference_month(raw: &str, dictionaries: &Dictionaries) -> (String, String) {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let month_code = tokens
        .first()
        .and_then(|month| dictionaries.month_code(month))
        .unwrap_or_default()
        .to_string();
    let year = tokens.get(2).copied().unwrap_or_default().to_string();
    (month_code, year)
}

/// Build a [`VehiclePriceRecord`] from a raw price payload.
///
/// Payload fields win; the request context fills gaps the payload leaves.
/// Unresolvable labels become [`UNKNOWN`], absent text fields [`NOT_AVAILABLE`].
///
/// # Arguments
/// * `payload` - Decoded price response
/// * `dictionaries` - Code lookup tables
/// * `query` - Parameters the price was requested with
/// * `queried_at` - Fetch timestamp recorded on the record
pub fn build_price_record(
    payload: &Value,
    dictionaries: &Dictionaries,
    query: &PriceQuery,
    queried_at: DateTime<Utc>,
) -> VehiclePriceRecord {
    let table_id = payload
        .get("CodigoTabelaReferencia")
        .and_then(value_as_i64)
        .unwrap_or(query.table_id);

    let (reference_month_code, reference_year) = payload
        .get("MesReferencia")
        .and_then(Value::as_str)
        .map(|raw| parse_reference_month(raw, dictionaries))
        .unwrap_or_default();

    let vehicle_type_code = ["CodigoTipoVeiculo", "TipoVeiculo"]
        .iter()
        .find_map(|field| payload.get(*field).and_then(value_as_string))
        .unwrap_or_else(|| query.vehicle_type.code().to_string());
    let vehicle_type_label = dictionaries
        .vehicle_type_label(&vehicle_type_code)
        .unwrap_or(UNKNOWN)
        .to_string();

    let model_year = payload
        .get("AnoModelo")
        .and_then(value_as_i64)
        .or_else(|| query.model_year.trim().parse().ok())
        .unwrap_or_default();

    let fuel_code = payload
        .get("CodigoTipoCombustivel")
        .and_then(value_as_string)
        .unwrap_or_else(|| query.fuel_code.clone());
    let fuel_label = dictionaries
        .fuel_label(&fuel_code)
        .unwrap_or(UNKNOWN)
        .to_string();

    let price = payload
        .get("Valor")
        .and_then(Value::as_str)
        .and_then(try_parse_price);

    VehiclePriceRecord {
        table_id,
        reference_year,
        reference_month_code,
        vehicle_type_label,
        fipe_code: text_field(payload, "CodigoFipe"),
        brand: text_field(payload, "Marca"),
        model: text_field(payload, "Modelo"),
        model_year,
        fuel_code,
        fuel_abbreviation: text_field(payload, "SiglaCombustivel"),
        fuel_label,
        price: price.unwrap_or(Decimal::ZERO),
        price_available: price.is_some(),
        queried_at,
    }
}

/// Format a price as BRL currency (`R$ 1.234,56`).
pub fn format_brl(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let fixed = format!("{:.2}", rounded.abs());
    let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}{CURRENCY_PREFIX} {grouped},{fraction}")
}

/// Deserialize an identifier that may arrive as a JSON string or number.
pub fn deserialize_code<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_as_string(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected string or number, got {value}")))
}

fn capitalize(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_field(payload: &Value, field: &str) -> String {
    payload
        .get(field)
        .and_then(value_as_string)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}
