//! Typed catalog operations over a [`FipeApi`] transport
//!
//! Builds the exact form parameters each endpoint expects and decodes the
//! list payloads. Individual malformed list entries are skipped with a log
//! line; a failed request surfaces as an error value for the caller to handle.

use crate::config::Dictionaries;
use crate::fetcher::normalizer::parse_reference_table;
use crate::fetcher::{Endpoint, FetcherError, FetcherResult, FipeApi, FormParams};
use crate::{Brand, CatalogEntry, Model, ModelYear, ModelYearOption, ReferenceTable, VehicleType};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Value of `tipoConsulta` on price requests.
pub const QUERY_KIND: &str = "tradicional";

/// Typed client for the five API operations
#[derive(Clone)]
pub struct FipeClient {
    api: Arc<dyn FipeApi>,
    dictionaries: Arc<Dictionaries>,
}

impl FipeClient {
    /// Wrap a transport
    pub fn new(api: Arc<dyn FipeApi>, dictionaries: Arc<Dictionaries>) -> Self {
        Self { api, dictionaries }
    }

    /// List every reference table, newest first as served by the API.
    pub async fn list_reference_tables(&self) -> FetcherResult<Vec<ReferenceTable>> {
        let payload = self.api.fetch(Endpoint::ReferenceTables, &[]).await?;
        let entries = expect_array(payload, Endpoint::ReferenceTables)?;

        let mut tables = Vec::with_capacity(entries.len());
        for entry in &entries {
            match parse_reference_table(entry, &self.dictionaries) {
                Ok(table) => tables.push(table),
                Err(e) => warn!(error = %e, "Skipping malformed reference table entry"),
            }
        }
        Ok(tables)
    }

    /// List brands of a (table, vehicle type).
    pub async fn list_brands(&self, table_id: i64, vehicle_type: VehicleType) -> FetcherResult<Vec<Brand>> {
        let params = brand_params(table_id, vehicle_type);
        let payload = self.api.fetch(Endpoint::Brands, &params).await?;
        decode_entries::<CatalogEntry>(expect_array(payload, Endpoint::Brands)?, Endpoint::Brands)
    }

    /// List models of a brand. The payload wraps them as `{"Modelos": [...]}`.
    pub async fn list_models(
        &self,
        table_id: i64,
        vehicle_type: VehicleType,
        brand_id: &str,
    ) -> FetcherResult<Vec<Model>> {
        let params = model_params(table_id, vehicle_type, brand_id);
        let payload = self.api.fetch(Endpoint::Models, &params).await?;
        check_api_error(&payload)?;
        let models = match payload {
            Value::Object(mut map) => map.remove("Modelos").unwrap_or(Value::Array(Vec::new())),
            other => other,
        };
        decode_entries::<CatalogEntry>(expect_array(models, Endpoint::Models)?, Endpoint::Models)
    }

    /// List model-year options of a model.
    pub async fn list_model_years(
        &self,
        table_id: i64,
        vehicle_type: VehicleType,
        brand_id: &str,
        model_id: &str,
    ) -> FetcherResult<Vec<ModelYearOption>> {
        let params = model_year_params(table_id, vehicle_type, brand_id, model_id);
        let payload = self.api.fetch(Endpoint::ModelYears, &params).await?;
        decode_entries::<ModelYearOption>(
            expect_array(payload, Endpoint::ModelYears)?,
            Endpoint::ModelYears,
        )
    }

    /// Fetch the raw price payload for one leaf.
    ///
    /// # Errors
    /// Transport errors, or [`FetcherError::ApiError`] when the API answers
    /// with an error object instead of a price.
    pub async fn fetch_price(
        &self,
        table_id: i64,
        vehicle_type: VehicleType,
        brand_id: &str,
        model_id: &str,
        model_year: &ModelYear,
    ) -> FetcherResult<Value> {
        let params = price_params(
            table_id,
            vehicle_type,
            brand_id,
            model_id,
            model_year,
            &self.dictionaries.request_label(vehicle_type),
        );
        let payload = self.api.fetch(Endpoint::Price, &params).await?;
        check_api_error(&payload)?;
        if !payload.is_object() {
            return Err(FetcherError::ParseError(format!(
                "price payload is not an object: {payload}"
            )));
        }
        Ok(payload)
    }
}

/// Form parameters of a brand listing.
pub fn brand_params(table_id: i64, vehicle_type: VehicleType) -> FormParams {
    vec![
        ("codigoTabelaReferencia", table_id.to_string()),
        ("codigoTipoVeiculo", vehicle_type.code().to_string()),
    ]
}

/// Form parameters of a model listing.
pub fn model_params(table_id: i64, vehicle_type: VehicleType, brand_id: &str) -> FormParams {
    let mut params = brand_params(table_id, vehicle_type);
    params.push(("codigoMarca", brand_id.to_string()));
    params
}

/// Form parameters of a model-year listing.
pub fn model_year_params(table_id: i64, vehicle_type: VehicleType, brand_id: &str, model_id: &str) -> FormParams {
    let mut params = model_params(table_id, vehicle_type, brand_id);
    params.push(("codigoModelo", model_id.to_string()));
    params
}

/// Form parameters of a price lookup.
pub fn price_params(
    table_id: i64,
    vehicle_type: VehicleType,
    brand_id: &str,
    model_id: &str,
    model_year: &ModelYear,
    vehicle_type_label: &str,
) -> FormParams {
    let mut params = model_year_params(table_id, vehicle_type, brand_id, model_id);
    params.extend([
        ("codigoTipoCombustivel", model_year.fuel_code.clone()),
        ("anoModelo", model_year.year.clone()),
        ("tipoVeiculo", vehicle_type_label.to_string()),
        ("tipoConsulta", QUERY_KIND.to_string()),
    ]);
    params
}

fn check_api_error(payload: &Value) -> FetcherResult<()> {
    match payload.get("erro") {
        Some(message) => Err(FetcherError::ApiError(
            message.as_str().map(str::to_string).unwrap_or_else(|| message.to_string()),
        )),
        None => Ok(()),
    }
}

fn expect_array(payload: Value, endpoint: Endpoint) -> FetcherResult<Vec<Value>> {
    check_api_error(&payload)?;
    match payload {
        Value::Array(entries) => Ok(entries),
        other => Err(FetcherError::ParseError(format!(
            "{endpoint} payload is not a list: {other}"
        ))),
    }
}

fn decode_entries<T: DeserializeOwned>(entries: Vec<Value>, endpoint: Endpoint) -> FetcherResult<Vec<T>> {
    let total = entries.len();
    let decoded: Vec<T> = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<T>(entry.clone()) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, entry = %entry, "Skipping malformed list entry");
                None
            }
        })
        .collect();
    debug!(endpoint = %endpoint, total, kept = decoded.len(), "Decoded list payload");
    Ok(decoded)
}
