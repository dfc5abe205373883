//! Shared test doubles: an in-memory FIPE API and a recording sink

#![allow(dead_code)]

use async_trait::async_trait;
use fipe_crawler::config::Dictionaries;
use fipe_crawler::crawler::{CrawlEngine, EventSink, LogLevel, Stage, TablePhase};
use fipe_crawler::fetcher::{Endpoint, FetcherError, FetcherResult, FipeApi};
use fipe_crawler::resume::CheckpointStore;
use fipe_crawler::VehiclePriceRecord;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// One recorded request
#[derive(Debug, Clone)]
pub struct Call {
    pub endpoint: Endpoint,
    pub params: Vec<(&'static str, String)>,
}

impl Call {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// `model-anoModelo-fuel` of a price call
    pub fn leaf(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.param("codigoTabelaReferencia").unwrap_or_default(),
            self.param("codigoModelo").unwrap_or_default(),
            self.param("anoModelo").unwrap_or_default(),
            self.param("codigoTipoCombustivel").unwrap_or_default()
        )
    }
}

/// In-memory catalog served for every table and vehicle type
pub struct FakeFipeApi {
    tables: Vec<Value>,
    brands: Vec<Value>,
    models: Vec<Value>,
    years: Vec<Value>,
    failing_years: Mutex<HashSet<String>>,
    failing_endpoints: Mutex<HashSet<Endpoint>>,
    price_delay: Option<Duration>,
    hang_after: Option<usize>,
    pub hang_reached: Arc<Notify>,
    calls: Mutex<Vec<Call>>,
    price_started: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Default for FakeFipeApi {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeFipeApi {
    /// One table, one brand, one model, two model years
    pub fn new() -> Self {
        Self {
            tables: vec![json!({"Codigo": 301, "Mes": "janeiro/2024 "})],
            brands: vec![json!({"Label": "Acura", "Value": "1"})],
            models: vec![json!({"Label": "Integra GS 1.8", "Value": 10})],
            years: vec![
                json!({"Label": "1992 Gasolina", "Value": "1992-1"}),
                json!({"Label": "1991 Gasolina", "Value": "1991-1"}),
            ],
            failing_years: Mutex::new(HashSet::new()),
            failing_endpoints: Mutex::new(HashSet::new()),
            price_delay: None,
            hang_after: None,
            hang_reached: Arc::new(Notify::new()),
            calls: Mutex::new(Vec::new()),
            price_started: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Tables as `(id, "mes/ano")`, newest first
    pub fn with_tables(mut self, tables: &[(i64, &str)]) -> Self {
        self.tables = tables
            .iter()
            .map(|(id, mes)| json!({"Codigo": id, "Mes": format!("{mes} ")}))
            .collect();
        self
    }

    pub fn with_brands(mut self, brands: &[(&str, &str)]) -> Self {
        self.brands = brands
            .iter()
            .map(|(value, label)| json!({"Label": label, "Value": value}))
            .collect();
        self
    }

    pub fn with_models(mut self, models: &[(i64, &str)]) -> Self {
        self.models = models
            .iter()
            .map(|(value, label)| json!({"Label": label, "Value": value}))
            .collect();
        self
    }

    pub fn with_years(mut self, years: &[&str]) -> Self {
        self.years = years
            .iter()
            .map(|value| json!({"Label": format!("{value} label"), "Value": value}))
            .collect();
        self
    }

    pub fn with_price_delay(mut self, delay: Duration) -> Self {
        self.price_delay = Some(delay);
        self
    }

    /// Price calls after the first `n` never complete
    pub fn hang_after(mut self, n: usize) -> Self {
        self.hang_after = Some(n);
        self
    }

    /// Price lookups for this model-year value fail until healed
    pub fn fail_year(&self, value: &str) {
        self.failing_years.lock().unwrap().insert(value.to_string());
    }

    pub fn heal(&self) {
        self.failing_years.lock().unwrap().clear();
        self.failing_endpoints.lock().unwrap().clear();
    }

    pub fn fail_endpoint(&self, endpoint: Endpoint) {
        self.failing_endpoints.lock().unwrap().insert(endpoint);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, endpoint: Endpoint) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.endpoint == endpoint)
            .collect()
    }

    pub fn price_calls(&self) -> Vec<Call> {
        self.calls_to(Endpoint::Price)
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn price_payload(params: &[(&'static str, String)]) -> Value {
        let get = |name: &str| {
            params
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.clone())
                .unwrap_or_default()
        };
        let brand = get("codigoMarca");
        let model = get("codigoModelo");
        json!({
            "Valor": "R$ 10.000,00",
            "Marca": format!("brand-{brand}"),
            "Modelo": format!("model-{model}"),
            "AnoModelo": get("anoModelo").parse::<i64>().unwrap_or_default(),
            "Combustivel": "Gasolina",
            "CodigoFipe": format!("{brand}{model}-1"),
            "MesReferencia": "janeiro de 2024 ",
            "Autenticacao": "abc",
            "TipoVeiculo": get("codigoTipoVeiculo").parse::<i64>().unwrap_or_default(),
            "SiglaCombustivel": "G",
            "DataConsulta": "segunda-feira, 15 de janeiro de 2024 10:00",
            "CodigoTabelaReferencia": get("codigoTabelaReferencia").parse::<i64>().unwrap_or_default(),
        })
    }

    async fn price(&self, params: &[(&'static str, String)]) -> FetcherResult<Value> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let started = self.price_started.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.hang_after {
            if started >= limit {
                self.hang_reached.notify_one();
                std::future::pending::<()>().await;
            }
        }

        if let Some(delay) = self.price_delay {
            tokio::time::sleep(delay).await;
        }

        let value = format!(
            "{}-{}",
            params
                .iter()
                .find(|(key, _)| *key == "anoModelo")
                .map(|(_, v)| v.as_str())
                .unwrap_or_default(),
            params
                .iter()
                .find(|(key, _)| *key == "codigoTipoCombustivel")
                .map(|(_, v)| v.as_str())
                .unwrap_or_default()
        );
        if self.failing_years.lock().unwrap().contains(&value) {
            return Err(FetcherError::RetriesExhausted {
                endpoint: Endpoint::Price,
                attempts: 4,
                last_error: Box::new(FetcherError::HttpStatus(500)),
            });
        }
        Ok(Self::price_payload(params))
    }
}

#[async_trait]
impl FipeApi for FakeFipeApi {
    async fn fetch(&self, endpoint: Endpoint, params: &[(&'static str, String)]) -> FetcherResult<Value> {
        self.calls.lock().unwrap().push(Call {
            endpoint,
            params: params.to_vec(),
        });

        if self.failing_endpoints.lock().unwrap().contains(&endpoint) {
            return Err(FetcherError::HttpStatus(503));
        }

        match endpoint {
            Endpoint::ReferenceTables => Ok(Value::Array(self.tables.clone())),
            Endpoint::Brands => Ok(Value::Array(self.brands.clone())),
            Endpoint::Models => Ok(json!({"Modelos": self.models.clone(), "Anos": []})),
            Endpoint::ModelYears => Ok(Value::Array(self.years.clone())),
            Endpoint::Price => self.price(params).await,
        }
    }
}

/// Sink that keeps every record and log line
#[derive(Default)]
pub struct RecordingSink {
    pub records: Mutex<Vec<VehiclePriceRecord>>,
    pub logs: Mutex<Vec<(String, LogLevel)>>,
    pub current_leaves: Mutex<Vec<String>>,
    pub phases: Mutex<Vec<(i64, TablePhase)>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<VehiclePriceRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, level)| *level == LogLevel::Warning)
            .map(|(message, _)| message.clone())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn on_progress(&self, _stage: Stage, _current: usize, _total: usize) {}

    fn on_log(&self, message: &str, level: LogLevel) {
        self.logs.lock().unwrap().push((message.to_string(), level));
    }

    fn on_record(&self, record: &VehiclePriceRecord) {
        self.records.lock().unwrap().push(record.clone());
    }

    fn on_current_leaf(&self, brand: &str, model: &str, model_year_value: &str) {
        self.current_leaves
            .lock()
            .unwrap()
            .push(format!("{brand}|{model}|{model_year_value}"));
    }

    fn on_phase(&self, table_id: i64, phase: TablePhase) {
        self.phases.lock().unwrap().push((table_id, phase));
    }
}

/// Sequential engine over the fake API
pub fn engine(api: Arc<FakeFipeApi>, store: Arc<CheckpointStore>, sink: Arc<RecordingSink>) -> CrawlEngine {
    CrawlEngine::new(api, Arc::new(Dictionaries::default()), store, sink)
}
