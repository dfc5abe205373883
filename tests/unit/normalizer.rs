use chrono::{TimeZone, Utc};
use fipe_crawler::config::Dictionaries;
use fipe_crawler::fetcher::normalizer::{
    build_price_record, format_brl, parse_price, parse_reference_table, PriceQuery,
};
use fipe_crawler::{LeafKey, ModelYear, ModelYearOption, VehicleType};
use rust_decimal::Decimal;
use serde_json::json;

#[test]
fn reference_table_listing_sample() {
    let dictionaries = Dictionaries::default();
    let listing = json!([
        {"Codigo": 308, "Mes": "agosto/2024 "},
        {"Codigo": 307, "Mes": "julho/2024 "},
        {"Codigo": 270, "Mes": "março/2021 "}
    ]);

    let tables: Vec<_> = listing
        .as_array()
        .unwrap()
        .iter()
        .map(|raw| parse_reference_table(raw, &dictionaries).unwrap())
        .collect();

    assert_eq!(tables[0].label(), "Agosto/2024");
    assert_eq!(tables[1].month_code, "07");
    assert_eq!(tables[2].month_code, "03");
    assert_eq!(tables[2].month_name, "Março");
}

#[test]
fn zero_km_price_payload() {
    let payload = json!({
        "Valor": "R$ 1.234.567,89",
        "Marca": "Mercedes-Benz",
        "Modelo": "Actros 2651 S 6x4 2p (diesel)(E5)",
        "AnoModelo": 32000,
        "Combustivel": "Diesel",
        "CodigoFipe": "509149-8",
        "MesReferencia": "agosto de 2024 ",
        "Autenticacao": "x1y2z3",
        "TipoVeiculo": 3,
        "SiglaCombustivel": "D",
        "DataConsulta": "sexta-feira, 9 de agosto de 2024 10:00"
    });
    let model_year = ModelYear::parse("32000-3").unwrap();
    let query = PriceQuery {
        table_id: 308,
        vehicle_type: VehicleType::Truck,
        model_year: model_year.year.clone(),
        fuel_code: model_year.fuel_code.clone(),
    };
    let queried_at = Utc.with_ymd_and_hms(2024, 8, 9, 13, 0, 0).unwrap();

    let record = build_price_record(&payload, &Dictionaries::default(), &query, queried_at);

    assert_eq!(record.table_id, 308);
    assert_eq!(record.vehicle_type_label, "caminhao");
    assert_eq!(record.reference_month_code, "08");
    assert_eq!(record.reference_year, "2024");
    assert_eq!(record.model_year, 32000);
    assert_eq!(record.fuel_code, "3");
    assert_eq!(record.fuel_label, "Diesel");
    assert_eq!(record.price, Decimal::new(1_234_567_89, 2));
    assert_eq!(format_brl(record.price), "R$ 1.234.567,89");
    assert_eq!(record.queried_at, queried_at);
}

#[test]
fn unparsable_price_is_zero_but_flagged() {
    let query = PriceQuery {
        table_id: 1,
        vehicle_type: VehicleType::Car,
        model_year: "2010".to_string(),
        fuel_code: "1".to_string(),
    };
    let record = build_price_record(
        &json!({"Valor": "garbage", "Marca": "Fiat"}),
        &Dictionaries::default(),
        &query,
        Utc::now(),
    );
    assert_eq!(record.price, Decimal::ZERO);
    assert!(!record.price_available);
    assert_eq!(parse_price("garbage"), Decimal::ZERO);
}

#[test]
fn model_year_options_decode_and_key() {
    let options: Vec<ModelYearOption> = serde_json::from_value(json!([
        {"Label": "32000 Diesel", "Value": "32000-3"},
        {"Label": "Broken", "Value": "bad_value"}
    ]))
    .unwrap();

    let good = options[0].model_year().unwrap();
    assert_eq!(good.year, "32000");
    let key = LeafKey::new(308, VehicleType::Truck, "109", "5986", &options[0].value);
    assert_eq!(key.as_str(), "308-3-109-5986-32000-3");

    assert!(options[1].model_year().is_err());
}
