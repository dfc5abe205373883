use std::time::Duration;

use fipe_crawler::fetcher::retry_formatter::{
    describe_params, extract_error_type, RetryContext, RetryErrorType,
};
use reqwest::StatusCode;

fn sample_context(error_type: RetryErrorType) -> RetryContext {
    RetryContext::new(
        2,
        5,
        error_type,
        Duration::from_secs(4),
        "codigoTabelaReferencia=301 codigoTipoVeiculo=1",
        "HTTP error: status 502",
        "marcas",
    )
}

#[test]
fn format_retry_captures_attempt_and_wait() {
    let message = sample_context(RetryErrorType::RateLimit).format_retry();
    assert!(message.starts_with("Retrying marcas"));
    assert!(message.contains("attempt 3/5"));
    assert!(message.contains("rate limit exceeded"));
    assert!(message.contains("4.0 seconds"));
    assert!(message.ends_with("(codigoTabelaReferencia=301 codigoTipoVeiculo=1)"));
}

#[test]
fn format_success_names_endpoint() {
    let message = sample_context(RetryErrorType::NetworkTimeout).format_success();
    assert!(message.contains("Retry attempt 2/5 of marcas succeeded"));
}

#[test]
fn format_failure_lists_suggestions() {
    let output = sample_context(RetryErrorType::ServerError(502)).format_failure();
    assert!(output.contains("[FAILED] Request failed after 2 attempts"));
    assert!(output.contains("Last error: HTTP error: status 502"));
    assert!(output.contains("Endpoint: marcas"));
    assert!(output.contains("experiencing issues"));
    assert!(output.contains("--max-retries (current: 4)"));
    assert!(output.contains("retried on the next run"));
}

#[test]
fn format_failure_without_parameters() {
    let ctx = RetryContext::new(
        1,
        1,
        RetryErrorType::NetworkOffline,
        Duration::ZERO,
        "",
        "network error: connection refused",
        "tabelas",
    );
    let output = ctx.format_failure();
    assert!(output.contains("Parameters: none"));
    assert!(output.contains("--max-retries (current: 0)"));
    assert!(!ctx.format_retry().contains('('));
}

#[test]
fn extract_error_type_classifies_status_codes() {
    assert_eq!(
        extract_error_type(Some(StatusCode::TOO_MANY_REQUESTS), None),
        RetryErrorType::RateLimit
    );
    assert_eq!(
        extract_error_type(Some(StatusCode::BAD_GATEWAY), None),
        RetryErrorType::ServerError(502)
    );
    assert_eq!(
        extract_error_type(Some(StatusCode::NOT_FOUND), None),
        RetryErrorType::ClientError(404)
    );
    assert_eq!(extract_error_type(None, None), RetryErrorType::NetworkGeneric);
}

#[test]
fn descriptions_are_specific_where_known() {
    assert_eq!(RetryErrorType::ServerError(502).description(), "bad gateway");
    assert_eq!(RetryErrorType::ServerError(599).description(), "server error");
    assert_eq!(RetryErrorType::ClientError(400).description(), "invalid request");
    assert_eq!(RetryErrorType::InvalidPayload.description(), "invalid response payload");
}

#[test]
fn describe_params_keeps_wire_order() {
    let params = vec![
        ("codigoTipoVeiculo", "1".to_string()),
        ("codigoTabelaReferencia", "301".to_string()),
    ];
    assert_eq!(
        describe_params(&params),
        "codigoTipoVeiculo=1 codigoTabelaReferencia=301"
    );
    assert_eq!(describe_params(&[]), "");
}
