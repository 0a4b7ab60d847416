//! `/xero` routes: consent flow, payer validation, payments and webhooks
//!
//! Every handler that talks to the accounting API first asks the session
//! manager for an authenticated client, so an expired access token is
//! refreshed transparently on whichever request notices it first.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use chrono::Utc;
use common::Secret;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use xero_auth::accounting::{AccountRef, LineItem, NewBankTransaction, NewPayment, where_eq};
use xero_auth::{CallbackParams, SIGNATURE_HEADER, XeroClient, webhook};
use xero_session::{SessionManager, project};

use crate::config::MerchantConfig;
use crate::error::{ApiError, envelope_body, success};
use crate::metrics;

/// State shared by the `/xero` handlers.
#[derive(Clone)]
pub struct XeroState {
    pub session: Arc<SessionManager>,
    pub webhook_key: Option<Arc<Secret<String>>>,
    pub merchant: Arc<MerchantConfig>,
}

pub fn router<S>(state: XeroState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/xero", get(index))
        .route("/xero/", get(index))
        .route("/xero/setup", get(setup_page))
        .route("/xero/connect", get(connect))
        .route("/xero/callback", get(callback))
        .route("/xero/organisation", get(organisation))
        .route("/xero/contacts", get(contacts))
        .route("/xero/overpayment", post(create_overpayment))
        .route("/xero/create-invoice-payment", post(create_invoice_payment))
        .route("/xero/cancel-payment", post(cancel_payment))
        .route("/xero/refund-overpayment", post(refund_overpayment))
        .route("/xero/webhooks", post(webhook_callback))
        .route("/xero/api/auth", get(auth_check))
        .with_state(state)
}

/// Consent URL plus the current session, refreshed if needed.
async fn index(State(state): State<XeroState>) -> Result<Response, ApiError> {
    let consent_url = state.session.new_client().build_consent_url()?;

    match state.session.acquire_authenticated_client().await {
        Ok(client) => Ok(consent_response(&consent_url, &client)),
        Err(err) => Ok(consent_error(&consent_url, err.into())),
    }
}

async fn setup_page() -> Html<&'static str> {
    Html(r#"<a href="/xero/connect">Connect to Xero</a>"#)
}

async fn connect(State(state): State<XeroState>) -> Result<Response, ApiError> {
    let consent_url = state.session.new_client().build_consent_url()?;
    Ok((StatusCode::FOUND, [(header::LOCATION, consent_url)]).into_response())
}

/// Redirect target after consent. Replaces any previously cached session.
async fn callback(
    State(state): State<XeroState>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    let consent_url = state.session.new_client().build_consent_url()?;

    match state.session.complete_consent(&params).await {
        Ok((client, _)) => Ok(consent_response(&consent_url, &client)),
        Err(err) => Ok(consent_error(&consent_url, err.into())),
    }
}

fn consent_response(consent_url: &str, client: &XeroClient) -> Response {
    let authenticated = client
        .read_token_set()
        .map(|token_set| project(token_set, client.tenants(), client.active_tenant()));

    Json(json!({
        "consentUrl": consent_url,
        "authenticated": authenticated,
    }))
    .into_response()
}

fn consent_error(consent_url: &str, err: ApiError) -> Response {
    let status = err.status();
    warn!(status = status.as_u16(), error = %err, "session unavailable");
    let mut body = envelope_body(status, &err.to_string(), Value::Null);
    body["consentUrl"] = json!(consent_url);
    body["error"] = json!(err.to_string());
    (status, Json(body)).into_response()
}

/// Authenticated client and the tenant every accounting call targets.
async fn tenant_client(state: &XeroState) -> Result<(XeroClient, String), ApiError> {
    let client = state.session.acquire_authenticated_client().await?;
    let tenant_id = client
        .active_tenant()
        .map(|t| t.tenant_id.clone())
        .ok_or_else(|| ApiError::NotFound("no Xero organisation is connected".into()))?;
    Ok((client, tenant_id))
}

async fn organisation(State(state): State<XeroState>) -> Result<String, ApiError> {
    let (client, tenant_id) = tenant_client(&state).await?;
    let organisation = client
        .get_organisations(&tenant_id)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::NotFound("tenant has no organisation".into()))?;
    Ok(format!("Hello, {}!", organisation.name))
}

#[derive(Debug, Deserialize)]
struct ContactQuery {
    account_number: Option<String>,
}

/// Payer validation: look the payer up by account number and describe what
/// they owe using the merchant defaults.
async fn contacts(
    State(state): State<XeroState>,
    Query(query): Query<ContactQuery>,
) -> Result<Response, ApiError> {
    let account_number = query
        .account_number
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::BadRequest("account_number is required".into()))?;

    let (client, tenant_id) = tenant_client(&state).await?;
    let contact = client
        .get_contacts(&tenant_id, Some(&where_eq("AccountNumber", &account_number)))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            ApiError::NotFound(format!("no contact with account number {account_number}"))
        })?;

    let merchant = &state.merchant;
    Ok(success(json!({
        "merchant_code": merchant.merchant_code,
        "service_group_code": merchant.service_group_code,
        "payer_must_pay_total_amount": merchant.payer_must_pay_total_amount,
        "amount": merchant.amount,
        "payer_code": account_number,
        "payer_names": contact.name,
        "department_code": merchant.department_code,
        "department_name": merchant.department_name,
        "class_name": merchant.class_name,
        "currency": merchant.currency,
        "comment": merchant.comment,
    })))
}

#[derive(Debug, Deserialize)]
struct OverpaymentRequest {
    account_number: String,
    amount: f64,
    reference: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    bank_account_number: Option<String>,
}

/// Record money received from a payer without an invoice to apply it to.
async fn create_overpayment(
    State(state): State<XeroState>,
    payload: Result<Json<OverpaymentRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(bad_body)?;
    let (client, tenant_id) = tenant_client(&state).await?;

    let contact = client
        .get_contacts(&tenant_id, Some(&where_eq("AccountNumber", &request.account_number)))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "no contact with account number {}",
                request.account_number
            ))
        })?;

    let merchant = &state.merchant;
    let transaction = NewBankTransaction {
        kind: "RECEIVE-OVERPAYMENT".into(),
        contact: json!({ "ContactID": contact.contact_id }),
        line_items: vec![LineItem {
            description: request.description.unwrap_or_else(|| merchant.comment.clone()),
            line_amount: request.amount,
        }],
        currency_code: merchant.currency.clone(),
        currency_rate: 1.0,
        reference: request.reference,
        status: "AUTHORISED".into(),
        date: today(),
        bank_account: AccountRef {
            code: None,
            bank_account_number: Some(
                request
                    .bank_account_number
                    .unwrap_or_else(|| merchant.bank_account_number.clone()),
            ),
        },
    };

    let body = client
        .create_bank_transactions(&tenant_id, &[transaction])
        .await?;
    info!(contact_id = %contact.contact_id, "overpayment recorded");
    Ok(success(body))
}

#[derive(Debug, Deserialize)]
struct InvoicePaymentRequest {
    invoice_number: String,
    amount: f64,
    reference: String,
    #[serde(default)]
    account_code: Option<String>,
}

/// Apply a payment against an invoice found by its number.
async fn create_invoice_payment(
    State(state): State<XeroState>,
    payload: Result<Json<InvoicePaymentRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(bad_body)?;
    let (client, tenant_id) = tenant_client(&state).await?;

    let invoice = client
        .get_invoices(&tenant_id, Some(&where_eq("InvoiceNumber", &request.invoice_number)))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::NotFound(format!("no invoice {}", request.invoice_number)))?;

    let payment = NewPayment {
        invoice: Some(NewPayment::invoice_ref(&invoice.invoice_id)),
        overpayment: None,
        account: payment_account(&state.merchant, request.account_code),
        date: today(),
        amount: request.amount,
        currency_rate: 1.0,
        reference: request.reference,
        payment_type: Some("ACCRECPAYMENT".into()),
    };

    let body = client.create_payments(&tenant_id, &[payment]).await?;
    info!(invoice_id = %invoice.invoice_id, "invoice payment created");
    Ok(success(body))
}

#[derive(Debug, Deserialize)]
struct CancelPaymentRequest {
    reference: String,
}

async fn cancel_payment(
    State(state): State<XeroState>,
    payload: Result<Json<CancelPaymentRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(bad_body)?;
    let (client, tenant_id) = tenant_client(&state).await?;

    let payment = client
        .get_payments(&tenant_id, Some(&where_eq("Reference", &request.reference)))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            ApiError::NotFound(format!("no payment with reference {}", request.reference))
        })?;

    let body = client.delete_payment(&tenant_id, &payment.payment_id).await?;
    info!(payment_id = %payment.payment_id, "payment cancelled");
    Ok(success(body))
}

#[derive(Debug, Deserialize)]
struct RefundRequest {
    overpayment_id: String,
    amount: f64,
    reference: String,
    #[serde(default)]
    account_code: Option<String>,
}

/// Pay money back out of an existing overpayment.
async fn refund_overpayment(
    State(state): State<XeroState>,
    payload: Result<Json<RefundRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(bad_body)?;
    let (client, tenant_id) = tenant_client(&state).await?;

    let payment = NewPayment {
        invoice: None,
        overpayment: Some(NewPayment::overpayment_ref(&request.overpayment_id)),
        account: payment_account(&state.merchant, request.account_code),
        date: today(),
        amount: request.amount,
        currency_rate: 1.0,
        reference: request.reference,
        payment_type: None,
    };

    let body = client.create_payments(&tenant_id, &[payment]).await?;
    info!(overpayment_id = %request.overpayment_id, "overpayment refunded");
    Ok(success(body))
}

/// Xero only looks at the status code; the body stays empty either way.
async fn webhook_callback(
    State(state): State<XeroState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(key) = state.webhook_key.as_deref() else {
        warn!("webhook received but no webhook key is configured");
        metrics::record_webhook(false);
        return StatusCode::UNAUTHORIZED;
    };

    let claimed = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let accepted = webhook::verify(&body, claimed, key.expose().as_bytes());
    metrics::record_webhook(accepted);

    if accepted {
        let events = serde_json::from_slice::<Value>(&body)
            .ok()
            .and_then(|v| v["events"].as_array().map(Vec::len))
            .unwrap_or(0);
        info!(bytes = body.len(), events, "webhook signature verified");
        StatusCode::OK
    } else {
        warn!(bytes = body.len(), "webhook signature verification failed");
        debug!(
            computed = ?webhook::sign(&body, key.expose().as_bytes()),
            "computed webhook signature"
        );
        StatusCode::UNAUTHORIZED
    }
}

/// Cheap probe that the cached session is usable.
async fn auth_check(State(state): State<XeroState>) -> Response {
    match state.session.acquire_authenticated_client().await {
        Ok(_) => Json(json!({ "message": "Successfully authenticated with Xero" })).into_response(),
        Err(err) => {
            let err = ApiError::from(err);
            let status = err.status();
            warn!(status = status.as_u16(), error = %err, "authentication check failed");
            let mut body = envelope_body(status, "Error authenticating with Xero", Value::Null);
            body["error"] = json!(err.to_string());
            (status, Json(body)).into_response()
        }
    }
}

fn payment_account(merchant: &MerchantConfig, code: Option<String>) -> AccountRef {
    AccountRef {
        code: Some(code.unwrap_or_else(|| merchant.payment_account_code.clone())),
        bank_account_number: None,
    }
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}
