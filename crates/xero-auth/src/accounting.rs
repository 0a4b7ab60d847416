//! Accounting API calls
//!
//! Thin wrappers over the Xero accounting endpoints the gateway uses. Read
//! calls deserialize just the fields the gateway needs; write calls return
//! the provider's response body untouched so handlers can pass it through.

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::client::XeroClient;
use crate::constants::TENANT_HEADER;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Organisation {
    pub name: String,
    #[serde(rename = "OrganisationID", default)]
    pub organisation_id: Option<String>,
    #[serde(default)]
    pub base_currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Contact {
    #[serde(rename = "ContactID")]
    pub contact_id: String,
    pub name: String,
    #[serde(default)]
    pub account_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Invoice {
    #[serde(rename = "InvoiceID")]
    pub invoice_id: String,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub amount_due: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Payment {
    #[serde(rename = "PaymentID")]
    pub payment_id: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Reference to an account by code or bank account number.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_account_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LineItem {
    pub description: String,
    pub line_amount: f64,
}

/// A bank transaction to create, e.g. a `RECEIVE-OVERPAYMENT`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewBankTransaction {
    #[serde(rename = "Type")]
    pub kind: String,
    pub contact: Value,
    pub line_items: Vec<LineItem>,
    pub currency_code: String,
    pub currency_rate: f64,
    pub reference: String,
    pub status: String,
    pub date: String,
    pub bank_account: AccountRef,
}

/// A payment to apply against an invoice or an overpayment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewPayment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overpayment: Option<Value>,
    pub account: AccountRef,
    pub date: String,
    pub amount: f64,
    pub currency_rate: f64,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_type: Option<String>,
}

impl NewPayment {
    pub fn invoice_ref(invoice_id: &str) -> Value {
        json!({ "InvoiceID": invoice_id })
    }

    pub fn overpayment_ref(overpayment_id: &str) -> Value {
        json!({ "OverpaymentID": overpayment_id })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Organisations {
    #[serde(default)]
    organisations: Vec<Organisation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Contacts {
    #[serde(default)]
    contacts: Vec<Contact>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Invoices {
    #[serde(default)]
    invoices: Vec<Invoice>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Payments {
    #[serde(default)]
    payments: Vec<Payment>,
}

/// Build a `where` filter matching `field` exactly, e.g. `AccountNumber="12345"`.
pub fn where_eq(field: &str, value: &str) -> String {
    format!("{field}=\"{}\"", value.replace('"', "\\\""))
}

impl XeroClient {
    pub async fn get_organisations(&self, tenant_id: &str) -> Result<Vec<Organisation>> {
        let body: Organisations = self.get_json(tenant_id, "Organisation", None).await?;
        Ok(body.organisations)
    }

    pub async fn get_contacts(&self, tenant_id: &str, filter: Option<&str>) -> Result<Vec<Contact>> {
        let body: Contacts = self.get_json(tenant_id, "Contacts", filter).await?;
        Ok(body.contacts)
    }

    pub async fn get_invoices(&self, tenant_id: &str, filter: Option<&str>) -> Result<Vec<Invoice>> {
        let body: Invoices = self.get_json(tenant_id, "Invoices", filter).await?;
        Ok(body.invoices)
    }

    pub async fn get_payments(&self, tenant_id: &str, filter: Option<&str>) -> Result<Vec<Payment>> {
        let body: Payments = self.get_json(tenant_id, "Payments", filter).await?;
        Ok(body.payments)
    }

    pub async fn create_payments(&self, tenant_id: &str, payments: &[NewPayment]) -> Result<Value> {
        let request = self
            .request(Method::PUT, tenant_id, "Payments")?
            .json(&json!({ "Payments": payments }));
        send(request).await
    }

    pub async fn create_bank_transactions(
        &self,
        tenant_id: &str,
        transactions: &[NewBankTransaction],
    ) -> Result<Value> {
        let request = self
            .request(Method::PUT, tenant_id, "BankTransactions")?
            .json(&json!({ "BankTransactions": transactions }));
        send(request).await
    }

    /// Payments cannot be removed, only moved to status `DELETED`.
    pub async fn delete_payment(&self, tenant_id: &str, payment_id: &str) -> Result<Value> {
        let request = self
            .request(Method::POST, tenant_id, &format!("Payments/{payment_id}"))?
            .json(&json!({ "Status": "DELETED" }));
        send(request).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        tenant_id: &str,
        resource: &str,
        filter: Option<&str>,
    ) -> Result<T> {
        let mut request = self.request(Method::GET, tenant_id, resource)?;
        if let Some(filter) = filter {
            request = request.query(&[("where", filter)]);
        }
        let body = send(request).await?;
        serde_json::from_value(body)
            .map_err(|e| Error::Http(format!("unexpected {resource} response: {e}")))
    }

    fn request(&self, method: Method, tenant_id: &str, resource: &str) -> Result<RequestBuilder> {
        let url = format!(
            "{}/{resource}",
            self.config().endpoints.api_url.trim_end_matches('/')
        );
        Ok(self
            .http()
            .request(method, url)
            .bearer_auth(self.access_token()?)
            .header(TENANT_HEADER, tenant_id)
            .header(reqwest::header::ACCEPT, "application/json"))
    }
}

async fn send(request: RequestBuilder) -> Result<Value> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::Http(format!("accounting API request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Api {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| Error::Http(format!("invalid accounting API response: {e}")))
}
