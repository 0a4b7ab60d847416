//! Tenant (connection) listing
//!
//! Every Xero organisation the user authorised during consent shows up as a
//! connection. Authorisation changes only take effect through this call, so
//! the list is fetched live instead of trusting a cached copy.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A connected Xero organisation (or practice).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    /// Connection id, used to disconnect. Records cached by other clients
    /// may not carry it.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub auth_event_id: Option<String>,
    pub tenant_id: String,
    #[serde(default)]
    pub tenant_type: String,
    #[serde(default)]
    pub tenant_name: Option<String>,
    #[serde(default)]
    pub created_date_utc: Option<String>,
    #[serde(default)]
    pub updated_date_utc: Option<String>,
}

/// Fetch the tenants the access token is connected to, in provider order.
pub async fn list_connections(
    client: &reqwest::Client,
    connections_url: &str,
    access_token: &str,
) -> Result<Vec<Tenant>> {
    let response = client
        .get(connections_url)
        .bearer_auth(access_token)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| Error::Http(format!("connections request failed: {e}")))?;

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
        .json::<Vec<Tenant>>()
        .await
        .map_err(|e| Error::Http(format!("invalid connections response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use serde_json::json;

    async fn start_connections_server() -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let app = axum::Router::new().route(
                "/connections",
                axum::routing::get(|headers: HeaderMap| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("");
                    if auth != "Bearer at_good" {
                        return StatusCode::UNAUTHORIZED.into_response();
                    }
                    axum::Json(json!([
                        {
                            "id": "conn-1",
                            "authEventId": "evt-1",
                            "tenantId": "t1",
                            "tenantType": "ORGANISATION",
                            "tenantName": "Demo Company (Global)",
                            "createdDateUtc": "2024-01-01T00:00:00.0000000",
                            "updatedDateUtc": "2024-01-02T00:00:00.0000000"
                        },
                        {
                            "id": "conn-2",
                            "tenantId": "t2",
                            "tenantType": "PRACTICE"
                        }
                    ]))
                    .into_response()
                }),
            );
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}/connections"), handle)
    }

    #[tokio::test]
    async fn lists_tenants_in_order() {
        let (url, _server) = start_connections_server().await;
        let tenants = list_connections(&reqwest::Client::new(), &url, "at_good")
            .await
            .unwrap();

        assert_eq!(tenants.len(), 2);
        assert_eq!(tenants[0].tenant_id, "t1");
        assert_eq!(
            tenants[0].tenant_name.as_deref(),
            Some("Demo Company (Global)")
        );
        assert_eq!(tenants[1].tenant_type, "PRACTICE");
        assert!(tenants[1].auth_event_id.is_none());
    }

    #[tokio::test]
    async fn rejected_token_surfaces_api_error() {
        let (url, _server) = start_connections_server().await;
        let err = list_connections(&reqwest::Client::new(), &url, "at_bad")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api { status: 401, .. }), "got: {err}");
    }

    #[test]
    fn tenant_serializes_camel_case() {
        let tenant = Tenant {
            id: "conn-1".into(),
            auth_event_id: None,
            tenant_id: "t1".into(),
            tenant_type: "ORGANISATION".into(),
            tenant_name: Some("Demo".into()),
            created_date_utc: None,
            updated_date_utc: None,
        };
        let value = serde_json::to_value(&tenant).unwrap();
        assert_eq!(value["tenantId"], "t1");
        assert_eq!(value["tenantName"], "Demo");
    }

    #[test]
    fn cached_tenant_without_connection_id_parses() {
        let tenant: Tenant = serde_json::from_value(json!({
            "tenantId": "t1",
            "tenantName": "Demo",
            "tenantType": "ORGANISATION"
        }))
        .unwrap();
        assert_eq!(tenant.id, "");
        assert_eq!(tenant.tenant_id, "t1");
    }
}
