use std::time::Duration;

use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crm_core::api::{CustomerList, HelloResponse, OrderList};
use crm_core::{Customer, Order, RestockOutcome};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the CRM query/mutation API used by the periodic jobs.
#[derive(Clone)]
pub struct CrmClient {
    http: Client,
    base_url: Url,
}

impl CrmClient {
    /// Creates a new client with the provided configuration.
    pub fn new(base_url: Url, http: Client) -> Self {
        Self { http, base_url }
    }

    /// Builds a client with a request timeout for the given base URL.
    pub fn from_base_url(base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)?;
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::new(base_url, http))
    }

    /// Issues the `hello` liveness query.
    pub async fn hello(&self) -> Result<String, ClientError> {
        let response = self.request(Method::GET, "hello")?.send().await?;
        parse_json::<HelloResponse>(response)
            .await
            .map(|body| body.hello)
    }

    /// Fetches every customer.
    pub async fn list_customers(&self) -> Result<Vec<Customer>, ClientError> {
        let response = self.request(Method::GET, "customers")?.send().await?;
        parse_json::<CustomerList>(response)
            .await
            .map(|body| body.customers)
    }

    /// Fetches every order with its customer and products.
    pub async fn list_orders(&self) -> Result<Vec<Order>, ClientError> {
        let response = self.request(Method::GET, "orders")?.send().await?;
        parse_json::<OrderList>(response)
            .await
            .map(|body| body.orders)
    }

    /// Invokes the low-stock restock mutation.
    pub async fn update_low_stock_products(&self) -> Result<RestockOutcome, ClientError> {
        let response = self
            .request(Method::POST, "products/low-stock")?
            .send()
            .await?;
        parse_json(response).await
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, ClientError> {
        let url = self.base_url.join(path)?;
        Ok(self
            .http
            .request(method, url)
            .header("Accept", "application/json"))
    }
}

/// Errors produced by the CRM client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

async fn parse_json<T>(response: Response) -> Result<T, ClientError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(ClientError::Status { status, body });
    }

    Ok(response.json().await?)
}
