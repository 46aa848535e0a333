use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;

use crm_core::api::{
    BulkCreateCustomersRequest, CreateCustomerResponse, CreateOrderResponse,
    CreateProductResponse, CustomerList, HelloResponse, OrderList, ProductList,
};
use crm_core::{BulkCreateOutcome, CustomerInput, OrderInput, ProductInput, RestockOutcome};
use crm_storage::Database;

use crate::problem::ProblemResponse;
use crate::service::{Clock, CrmService};
use crate::telemetry;

const HELLO_GREETING: &str = "Hello, CRM!";
const CUSTOMER_CREATED: &str = "Customer created successfully";

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    service: CrmService,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, storage: Database) -> Self {
        let clock: Clock = Arc::new(Utc::now);
        Self {
            metrics,
            service: CrmService::new(storage, clock),
        }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn service(&self) -> &CrmService {
        &self.service
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/hello", get(hello))
        .route("/customers", get(list_customers).post(create_customer))
        .route("/customers/bulk", post(bulk_create_customers))
        .route("/products", get(list_products).post(create_product))
        .route("/products/low-stock", post(update_low_stock_products))
        .route("/orders", get(list_orders).post(create_order))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

async fn hello() -> Json<HelloResponse> {
    Json(HelloResponse {
        hello: HELLO_GREETING.to_string(),
    })
}

async fn list_customers(
    State(state): State<AppState>,
) -> Result<Json<CustomerList>, ProblemResponse> {
    let customers = state.service().list_customers().await?;
    Ok(Json(CustomerList { customers }))
}

async fn create_customer(
    State(state): State<AppState>,
    Json(input): Json<CustomerInput>,
) -> Result<(StatusCode, Json<CreateCustomerResponse>), ProblemResponse> {
    let customer = state.service().create_customer(&input).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateCustomerResponse {
            customer,
            message: CUSTOMER_CREATED.to_string(),
        }),
    ))
}

async fn bulk_create_customers(
    State(state): State<AppState>,
    Json(request): Json<BulkCreateCustomersRequest>,
) -> Json<BulkCreateOutcome> {
    Json(state.service().bulk_create_customers(&request.inputs).await)
}

async fn list_products(State(state): State<AppState>) -> Result<Json<ProductList>, ProblemResponse> {
    let products = state.service().list_products().await?;
    Ok(Json(ProductList { products }))
}

async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<ProductInput>,
) -> Result<(StatusCode, Json<CreateProductResponse>), ProblemResponse> {
    let product = state.service().create_product(&input).await?;
    Ok((StatusCode::CREATED, Json(CreateProductResponse { product })))
}

async fn update_low_stock_products(
    State(state): State<AppState>,
) -> Result<Json<RestockOutcome>, ProblemResponse> {
    Ok(Json(state.service().update_low_stock_products().await?))
}

async fn list_orders(State(state): State<AppState>) -> Result<Json<OrderList>, ProblemResponse> {
    let orders = state.service().list_orders().await?;
    Ok(Json(OrderList { orders }))
}

async fn create_order(
    State(state): State<AppState>,
    Json(input): Json<OrderInput>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ProblemResponse> {
    let order = state.service().create_order(&input).await?;
    Ok((StatusCode::CREATED, Json(CreateOrderResponse { order })))
}
