//! HTTP transport
//!
//! Serves the subscribe endpoint as a Server-Sent Events stream and the
//! endpoints that publish into it. Responsibilities:
//! - Open a broker connection per subscribe request and stream its frames as
//!   `data: <payload>\n\n` events until either side goes away
//! - Start the periodic snapshot publisher for a store when someone subscribes
//! - Translate table updates, administrative notices and chat messages into
//!   broker publishes
//! - Close every subscriber stream on shutdown so the server can drain

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::broker::{Broker, Event};
use crate::client::CloseReason;
use crate::config::Settings;
use crate::publisher::PeriodicPublisher;
use crate::store::{Catalog, StoreSummary, Table, store_topic};
use crate::transport::error::AppError;
use crate::transport::message::{
    HealthResponse, MessageResponse, PushMessageRequest, SendMessageRequest, StatusResponse,
    SubscribeQuery, UpdateStatusRequest,
};
use crate::utils::error::StoreError;

/// Response header carrying the id of the connection behind an event stream.
pub const CONNECTION_ID_HEADER: &str = "x-connection-id";

/// Everything the handlers share. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
    pub catalog: Arc<Catalog>,
    pub publisher: Arc<PeriodicPublisher>,
    /// `None` disables periodic snapshots.
    pub publish_interval: Option<Duration>,
    pub keep_alive: Duration,
}

impl AppState {
    /// Builds the catalog and the broker, with one declared topic per store.
    pub fn new(settings: &Settings) -> Result<Self, AppError> {
        let catalog = Arc::new(Catalog::from_settings(&settings.stores));
        let broker = Arc::new(Broker::from_settings(&settings.broker));
        for topic in catalog.topics() {
            broker.registry().declare(&topic)?;
        }
        let publisher = Arc::new(PeriodicPublisher::new(
            broker.clone(),
            Duration::from_secs(settings.broker.idle_grace_secs),
        ));
        let publish_interval = match settings.broker.publish_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            broker,
            catalog,
            publisher,
            publish_interval,
            keep_alive: Duration::from_secs(settings.server.keep_alive_secs.max(1)),
        })
    }

    fn ensure_store(&self, store_id: u32) -> Result<(), AppError> {
        if self.catalog.contains(store_id) {
            Ok(())
        } else {
            Err(StoreError::StoreNotFound(store_id.to_string()).into())
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/events/{store_id}", get(subscribe))
        .route("/stores", get(list_stores))
        .route("/stores/{store_id}/tables", get(list_tables))
        .route(
            "/stores/{store_id}/tables/{table_id}/update",
            post(update_table_status),
        )
        .route("/stores/{store_id}/push_message", post(push_message))
        .route("/stores/{store_id}/send_message", post(send_message))
        .route(
            "/stores/{store_id}/connections/{connection_id}",
            delete(close_connection),
        )
        .route("/check_status", get(check_status))
        .route("/health", get(health));

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until `shutdown` resolves, then closes every subscriber stream and
/// periodic publisher and waits for in-flight requests to finish.
pub async fn start_http_server(
    addr: String,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on http://{}", listener.local_addr()?);

    let broker = state.broker.clone();
    let publisher = state.publisher.clone();

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Shutdown signal received, closing subscriber streams");
            publisher.stop_all();
            broker.shutdown();
        })
        .await
}

async fn subscribe(
    State(state): State<AppState>,
    Path(store_id): Path<u32>,
    Query(query): Query<SubscribeQuery>,
) -> Result<Response, AppError> {
    state.ensure_store(store_id)?;
    let topic = store_topic(store_id);

    let (conn, stream) = state.broker.open(&topic, query.username)?;

    if let Some(interval) = state.publish_interval {
        state.publisher.start(&topic, interval, state.catalog.clone());
    }

    let events = stream.map(|frame| Ok::<_, Infallible>(SseEvent::default().data(frame.as_str())));
    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::new().interval(state.keep_alive))
        .into_response();

    let id = HeaderValue::from_str(&conn.id).map_err(|e| AppError::Internal(e.to_string()))?;
    response.headers_mut().insert(CONNECTION_ID_HEADER, id);
    Ok(response)
}

async fn list_stores(State(state): State<AppState>) -> Json<Vec<StoreSummary>> {
    Json(state.catalog.stores())
}

async fn list_tables(
    State(state): State<AppState>,
    Path(store_id): Path<u32>,
) -> Result<Json<Vec<Table>>, AppError> {
    Ok(Json(state.catalog.tables(store_id)?))
}

async fn update_table_status(
    State(state): State<AppState>,
    Path((store_id, table_id)): Path<(u32, u32)>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let status = body.status.unwrap_or_default();
    let tables = state.catalog.update_status(store_id, table_id, &status)?;

    let event = Event::snapshot(store_topic(store_id), json!(tables));
    let report = state.broker.publish(&event, None)?;
    debug!("Table {table_id} of store {store_id} set to {status}: {report:?}");

    Ok(Json(MessageResponse::new("Status updated")))
}

async fn push_message(
    State(state): State<AppState>,
    Path(store_id): Path<u32>,
    Json(body): Json<PushMessageRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.ensure_store(store_id)?;

    let event = Event::notice(store_topic(store_id), body.message);
    let report = state.broker.publish(&event, None)?;

    Ok(Json(MessageResponse::new(format!(
        "Message pushed to {} clients",
        report.delivered
    ))))
}

async fn send_message(
    State(state): State<AppState>,
    Path(store_id): Path<u32>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.ensure_store(store_id)?;
    let topic = store_topic(store_id);

    let sender = state
        .broker
        .registry()
        .get(&topic, &body.connection_id)?
        .ok_or_else(|| AppError::ConnectionNotFound(body.connection_id.clone()))?;

    // the sender renders its own message locally
    let event = Event::notice(topic, format!("{}: {}", sender.name, body.message));
    let report = state.broker.publish(&event, Some(&sender.id))?;

    Ok(Json(MessageResponse::new(format!(
        "Message sent to {} clients",
        report.delivered
    ))))
}

async fn close_connection(
    State(state): State<AppState>,
    Path((store_id, connection_id)): Path<(u32, String)>,
) -> Result<StatusCode, AppError> {
    state.ensure_store(store_id)?;
    let closed = state.broker.close_by_id(
        &store_topic(store_id),
        &connection_id,
        CloseReason::Administrative,
    )?;
    if closed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::ConnectionNotFound(connection_id))
    }
}

async fn check_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let store_clients_count = state.broker.registry().counts()?;
    Ok(Json(StatusResponse {
        total_clients: store_clients_count.values().sum(),
        store_clients_count,
    }))
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
        }),
    )
}
